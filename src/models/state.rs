// Shared installation state (in-memory)
//
// Exactly one live InstallationState exists per deployment. The orchestrator is
// the sole writer during a run; pollers read whole-value snapshots. Writers go
// through `InstallationStateStore::progress` so a concurrent poller always
// observes the last fully-assigned snapshot, never a partial update.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationState {
    pub progress_message: String,
    pub completed: bool,
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl InstallationState {
    pub fn installed() -> Self {
        Self {
            progress_message: "Already installed.".to_string(),
            completed: true,
            success: true,
            errors: Vec::new(),
            redirect_url: None,
        }
    }
}

/// Single-slot store for the live installation state.
///
/// The slot doubles as the single-flight gate: a fresh state can only be
/// published while the slot is empty or holds a terminal state, and the check
/// and the publish happen under one lock.
#[derive(Debug, Default)]
pub struct InstallationStateStore {
    slot: Mutex<Option<InstallationState>>,
}

impl InstallationStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot, if an attempt has been started.
    pub fn snapshot(&self) -> Option<InstallationState> {
        self.slot.lock().expect("state slot poisoned").clone()
    }

    /// Apply a mutation and republish atomically. No-op when no state is live.
    pub fn progress<F>(&self, mutate: F)
    where
        F: FnOnce(&mut InstallationState),
    {
        let mut slot = self.slot.lock().expect("state slot poisoned");
        if let Some(state) = slot.as_mut() {
            mutate(state);
        }
    }

    /// Take the slot lock once for the begin-installation decision.
    /// `decide` sees the current occupant and may replace it in place.
    pub(crate) fn swap<F, T>(&self, decide: F) -> T
    where
        F: FnOnce(&mut Option<InstallationState>) -> T,
    {
        let mut slot = self.slot.lock().expect("state slot poisoned");
        decide(&mut slot)
    }
}

/// Cooperative cancellation flag, checked at stage boundaries only. An
/// in-flight storage operation finishes before cancellation is observed; the
/// next stage will not start.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn ensure_not_cancelled(&self) -> anyhow::Result<()> {
        if self.is_cancelled() {
            anyhow::bail!("Installation was cancelled.");
        }
        Ok(())
    }
}

/// POST the terminal state to the caller-supplied callback URL, fire-and-forget.
/// Delivery failure never affects the already-decided installation result.
pub fn notify_callback(callback_url: String, state: InstallationState) {
    tokio::spawn(async move {
        info!(
            "[PHASE: notify] [STEP: callback] Posting final state (completed={}, success={})",
            state.completed, state.success
        );
        let client = reqwest::Client::new();
        let result = client
            .post(&callback_url)
            .json(&state)
            .timeout(std::time::Duration::from_secs(15))
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => {
                warn!(
                    "[PHASE: notify] [STEP: callback] Callback endpoint returned status {}",
                    resp.status()
                );
            }
            Err(e) => {
                warn!(
                    "[PHASE: notify] [STEP: callback] Callback delivery failed: {}",
                    e
                );
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_is_a_noop_without_live_state() {
        let store = InstallationStateStore::new();
        store.progress(|s| s.progress_message = "should not appear".to_string());
        assert!(store.snapshot().is_none());
    }

    #[test]
    fn progress_mutations_are_visible_in_next_snapshot() {
        let store = InstallationStateStore::new();
        store.swap(|slot| *slot = Some(InstallationState::default()));

        store.progress(|s| s.progress_message = "Creating database...".to_string());
        store.progress(|s| s.errors.push("boom".to_string()));

        let snap = store.snapshot().unwrap();
        assert_eq!(snap.progress_message, "Creating database...");
        assert_eq!(snap.errors, vec!["boom".to_string()]);
    }

    #[test]
    fn cancel_token_round_trip() {
        let token = CancelToken::new();
        assert!(token.ensure_not_cancelled().is_ok());
        token.request();
        assert!(token.is_cancelled());
        assert!(token.ensure_not_cancelled().is_err());
        token.reset();
        assert!(!token.is_cancelled());
    }
}
