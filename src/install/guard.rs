// Installation guard
//
// Pure decision gate, evaluated once per external call: installation is
// strictly single-flight per deployment. The check and the publish of a fresh
// state happen under one lock on the single-slot store.

use log::{info, warn};

use crate::error::InstallError;
use crate::install::settings::SettingsStore;
use crate::models::state::{InstallationState, InstallationStateStore};

#[derive(Debug)]
pub enum BeginInstallation {
    /// A fresh state was published; the caller owns the run.
    Proceed,
    /// The deployment is already fully installed; no side effects occurred.
    AlreadyInstalled(InstallationState),
}

/// `try_begin` outcomes:
/// - already installed → short-circuit with a completed/success state
/// - live state, completed → cleared, installation may proceed again
/// - live state, not completed → busy error (the concurrency guard)
/// - no state → fresh state published, proceed
pub fn try_begin(
    states: &InstallationStateStore,
    settings: &SettingsStore,
) -> Result<BeginInstallation, InstallError> {
    states.swap(|slot| {
        if settings.is_installed() {
            info!("[PHASE: install] [STEP: guard] Deployment already installed; short-circuiting");
            return Ok(BeginInstallation::AlreadyInstalled(
                InstallationState::installed(),
            ));
        }

        match slot {
            Some(existing) if !existing.completed => {
                warn!("[PHASE: install] [STEP: guard] Installation already running; rejecting");
                Err(InstallError::AlreadyRunning)
            }
            _ => {
                // Either no prior attempt or a terminal one: start fresh.
                *slot = Some(InstallationState {
                    progress_message: "Installation started.".to_string(),
                    ..Default::default()
                });
                info!("[PHASE: install] [STEP: guard] Fresh installation state published");
                Ok(BeginInstallation::Proceed)
            }
        }
    })
}
