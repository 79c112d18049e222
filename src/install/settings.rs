// Persisted install settings
//
// The settings document is what marks a deployment as installed: written with
// the resolved provider/connection once provisioning succeeds, cleared during
// failure cleanup so a subsequent attempt starts clean. While an attempt is in
// flight the store runs in test mode and reports not-installed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

pub const SETTINGS_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallSettings {
    pub schema_version: u32,
    pub data_provider: String,
    pub connection_string: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installed_at_utc: Option<String>,
}

impl InstallSettings {
    pub fn new(data_provider: &str, connection_string: &str) -> Self {
        Self {
            schema_version: SETTINGS_SCHEMA_VERSION,
            data_provider: data_provider.to_string(),
            connection_string: connection_string.to_string(),
            installed_at_utc: None,
        }
    }

    pub fn mark_installed(&mut self) {
        self.installed_at_utc = Some(chrono::Utc::now().to_rfc3339());
    }
}

#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    test_mode: AtomicBool,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            test_mode: AtomicBool::new(false),
        }
    }

    /// While test mode is on, installed-state queries report false so that an
    /// in-flight provisioning run is never mistaken for a finished install.
    pub fn set_test_mode(&self, on: bool) {
        self.test_mode.store(on, Ordering::SeqCst);
    }

    pub fn is_installed(&self) -> bool {
        if self.test_mode.load(Ordering::SeqCst) {
            return false;
        }
        self.load()
            .map(|s| s.installed_at_utc.is_some())
            .unwrap_or(false)
    }

    pub fn load(&self) -> Option<InstallSettings> {
        let bytes = std::fs::read(&self.path).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub async fn save(&self, settings: &InstallSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create settings folder {:?}", parent))?;
        }
        let bytes = serde_json::to_vec_pretty(settings)?;
        tokio::fs::write(&self.path, bytes)
            .await
            .with_context(|| format!("Failed to write settings file {:?}", self.path))?;
        info!(
            "[PHASE: install] [STEP: settings] Settings persisted (path={:?}, installed={})",
            self.path,
            settings.installed_at_utc.is_some()
        );
        Ok(())
    }

    /// Best-effort removal so a retry starts from a clean slate.
    pub async fn clear(&self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => info!(
                "[PHASE: install] [STEP: settings] Settings cleared (path={:?})",
                self.path
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "[PHASE: install] [STEP: settings] Failed to clear settings (path={:?}, error={:?})",
                self.path, e
            ),
        }
    }
}
