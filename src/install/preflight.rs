// Filesystem preflight checks
//
// Verifies write/modify/delete access on every directory and file the running
// process needs after install. Advisory-exhaustive: all violations are
// collected so an administrator can fix every permission problem in one pass.
// Any violation aborts the installation before the database is touched.

use std::path::Path;

use log::{info, warn};

use crate::utils::paths::{current_os_identity, InstallPaths};

#[derive(Debug, Default)]
pub struct PreflightReport {
    pub errors: Vec<String>,
}

impl PreflightReport {
    pub fn ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Probe every configured path. Paths that do not exist yet are skipped: they
/// are created later with whatever rights the process has, and a creation
/// failure surfaces through the normal provisioning error path.
pub async fn check_filesystem_permissions(paths: &InstallPaths) -> PreflightReport {
    let identity = current_os_identity();
    let mut report = PreflightReport::default();

    for dir in paths.dirs_to_check() {
        if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
            continue;
        }
        if let Some(error) = probe_directory(dir, &identity).await {
            warn!("[PHASE: preflight] [STEP: fs] {}", error);
            report.errors.push(error);
        }
    }

    for file in paths.files_to_check() {
        if !tokio::fs::try_exists(file).await.unwrap_or(false) {
            continue;
        }
        if let Some(error) = probe_file(file, &identity).await {
            warn!("[PHASE: preflight] [STEP: fs] {}", error);
            report.errors.push(error);
        }
    }

    info!(
        "[PHASE: preflight] [STEP: fs] Permission check finished (violations={})",
        report.errors.len()
    );
    report
}

/// Write + delete probe via a temp file inside the directory.
async fn probe_directory(dir: &Path, identity: &str) -> Option<String> {
    let probe = dir.join(".storefront_write_probe.tmp");
    if tokio::fs::write(&probe, b"ok").await.is_err() {
        return Some(format!(
            "The '{}' account is not granted write permission on directory '{}'.",
            identity,
            dir.display()
        ));
    }
    if tokio::fs::remove_file(&probe).await.is_err() {
        return Some(format!(
            "The '{}' account is not granted delete permission on directory '{}'.",
            identity,
            dir.display()
        ));
    }
    None
}

/// Modify probe: the file must be writable in place.
async fn probe_file(file: &Path, identity: &str) -> Option<String> {
    use tokio::fs::OpenOptions;
    match OpenOptions::new().append(true).open(file).await {
        Ok(_) => None,
        Err(_) => Some(format!(
            "The '{}' account is not granted modify permission on file '{}'.",
            identity,
            file.display()
        )),
    }
}
