// Filesystem layout for a deployment
//
// These are the paths the running process must be able to write to after
// install; the preflight checker probes every one of them up front.

use std::path::{Path, PathBuf};

use anyhow::Result;

#[derive(Debug, Clone)]
pub struct InstallPaths {
    /// Root application-data folder (settings, tenant data).
    pub app_data_dir: PathBuf,
    /// Per-tenant data below app-data.
    pub tenants_dir: PathBuf,
    /// Media/upload storage root for the filesystem backend.
    pub media_dir: PathBuf,
    /// Export/import scratch space.
    pub exported_dir: PathBuf,
    /// Log folder.
    pub log_dir: PathBuf,
    /// Persisted install settings document.
    pub settings_file: PathBuf,
}

impl InstallPaths {
    /// Resolve the standard layout below a base directory.
    pub fn under(base: &Path) -> Self {
        let app_data_dir = base.join("app_data");
        Self {
            tenants_dir: app_data_dir.join("tenants"),
            media_dir: app_data_dir.join("media"),
            exported_dir: app_data_dir.join("exported"),
            log_dir: base.join("logs"),
            settings_file: app_data_dir.join("settings.json"),
            app_data_dir,
        }
    }

    /// Resolve against the OS data directory, falling back to the working
    /// directory when the platform does not report one.
    pub fn resolve() -> Result<Self> {
        let base = dirs::data_dir()
            .map(|d| d.join("storefront"))
            .or_else(|| std::env::current_dir().ok())
            .ok_or_else(|| anyhow::anyhow!("Unable to resolve an application data directory"))?;
        Ok(Self::under(&base))
    }

    /// Directories the process must be able to write to, modify, and delete in.
    pub fn dirs_to_check(&self) -> Vec<&Path> {
        vec![
            self.app_data_dir.as_path(),
            self.tenants_dir.as_path(),
            self.media_dir.as_path(),
            self.exported_dir.as_path(),
            self.log_dir.as_path(),
        ]
    }

    /// Files the process must be able to write to and delete.
    pub fn files_to_check(&self) -> Vec<&Path> {
        vec![self.settings_file.as_path()]
    }
}

/// Effective OS identity for permission error messages.
pub fn current_os_identity() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_under_base() {
        let paths = InstallPaths::under(Path::new("/srv/storefront"));
        assert_eq!(paths.app_data_dir, Path::new("/srv/storefront/app_data"));
        assert_eq!(
            paths.settings_file,
            Path::new("/srv/storefront/app_data/settings.json")
        );
        assert!(paths.dirs_to_check().len() >= 5);
        assert_eq!(paths.files_to_check().len(), 1);
    }
}
