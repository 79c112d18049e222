// Module installer
//
// Iterates the module catalog and runs each module's install hook inside a
// transactional scope with essential-only hooks (bulk seeding bypasses the
// expensive business-rule hooks). This is the one stage with explicit
// partial-failure tolerance: a bad module is logged, removed from the
// installed registry, and skipped. It never aborts the installation.

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::models::state::{CancelToken, InstallationStateStore};
use crate::seed::locale::localize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub system_name: String,
    pub friendly_name: String,
}

/// Catalog of discoverable feature units. The orchestrator does not own this
/// data, it only iterates it; `install` resolves an installable instance and
/// invokes its install hook inside a commit scope.
#[async_trait]
pub trait ModuleCatalog: Send + Sync {
    async fn modules(&self) -> Result<Vec<ModuleDescriptor>>;

    /// Run the module's install hook. `essential_hooks_only` skips expensive
    /// business-rule hooks during bulk seeding.
    async fn install(
        &self,
        descriptor: &ModuleDescriptor,
        essential_hooks_only: bool,
    ) -> Result<()>;

    /// Remove a module from the installed registry after its hook failed.
    async fn mark_uninstalled(&self, system_name: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOutcome {
    Installed,
    Failed(String),
}

/// Install every catalog module except the globally ignored ones, in catalog
/// order, reporting "(i of N)" progress per module. Failures are independent.
pub async fn install_modules(
    catalog: &dyn ModuleCatalog,
    ignored: &[String],
    states: &InstallationStateStore,
    cancel: &CancelToken,
    language: &str,
) -> Result<Vec<(ModuleDescriptor, ModuleOutcome)>> {
    let modules: Vec<ModuleDescriptor> = catalog
        .modules()
        .await?
        .into_iter()
        .filter(|m| !ignored.iter().any(|i| i.eq_ignore_ascii_case(&m.system_name)))
        .collect();

    let total = modules.len();
    let template = localize("Progress.InstallingModules", language);
    let mut outcomes = Vec::with_capacity(total);

    for (index, descriptor) in modules.into_iter().enumerate() {
        cancel.ensure_not_cancelled()?;

        let message = template
            .replace("{current}", &(index + 1).to_string())
            .replace("{total}", &total.to_string());
        states.progress(|s| s.progress_message = message.clone());
        info!(
            "[PHASE: modules] [STEP: install] Installing module '{}' ({} of {})",
            descriptor.system_name,
            index + 1,
            total
        );

        match catalog.install(&descriptor, true).await {
            Ok(()) => outcomes.push((descriptor, ModuleOutcome::Installed)),
            Err(e) => {
                warn!(
                    "[PHASE: modules] [STEP: install] Module '{}' failed to install; skipping (error={:?})",
                    descriptor.system_name, e
                );
                if let Err(remove_err) = catalog.mark_uninstalled(&descriptor.system_name).await {
                    warn!(
                        "[PHASE: modules] [STEP: install] Failed to remove '{}' from the installed registry (error={:?})",
                        descriptor.system_name, remove_err
                    );
                }
                outcomes.push((descriptor, ModuleOutcome::Failed(e.to_string())));
            }
        }
    }

    Ok(outcomes)
}
