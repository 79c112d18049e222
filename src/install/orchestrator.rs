// Installation orchestrator
//
// One long-lived asynchronous task per installation attempt: guard →
// connection resolution → filesystem preflight → schema provisioning → seed
// pipeline → module installs → media reconciliation → finalize. There is no
// internal parallelism; strict step ordering is a correctness requirement.
// Any unrecovered error triggers the rollback policy: best-effort schema
// deletion (iff this run created it), settings cleanup, and a single composed
// error on the published state.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info};

use crate::database::connection::{resolve_descriptor, ConnectionDescriptor};
use crate::database::provisioning::{InstallationDatabase, SchemaProvisioner};
use crate::error::{compose_error_message, InstallError};
use crate::install::guard::{self, BeginInstallation};
use crate::install::media::{reconcile_media, MediaStorage};
use crate::install::modules::{install_modules, ModuleCatalog, ModuleDescriptor, ModuleOutcome};
use crate::install::preflight::check_filesystem_permissions;
use crate::install::settings::{InstallSettings, SettingsStore};
use crate::models::requests::InstallationRequest;
use crate::models::state::{notify_callback, CancelToken, InstallationState, InstallationStateStore};
use crate::seed::locale::localize;
use crate::seed::pipeline::{SeedConfiguration, SeedPipeline, SeedStore};
use crate::seed::provider::resolve_provider;
use crate::utils::logging::mask_connection_string;
use crate::utils::paths::InstallPaths;

pub struct Installer {
    database: Arc<dyn InstallationDatabase>,
    store: Arc<dyn SeedStore>,
    catalog: Arc<dyn ModuleCatalog>,
    media: Arc<dyn MediaStorage>,
    settings: Arc<SettingsStore>,
    states: Arc<InstallationStateStore>,
    paths: InstallPaths,
    resources_dir: PathBuf,
    ignored_modules: Vec<String>,
    cancel: CancelToken,
}

impl Installer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        database: Arc<dyn InstallationDatabase>,
        store: Arc<dyn SeedStore>,
        catalog: Arc<dyn ModuleCatalog>,
        media: Arc<dyn MediaStorage>,
        settings: Arc<SettingsStore>,
        states: Arc<InstallationStateStore>,
        paths: InstallPaths,
        resources_dir: PathBuf,
    ) -> Self {
        Self {
            database,
            store,
            catalog,
            media,
            settings,
            states,
            paths,
            resources_dir,
            ignored_modules: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Module system names that are skipped during installation.
    pub fn with_ignored_modules(mut self, ignored: Vec<String>) -> Self {
        self.ignored_modules = ignored;
        self
    }

    /// Shared handle for requesting cooperative cancellation of the current run.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Live state snapshot for pollers.
    pub fn state_snapshot(&self) -> Option<InstallationState> {
        self.states.snapshot()
    }

    /// Run one end-to-end installation attempt.
    ///
    /// Returns the terminal state. `Err(AlreadyRunning)` is the only error:
    /// every other failure is reported through the published state so pollers
    /// and the direct caller observe the same result.
    pub async fn install(
        &self,
        request: InstallationRequest,
    ) -> Result<InstallationState, InstallError> {
        match guard::try_begin(&self.states, &self.settings)? {
            BeginInstallation::AlreadyInstalled(state) => return Ok(state),
            BeginInstallation::Proceed => {}
        }

        self.cancel.reset();
        info!(
            "[PHASE: install] [STEP: start] Installation attempt started (language={}, sample_data={}, media={:?})",
            request.primary_language, request.install_sample_data, request.media_storage
        );

        // Validation errors abort immediately, before any persistent mutation.
        if let Err(e) = request.validate() {
            return Ok(self.finish_failed(&request, vec![e.to_string()]));
        }

        let descriptor = match resolve_descriptor(&request.connection) {
            Ok(d) => d,
            Err(e) => return Ok(self.finish_failed(&request, vec![e.to_string()])),
        };
        info!(
            "[PHASE: install] [STEP: resolve] Connection resolved (masked_conn_str={})",
            mask_connection_string(&descriptor.connection_string())
        );

        // Filesystem failures are cheaper to detect and more helpful to report
        // in bulk than mid-provisioning failures.
        self.states.progress(|s| {
            s.progress_message = localize("Progress.CheckingPermissions", &request.primary_language)
        });
        let report = check_filesystem_permissions(&self.paths).await;
        if !report.ok() {
            return Ok(self.finish_failed(&request, report.errors));
        }

        // Everything beyond this point mutates persistent state and is covered
        // by the rollback policy.
        let provisioner = SchemaProvisioner::new(Arc::clone(&self.database));
        self.settings.set_test_mode(true);

        let result = self.provision_and_seed(&request, &descriptor, &provisioner).await;

        let state = match result {
            Ok(redirect_url) => {
                self.settings.set_test_mode(false);
                self.states.progress(|s| {
                    s.progress_message =
                        localize("Progress.Finalizing", &request.primary_language);
                    s.completed = true;
                    s.success = true;
                    s.redirect_url = Some(redirect_url);
                });
                info!("[PHASE: install] [STEP: complete] Installation finished successfully");
                let state = self.states.snapshot().unwrap_or_default();
                self.notify(&request, &state);
                state
            }
            Err(e) => {
                error!(
                    "[PHASE: install] [STEP: error] Installation failed: {:?}",
                    e
                );
                provisioner.rollback(&descriptor).await;
                self.settings.clear().await;
                self.settings.set_test_mode(false);
                let message = compose_error_message(&e);
                self.finish_failed(&request, vec![message])
            }
        };

        Ok(state)
    }

    async fn provision_and_seed(
        &self,
        request: &InstallationRequest,
        descriptor: &ConnectionDescriptor,
        provisioner: &SchemaProvisioner,
    ) -> Result<String> {
        let language = request.primary_language.as_str();

        // Persist connection settings up front (cleared again on failure) so a
        // crash mid-run cannot leave a half-marked deployment behind.
        self.settings
            .save(&InstallSettings::new(
                &request.data_provider,
                &descriptor.connection_string(),
            ))
            .await
            .context("Failed to persist connection settings")?;

        self.cancel.ensure_not_cancelled()?;
        self.states
            .progress(|s| s.progress_message = localize("Progress.CreatingDatabase", language));
        let collation = request
            .use_custom_collation
            .then(|| request.collation.as_deref().unwrap_or(""))
            .filter(|c| !c.is_empty());
        provisioner
            .ensure_schema(descriptor, collation, request.create_database)
            .await?;

        // Cancellation is honored between schema creation and migration.
        self.cancel.ensure_not_cancelled()?;
        self.states
            .progress(|s| s.progress_message = localize("Progress.CreatingTables", language));
        provisioner.populate_schema(descriptor).await?;

        // Bulk-insert mode for the whole seed phase; the media reconciler
        // re-enables change tracking for its targeted updates.
        self.store
            .set_bulk_mode(true)
            .await
            .context("Failed to enter bulk-insert mode")?;

        let config = SeedConfiguration {
            admin_email: request.admin_email.clone(),
            admin_password: request.admin_password.clone(),
            language: language.to_string(),
            install_sample_data: request.install_sample_data,
            provider: resolve_provider(language),
            resources_dir: self.resources_dir.clone(),
        };

        let mut pipeline = SeedPipeline::new(
            &*self.store,
            &*self.database,
            descriptor,
            &config,
            &self.states,
            &self.cancel,
        );
        pipeline.run().await?;
        let redirect_url = pipeline.store_url().unwrap_or("/").to_string();

        let outcomes = install_modules(
            &*self.catalog,
            &self.ignored_modules,
            &self.states,
            &self.cancel,
            language,
        )
        .await?;
        log_module_outcomes(&outcomes);

        // Trailing step, always: modules may have registered media themselves.
        reconcile_media(
            request.media_storage,
            &*self.store,
            &*self.media,
            &self.states,
            &self.cancel,
            language,
        )
        .await?;

        let mut settings = InstallSettings::new(
            &request.data_provider,
            &descriptor.connection_string(),
        );
        settings.mark_installed();
        self.settings
            .save(&settings)
            .await
            .context("Failed to persist final settings")?;

        Ok(redirect_url)
    }

    /// Terminal failure: completed, not successful, redirect cleared. Also
    /// fires the completion webhook so callers never have to poll a dead run.
    fn finish_failed(
        &self,
        request: &InstallationRequest,
        errors: Vec<String>,
    ) -> InstallationState {
        self.states.progress(|s| {
            s.completed = true;
            s.success = false;
            s.redirect_url = None;
            s.errors.extend(errors.iter().cloned());
        });
        let state = self.states.snapshot().unwrap_or_else(|| InstallationState {
            completed: true,
            success: false,
            errors,
            ..Default::default()
        });
        self.notify(request, &state);
        state
    }

    fn notify(&self, request: &InstallationRequest, state: &InstallationState) {
        if let Some(url) = request.callback_url.clone() {
            notify_callback(url, state.clone());
        }
    }
}

fn log_module_outcomes(outcomes: &[(ModuleDescriptor, ModuleOutcome)]) {
    let failed = outcomes
        .iter()
        .filter(|(_, o)| matches!(o, ModuleOutcome::Failed(_)))
        .count();
    info!(
        "[PHASE: modules] [STEP: summary] Module installation finished (installed={}, failed={})",
        outcomes.len() - failed,
        failed
    );
}
