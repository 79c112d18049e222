// End-to-end installation flow tests against stub collaborators.
//
// The stubs record every call so the tests can assert ordering, rollback, and
// isolation behavior deterministically, without a real database.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use storefront_install::seed::provider::{
    ActivityLogType, BundleItem, Campaign, CategorySeed, Country, Currency, CustomerSeed,
    DeliveryTime, Discount, EmailAccount, LanguageSeed, ManufacturerSeed, MeasureDimension,
    MeasureWeight, MediaPlaceholder, MenuSeed, MessageTemplate, ProductAttribute, ProductSeed,
    QuantityUnit, RuleSet, ScheduledTask, Setting, ShippingMethod, SpecificationAttribute,
    StoreSeed, TaxCategory, Topic, UrlRecord, VariantCombination, ViewTemplate,
};
use storefront_install::{
    CancelToken, ConnectionDescriptor, DbConnectionInfo, InstallError, InstallPaths,
    InstallSettings, InstallationDatabase, InstallationRequest, InstallationStateStore, Installer,
    MediaFile, MediaStorage, MediaStorageKind, ModuleCatalog, ModuleDescriptor, SeedStore,
    SettingsStore,
};

// =============================================================================
// Stub collaborators
// =============================================================================

/// Records every persistence call in order; optionally fails at one call.
#[derive(Default)]
struct RecordingStore {
    events: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl RecordingStore {
    fn new() -> Self {
        Self::default()
    }

    fn failing_at(event: &str) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail_on: Some(event.to_string()),
        }
    }

    fn record(&self, event: &str) -> Result<()> {
        self.events.lock().unwrap().push(event.to_string());
        if self.fail_on.as_deref() == Some(event) {
            anyhow::bail!("stub failure at '{}'", event);
        }
        Ok(())
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    fn position(&self, event: &str) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

#[async_trait]
impl SeedStore for RecordingStore {
    async fn set_bulk_mode(&self, bulk: bool) -> Result<()> {
        self.record(&format!("set_bulk_mode:{}", bulk))
    }

    async fn insert_media_placeholders(&self, _items: Vec<MediaPlaceholder>) -> Result<()> {
        self.record("insert_media_placeholders")
    }

    async fn insert_currencies(&self, _items: Vec<Currency>) -> Result<()> {
        self.record("insert_currencies")
    }

    async fn insert_store(&self, _store: StoreSeed) -> Result<u64> {
        self.record("insert_store")?;
        Ok(1)
    }

    async fn insert_language(&self, _language: LanguageSeed, default_store_id: u64) -> Result<u64> {
        self.record(&format!("insert_language:store={}", default_store_id))?;
        Ok(1)
    }

    async fn insert_measures(
        &self,
        _dimensions: Vec<MeasureDimension>,
        _weights: Vec<MeasureWeight>,
    ) -> Result<()> {
        self.record("insert_measures")
    }

    async fn insert_tax_categories(
        &self,
        items: Vec<TaxCategory>,
    ) -> Result<Vec<(TaxCategory, u64)>> {
        self.record("insert_tax_categories")?;
        Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, c)| (c, (i + 1) as u64))
            .collect())
    }

    async fn insert_countries(&self, _items: Vec<Country>) -> Result<()> {
        self.record("insert_countries")
    }

    async fn insert_shipping_methods(&self, _items: Vec<ShippingMethod>) -> Result<()> {
        self.record("insert_shipping_methods")
    }

    async fn insert_delivery_times(&self, _items: Vec<DeliveryTime>) -> Result<()> {
        self.record("insert_delivery_times")
    }

    async fn insert_quantity_units(&self, _items: Vec<QuantityUnit>) -> Result<()> {
        self.record("insert_quantity_units")
    }

    async fn insert_customer(&self, customer: CustomerSeed) -> Result<u64> {
        self.record(&format!("insert_customer:{}", customer.email))?;
        Ok(42)
    }

    async fn assign_customer_role(&self, customer_id: u64, role: &str) -> Result<()> {
        self.record(&format!("assign_role:{}:{}", customer_id, role))
    }

    async fn set_customer_password_hash(&self, email: &str, _hash: &str) -> Result<()> {
        self.record(&format!("set_password_hash:{}", email))
    }

    async fn insert_email_accounts(&self, _items: Vec<EmailAccount>) -> Result<()> {
        self.record("insert_email_accounts")
    }

    async fn insert_message_templates(&self, _items: Vec<MessageTemplate>) -> Result<()> {
        self.record("insert_message_templates")
    }

    async fn insert_topics(&self, _items: Vec<Topic>) -> Result<()> {
        self.record("insert_topics")
    }

    async fn insert_settings(&self, items: Vec<Setting>, _default_store_id: u64) -> Result<()> {
        let label = items
            .first()
            .map(|s| s.name.clone())
            .unwrap_or_else(|| "empty".to_string());
        self.record(&format!("insert_settings:{}", label))
    }

    async fn insert_activity_log_types(&self, _items: Vec<ActivityLogType>) -> Result<()> {
        self.record("insert_activity_log_types")
    }

    async fn insert_view_templates(&self, _items: Vec<ViewTemplate>) -> Result<()> {
        self.record("insert_view_templates")
    }

    async fn insert_scheduled_tasks(&self, _items: Vec<ScheduledTask>) -> Result<()> {
        self.record("insert_scheduled_tasks")
    }

    async fn import_locale_resources(
        &self,
        language: &str,
        _resources: Vec<(String, String)>,
    ) -> Result<()> {
        self.record(&format!("import_locale_resources:{}", language))
    }

    async fn insert_menus(&self, _items: Vec<MenuSeed>) -> Result<()> {
        self.record("insert_menus")
    }

    async fn insert_specification_attributes(
        &self,
        _items: Vec<SpecificationAttribute>,
    ) -> Result<()> {
        self.record("insert_specification_attributes")
    }

    async fn insert_product_attributes(&self, _items: Vec<ProductAttribute>) -> Result<()> {
        self.record("insert_product_attributes")
    }

    async fn insert_campaigns(&self, _items: Vec<Campaign>) -> Result<()> {
        self.record("insert_campaigns")
    }

    async fn insert_rule_sets(&self, _items: Vec<RuleSet>) -> Result<()> {
        self.record("insert_rule_sets")
    }

    async fn insert_discounts(&self, _items: Vec<Discount>) -> Result<()> {
        self.record("insert_discounts")
    }

    async fn insert_categories(&self, items: Vec<CategorySeed>) -> Result<Vec<(String, u64)>> {
        self.record("insert_categories")?;
        Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, c)| (c.name, (i + 1) as u64))
            .collect())
    }

    async fn insert_manufacturers(
        &self,
        items: Vec<ManufacturerSeed>,
    ) -> Result<Vec<(String, u64)>> {
        self.record("insert_manufacturers")?;
        Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, m)| (m.name, (i + 1) as u64))
            .collect())
    }

    async fn insert_products(&self, items: Vec<ProductSeed>) -> Result<Vec<(ProductSeed, u64)>> {
        self.record("insert_products")?;
        Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, p)| (p, (i + 1) as u64))
            .collect())
    }

    async fn attach_product_download(&self, product_id: u64) -> Result<()> {
        self.record(&format!("attach_product_download:{}", product_id))
    }

    async fn repair_product_main_pictures(&self) -> Result<()> {
        self.record("repair_product_main_pictures")
    }

    async fn link_grouped_product(&self, parent_id: u64, child_id: u64) -> Result<()> {
        self.record(&format!("link_grouped_product:{}:{}", parent_id, child_id))
    }

    async fn insert_bundle_items(&self, _items: Vec<BundleItem>) -> Result<()> {
        self.record("insert_bundle_items")
    }

    async fn insert_variant_combinations(&self, _items: Vec<VariantCombination>) -> Result<()> {
        self.record("insert_variant_combinations")
    }

    async fn insert_product_tags(&self, product_id: u64, _tags: Vec<String>) -> Result<()> {
        self.record(&format!("insert_product_tags:{}", product_id))
    }

    async fn insert_url_records(&self, _records: Vec<UrlRecord>) -> Result<()> {
        self.record("insert_url_records")
    }

    async fn media_files_with_db_payload(&self) -> Result<Vec<MediaFile>> {
        self.record("media_files_with_db_payload")?;
        Ok(vec![MediaFile {
            id: 7,
            name: "product-placeholder.png".to_string(),
            mime_type: "image/png".to_string(),
            payload: vec![1, 2, 3],
        }])
    }

    async fn clear_media_payload(&self, media_id: u64) -> Result<()> {
        self.record(&format!("clear_media_payload:{}", media_id))
    }

    async fn albums(&self) -> Result<Vec<String>> {
        self.record("albums")?;
        Ok(vec!["catalog".to_string(), "content".to_string()])
    }

    async fn detect_album_tracks(&self, album: &str) -> Result<()> {
        self.record(&format!("detect_album_tracks:{}", album))
    }
}

/// Database stub with a configurable probe result and failure injection.
#[derive(Default)]
struct StubDatabase {
    can_connect: bool,
    calls: Mutex<Vec<String>>,
    fail_populate: bool,
    /// Requests cancellation while schema creation runs (for the
    /// between-stages cancellation test).
    cancel_during_create: Mutex<Option<CancelToken>>,
}

impl StubDatabase {
    fn pre_existing() -> Self {
        Self {
            can_connect: true,
            ..Default::default()
        }
    }

    fn fresh() -> Self {
        Self::default()
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn called(&self, name: &str) -> bool {
        self.calls().iter().any(|c| c == name)
    }
}

#[async_trait]
impl InstallationDatabase for StubDatabase {
    async fn can_connect(&self, _descriptor: &ConnectionDescriptor) -> bool {
        self.calls.lock().unwrap().push("can_connect".to_string());
        self.can_connect
    }

    async fn ensure_created(
        &self,
        _descriptor: &ConnectionDescriptor,
        _collation: Option<&str>,
    ) -> Result<()> {
        self.calls.lock().unwrap().push("ensure_created".to_string());
        if let Some(token) = self.cancel_during_create.lock().unwrap().as_ref() {
            token.request();
        }
        Ok(())
    }

    async fn ensure_deleted(&self, _descriptor: &ConnectionDescriptor) -> Result<()> {
        self.calls.lock().unwrap().push("ensure_deleted".to_string());
        Ok(())
    }

    async fn ensure_schema_populated(&self, _descriptor: &ConnectionDescriptor) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push("ensure_schema_populated".to_string());
        if self.fail_populate {
            anyhow::bail!("stub migration failure");
        }
        Ok(())
    }

    async fn seed_pending_locale_resources(
        &self,
        _descriptor: &ConnectionDescriptor,
        _language: &str,
        since_version: u32,
    ) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("seed_pending_locale_resources:{}", since_version));
        Ok(())
    }
}

/// Catalog stub; `failing` names modules whose install hook throws.
struct StubCatalog {
    modules: Vec<ModuleDescriptor>,
    failing: Vec<String>,
    installed: Mutex<Vec<String>>,
    uninstalled: Mutex<Vec<String>>,
}

impl StubCatalog {
    fn with_modules(names: &[&str], failing: &[&str]) -> Self {
        Self {
            modules: names
                .iter()
                .map(|n| ModuleDescriptor {
                    system_name: n.to_string(),
                    friendly_name: format!("Module {}", n),
                })
                .collect(),
            failing: failing.iter().map(|s| s.to_string()).collect(),
            installed: Mutex::new(Vec::new()),
            uninstalled: Mutex::new(Vec::new()),
        }
    }

    fn installed(&self) -> Vec<String> {
        self.installed.lock().unwrap().clone()
    }

    fn uninstalled(&self) -> Vec<String> {
        self.uninstalled.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModuleCatalog for StubCatalog {
    async fn modules(&self) -> Result<Vec<ModuleDescriptor>> {
        Ok(self.modules.clone())
    }

    async fn install(
        &self,
        descriptor: &ModuleDescriptor,
        essential_hooks_only: bool,
    ) -> Result<()> {
        assert!(essential_hooks_only, "bulk seeding must use essential hooks");
        if self.failing.contains(&descriptor.system_name) {
            anyhow::bail!("install hook failed for '{}'", descriptor.system_name);
        }
        self.installed
            .lock()
            .unwrap()
            .push(descriptor.system_name.clone());
        Ok(())
    }

    async fn mark_uninstalled(&self, system_name: &str) -> Result<()> {
        self.uninstalled.lock().unwrap().push(system_name.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct StubMediaStorage {
    saved: Mutex<Vec<String>>,
}

impl StubMediaStorage {
    fn new() -> Self {
        Self::default()
    }

    fn saved(&self) -> Vec<String> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaStorage for StubMediaStorage {
    async fn save(&self, file: &MediaFile, data: Vec<u8>) -> Result<()> {
        assert!(!data.is_empty(), "payload must be streamed to the backend");
        self.saved.lock().unwrap().push(file.name.clone());
        Ok(())
    }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    installer: Installer,
    database: Arc<StubDatabase>,
    store: Arc<RecordingStore>,
    catalog: Arc<StubCatalog>,
    media: Arc<StubMediaStorage>,
    settings: Arc<SettingsStore>,
    states: Arc<InstallationStateStore>,
    tempdir: tempfile::TempDir,
}

fn harness(
    database: StubDatabase,
    store: RecordingStore,
    catalog: StubCatalog,
    media: StubMediaStorage,
) -> Harness {
    let tempdir = tempfile::tempdir().unwrap();
    let paths = InstallPaths::under(tempdir.path());
    let settings = Arc::new(SettingsStore::new(paths.settings_file.clone()));
    let states = Arc::new(InstallationStateStore::new());

    let database = Arc::new(database);
    let store = Arc::new(store);
    let catalog = Arc::new(catalog);
    let media = Arc::new(media);

    let installer = Installer::new(
        Arc::clone(&database) as Arc<dyn InstallationDatabase>,
        Arc::clone(&store) as Arc<dyn SeedStore>,
        Arc::clone(&catalog) as Arc<dyn ModuleCatalog>,
        Arc::clone(&media) as Arc<dyn MediaStorage>,
        Arc::clone(&settings),
        Arc::clone(&states),
        paths,
        tempdir.path().join("resources"),
    );

    Harness {
        installer,
        database,
        store,
        catalog,
        media,
        settings,
        states,
        tempdir,
    }
}

fn raw_request() -> InstallationRequest {
    InstallationRequest {
        admin_email: "admin@example.com".to_string(),
        admin_password: "S3cretPass".to_string(),
        confirm_password: "S3cretPass".to_string(),
        primary_language: "en-US".to_string(),
        data_provider: "postgres".to_string(),
        media_storage: MediaStorageKind::Db,
        create_database: true,
        connection: DbConnectionInfo {
            raw_connection_string: Some("postgres://admin:pw@localhost:5432/shop".to_string()),
            ..Default::default()
        },
        use_custom_collation: false,
        collation: None,
        install_sample_data: false,
        callback_url: None,
    }
}

// =============================================================================
// Example scenarios (mandatory-only success, bad connection string)
// =============================================================================

#[tokio::test]
async fn mandatory_scenario_completes_without_sample_data() {
    // INTENT: valid raw connection string + InstallSampleData=false runs all
    // mandatory steps, skips the sample branch, and succeeds with a redirect.
    let h = harness(
        StubDatabase::fresh(),
        RecordingStore::new(),
        StubCatalog::with_modules(&["Payments", "Shipping"], &[]),
        StubMediaStorage::new(),
    );

    let state = h.installer.install(raw_request()).await.unwrap();

    assert!(state.completed);
    assert!(state.success, "errors: {:?}", state.errors);
    assert!(state.errors.is_empty());
    assert_eq!(state.redirect_url.as_deref(), Some("http://localhost/"));

    let events = h.store.events();
    assert!(events.contains(&"insert_currencies".to_string()));
    assert!(events.contains(&"insert_menus".to_string()));
    // Sample branch must not have run.
    assert!(!events.iter().any(|e| e.starts_with("insert_products")));
    assert!(!events.iter().any(|e| e.starts_with("insert_categories")));

    // Both modules installed.
    assert_eq!(h.catalog.installed(), vec!["Payments", "Shipping"]);

    // The deployment is now marked installed.
    assert!(h.settings.is_installed());
    // Schema was created by this run (fresh database).
    assert!(h.database.called("ensure_created"));
    assert!(!h.database.called("ensure_deleted"));
}

#[tokio::test]
async fn unparsable_connection_string_fails_before_any_provisioning() {
    // INTENT: the format error is the only error and nothing was touched.
    let h = harness(
        StubDatabase::fresh(),
        RecordingStore::new(),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );

    let mut request = raw_request();
    request.connection.raw_connection_string = Some("definitely not a connection string".into());

    let state = h.installer.install(request).await.unwrap();

    assert!(state.completed);
    assert!(!state.success);
    assert_eq!(
        state.errors,
        vec!["Connection string has the wrong format.".to_string()]
    );
    assert!(state.redirect_url.is_none());

    assert!(h.database.calls().is_empty(), "no database call expected");
    assert!(h.store.events().is_empty(), "no seeding expected");
    assert!(!h.settings.is_installed());
}

// =============================================================================
// Single-flight and idempotent short-circuit
// =============================================================================

#[tokio::test]
async fn second_attempt_while_in_flight_fails_busy() {
    let h = harness(
        StubDatabase::fresh(),
        RecordingStore::new(),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );

    // Simulate an in-flight run: begin through the guard, then leave the
    // state non-terminal.
    storefront_install::install::guard::try_begin(&h.states, &h.settings).unwrap();
    h.states
        .progress(|s| s.progress_message = "Populating currencies...".to_string());

    let err = h.installer.install(raw_request()).await.unwrap_err();
    assert!(matches!(err, InstallError::AlreadyRunning));

    // The first attempt's state is untouched.
    let snap = h.states.snapshot().unwrap();
    assert_eq!(snap.progress_message, "Populating currencies...");
    assert!(!snap.completed);
    assert!(h.store.events().is_empty());
}

#[tokio::test]
async fn already_installed_short_circuits_with_zero_side_effects() {
    let h = harness(
        StubDatabase::fresh(),
        RecordingStore::new(),
        StubCatalog::with_modules(&["Payments"], &[]),
        StubMediaStorage::new(),
    );

    let mut persisted = InstallSettings::new("postgres", "postgres://u:p@h/db");
    persisted.mark_installed();
    h.settings.save(&persisted).await.unwrap();

    let state = h.installer.install(raw_request()).await.unwrap();

    assert!(state.completed);
    assert!(state.success);
    assert!(h.database.calls().is_empty());
    assert!(h.store.events().is_empty());
    assert!(h.catalog.installed().is_empty());
}

// =============================================================================
// Ordering
// =============================================================================

#[tokio::test]
async fn store_is_seeded_before_language_and_tax_categories_before_tax_settings() {
    let h = harness(
        StubDatabase::pre_existing(),
        RecordingStore::new(),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );

    let state = h.installer.install(raw_request()).await.unwrap();
    assert!(state.success, "errors: {:?}", state.errors);

    let store_pos = h.store.position("insert_store").expect("store seeded");
    let language_pos = h
        .store
        .position("insert_language:store=1")
        .expect("language seeded with captured store id");
    assert!(
        store_pos < language_pos,
        "store must be seeded (and its id captured) before the language"
    );

    let tax_pos = h
        .store
        .position("insert_tax_categories")
        .expect("tax categories seeded");
    let tax_settings_pos = h
        .store
        .position("insert_settings:Tax.TaxRate.1")
        .expect("tax-rate settings keyed by category id");
    assert!(
        tax_pos < tax_settings_pos,
        "tax categories must exist before settings referencing their ids"
    );

    // The deferred admin rehash happens after the settings step.
    let settings_pos = h
        .store
        .position("insert_settings:CatalogSettings.DefaultPageSize")
        .expect("settings seeded");
    let rehash_pos = h
        .store
        .position("set_password_hash:admin@example.com")
        .expect("admin password rehashed");
    assert!(settings_pos < rehash_pos);
}

#[tokio::test]
async fn sample_branch_runs_strictly_after_mandatory_steps() {
    let h = harness(
        StubDatabase::pre_existing(),
        RecordingStore::new(),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );

    let mut request = raw_request();
    request.install_sample_data = true;

    let state = h.installer.install(request).await.unwrap();
    assert!(state.success, "errors: {:?}", state.errors);

    let menus_pos = h.store.position("insert_menus").unwrap();
    let first_sample_pos = h.store.position("insert_specification_attributes").unwrap();
    assert!(menus_pos < first_sample_pos);

    // Products get downloads, picture repair, slugs, and grouped links.
    let events = h.store.events();
    assert!(events.contains(&"attach_product_download:3".to_string()));
    assert!(events.contains(&"repair_product_main_pictures".to_string()));
    assert!(events.contains(&"link_grouped_product:1:4".to_string()));
    assert!(events.contains(&"insert_bundle_items".to_string()));
}

// =============================================================================
// Rollback correctness
// =============================================================================

#[tokio::test]
async fn failure_after_self_created_schema_deletes_it() {
    // Fresh database: the run creates the schema, then a seed step fails.
    let h = harness(
        StubDatabase::fresh(),
        RecordingStore::failing_at("insert_currencies"),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );

    let state = h.installer.install(raw_request()).await.unwrap();

    assert!(state.completed);
    assert!(!state.success);
    assert!(state.redirect_url.is_none());
    assert_eq!(state.errors.len(), 1);
    assert!(
        state.errors[0].contains("Seed step 'currencies' failed"),
        "failure must be attributed by step name: {:?}",
        state.errors
    );
    assert!(
        state.errors[0].contains("stub failure at 'insert_currencies'"),
        "innermost cause must be appended: {:?}",
        state.errors
    );

    assert!(h.database.called("ensure_created"));
    assert!(h.database.called("ensure_deleted"));
    // Settings were cleared; a retry starts clean.
    assert!(!h.settings.is_installed());
    assert!(h.settings.load().is_none());
}

#[tokio::test]
async fn failure_with_pre_existing_schema_never_deletes_it() {
    let h = harness(
        StubDatabase::pre_existing(),
        RecordingStore::failing_at("insert_currencies"),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );

    let state = h.installer.install(raw_request()).await.unwrap();

    assert!(!state.success);
    assert!(!h.database.called("ensure_created"));
    assert!(
        !h.database.called("ensure_deleted"),
        "a pre-existing database must never be dropped"
    );
}

#[tokio::test]
async fn migration_failure_rolls_back_self_created_schema() {
    let database = StubDatabase {
        fail_populate: true,
        ..StubDatabase::fresh()
    };
    let h = harness(
        database,
        RecordingStore::new(),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );

    let state = h.installer.install(raw_request()).await.unwrap();

    assert!(!state.success);
    assert!(
        state.errors[0].contains("Schema migration failed"),
        "errors: {:?}",
        state.errors
    );
    assert!(h.database.called("ensure_deleted"));
    assert!(h.store.events().is_empty(), "seeding must not have started");
}

#[tokio::test]
async fn retry_after_terminal_failure_is_allowed() {
    let h = harness(
        StubDatabase::pre_existing(),
        RecordingStore::failing_at("insert_currencies"),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );

    let first = h.installer.install(raw_request()).await.unwrap();
    assert!(first.completed && !first.success);

    // The stub still fails at the same step, but the guard must let the
    // attempt begin again after a terminal state.
    let second = h.installer.install(raw_request()).await.unwrap();
    assert!(second.completed && !second.success);
}

// =============================================================================
// Module isolation
// =============================================================================

#[tokio::test]
async fn failing_module_is_skipped_without_failing_the_installation() {
    let h = harness(
        StubDatabase::pre_existing(),
        RecordingStore::new(),
        StubCatalog::with_modules(&["Payments", "Broken", "Shipping"], &["Broken"]),
        StubMediaStorage::new(),
    );

    let state = h.installer.install(raw_request()).await.unwrap();

    assert!(state.success, "errors: {:?}", state.errors);
    assert!(state.errors.is_empty(), "module failures never surface");
    assert_eq!(h.catalog.installed(), vec!["Payments", "Shipping"]);
    // The broken module was removed from the installed registry.
    assert_eq!(h.catalog.uninstalled(), vec!["Broken"]);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test]
async fn cancellation_between_creation_and_migration_prevents_migration() {
    let database = StubDatabase::fresh();
    let h = harness(
        database,
        RecordingStore::new(),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );
    // Arm the stub: cancellation is requested while schema creation runs, so
    // the boundary check before migration must observe it.
    *h.database.cancel_during_create.lock().unwrap() = Some(h.installer.cancel_token());

    let state = h.installer.install(raw_request()).await.unwrap();

    assert!(state.completed, "cancellation must yield a terminal state");
    assert!(!state.success);
    assert!(state.errors.iter().any(|e| e.contains("cancelled")));

    assert!(h.database.called("ensure_created"));
    assert!(
        !h.database.called("ensure_schema_populated"),
        "the stage after the cancellation point must not start"
    );
    // Self-created schema is rolled back on cancellation like any other error.
    assert!(h.database.called("ensure_deleted"));
    assert!(h.store.events().is_empty());
}

// =============================================================================
// Media reconciliation
// =============================================================================

#[tokio::test]
async fn filesystem_media_backend_moves_binaries_and_detects_tracks() {
    let h = harness(
        StubDatabase::pre_existing(),
        RecordingStore::new(),
        StubCatalog::with_modules(&["Payments"], &[]),
        StubMediaStorage::new(),
    );

    let mut request = raw_request();
    request.media_storage = MediaStorageKind::Fs;

    let state = h.installer.install(request).await.unwrap();
    assert!(state.success, "errors: {:?}", state.errors);

    assert_eq!(h.media.saved(), vec!["product-placeholder.png"]);

    let events = h.store.events();
    // Change tracking is re-enabled for the reconciliation pass.
    let bulk_off = events
        .iter()
        .position(|e| e == "set_bulk_mode:false")
        .expect("change tracking re-enabled");
    let cleared = events
        .iter()
        .position(|e| e == "clear_media_payload:7")
        .expect("db payload cleared");
    assert!(bulk_off < cleared);
    assert!(events.contains(&"detect_album_tracks:catalog".to_string()));
    assert!(events.contains(&"detect_album_tracks:content".to_string()));

    // Reconciliation runs after the modules were installed.
    assert_eq!(h.catalog.installed(), vec!["Payments"]);
}

#[tokio::test]
async fn database_media_backend_is_a_noop() {
    let h = harness(
        StubDatabase::pre_existing(),
        RecordingStore::new(),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );

    let state = h.installer.install(raw_request()).await.unwrap();
    assert!(state.success);
    assert!(h.media.saved().is_empty());
    assert!(!h
        .store
        .events()
        .contains(&"media_files_with_db_payload".to_string()));
}

// =============================================================================
// Locale resource import
// =============================================================================

#[tokio::test]
async fn locale_resources_are_imported_with_head_version_catch_up() {
    let h = harness(
        StubDatabase::pre_existing(),
        RecordingStore::new(),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );

    let resources = h.tempdir.path().join("resources");
    std::fs::create_dir_all(&resources).unwrap();
    std::fs::write(
        resources.join("en-US.json"),
        r#"{ "language": "en-US", "minVersion": 1, "resources": { "Admin": { "Save": "Save" } } }"#,
    )
    .unwrap();
    std::fs::write(resources.join("head-version.txt"), "12").unwrap();

    let state = h.installer.install(raw_request()).await.unwrap();
    assert!(state.success, "errors: {:?}", state.errors);

    assert!(h
        .store
        .events()
        .contains(&"import_locale_resources:en-US".to_string()));
    // Catch-up runs through the migration engine with the head version.
    assert!(h
        .database
        .calls()
        .contains(&"seed_pending_locale_resources:12".to_string()));
}

// =============================================================================
// Progress visibility
// =============================================================================

#[tokio::test]
async fn poller_observes_progress_and_terminal_state() {
    let h = harness(
        StubDatabase::pre_existing(),
        RecordingStore::new(),
        StubCatalog::with_modules(&[], &[]),
        StubMediaStorage::new(),
    );

    let observed = Arc::new(AtomicBool::new(false));
    let states = Arc::clone(&h.states);
    let observed_clone = Arc::clone(&observed);
    let poller = tokio::spawn(async move {
        loop {
            if let Some(state) = states.snapshot() {
                if !state.progress_message.is_empty() {
                    observed_clone.store(true, Ordering::SeqCst);
                }
                if state.completed {
                    return state;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
    });

    let state = h.installer.install(raw_request()).await.unwrap();
    assert!(state.success);

    let polled = poller.await.unwrap();
    assert!(polled.completed);
    assert!(observed.load(Ordering::SeqCst));
}
