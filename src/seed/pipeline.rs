// Seed pipeline
//
// A strictly ordered sequence of named, idempotent populate steps. Each step
// reports a localized progress message before running and attributes its
// failure by name; the pipeline itself is all-or-nothing, recovery happens in
// the orchestrator's cleanup path. Bulk-insert mode stays on for throughput;
// the media reconciler re-enables change tracking afterwards.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

use crate::database::connection::ConnectionDescriptor;
use crate::database::provisioning::InstallationDatabase;
use crate::models::state::{CancelToken, InstallationStateStore};
use crate::seed::locale::{self, localize};
use crate::seed::provider::{
    slugify, BundleItem, Campaign, CategorySeed, Country, Currency, CustomerSeed, DeliveryTime,
    Discount, EmailAccount, LanguageSeed, ManufacturerSeed, MeasureDimension, MeasureWeight,
    MediaPlaceholder, MenuSeed, MessageTemplate, ProductAttribute, ProductSeed, QuantityUnit,
    RuleSet, ScheduledTask, SeedDataProvider, Setting, ShippingMethod, SpecificationAttribute,
    TaxCategory, Topic, UrlRecord, VariantCombination, ViewTemplate,
};
use crate::utils::crypto::hash_password;

/// A media record whose binary currently lives in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub id: u64,
    pub name: String,
    pub mime_type: String,
    #[serde(skip)]
    pub payload: Vec<u8>,
}

/// Persistence session consumed by the seed pipeline and the media
/// reconciler. The session runs in bulk-insert mode (change tracking off)
/// except where the reconciler re-enables it.
#[async_trait]
pub trait SeedStore: Send + Sync {
    async fn set_bulk_mode(&self, bulk: bool) -> Result<()>;

    async fn insert_media_placeholders(&self, items: Vec<MediaPlaceholder>) -> Result<()>;
    async fn insert_currencies(&self, items: Vec<Currency>) -> Result<()>;
    /// Returns the id of the default store.
    async fn insert_store(&self, store: crate::seed::provider::StoreSeed) -> Result<u64>;
    async fn insert_language(&self, language: LanguageSeed, default_store_id: u64) -> Result<u64>;
    async fn insert_measures(
        &self,
        dimensions: Vec<MeasureDimension>,
        weights: Vec<MeasureWeight>,
    ) -> Result<()>;
    /// Returns the assigned id per category, in input order.
    async fn insert_tax_categories(&self, items: Vec<TaxCategory>) -> Result<Vec<(TaxCategory, u64)>>;
    async fn insert_countries(&self, items: Vec<Country>) -> Result<()>;
    async fn insert_shipping_methods(&self, items: Vec<ShippingMethod>) -> Result<()>;
    async fn insert_delivery_times(&self, items: Vec<DeliveryTime>) -> Result<()>;
    async fn insert_quantity_units(&self, items: Vec<QuantityUnit>) -> Result<()>;

    async fn insert_customer(&self, customer: CustomerSeed) -> Result<u64>;
    async fn assign_customer_role(&self, customer_id: u64, role: &str) -> Result<()>;
    /// Replace the stored password for the account (used for the deferred
    /// admin rehash).
    async fn set_customer_password_hash(&self, email: &str, hash: &str) -> Result<()>;

    async fn insert_email_accounts(&self, items: Vec<EmailAccount>) -> Result<()>;
    async fn insert_message_templates(&self, items: Vec<MessageTemplate>) -> Result<()>;
    async fn insert_topics(&self, items: Vec<Topic>) -> Result<()>;
    /// Store-scoped settings are bound to `default_store_id`; everything else
    /// is saved globally.
    async fn insert_settings(&self, items: Vec<Setting>, default_store_id: u64) -> Result<()>;
    async fn insert_activity_log_types(
        &self,
        items: Vec<crate::seed::provider::ActivityLogType>,
    ) -> Result<()>;
    async fn insert_view_templates(&self, items: Vec<ViewTemplate>) -> Result<()>;
    async fn insert_scheduled_tasks(&self, items: Vec<ScheduledTask>) -> Result<()>;
    async fn import_locale_resources(
        &self,
        language: &str,
        resources: Vec<(String, String)>,
    ) -> Result<()>;
    async fn insert_menus(&self, items: Vec<MenuSeed>) -> Result<()>;

    // ----- sample data -----

    async fn insert_specification_attributes(
        &self,
        items: Vec<SpecificationAttribute>,
    ) -> Result<()>;
    async fn insert_product_attributes(&self, items: Vec<ProductAttribute>) -> Result<()>;
    async fn insert_campaigns(&self, items: Vec<Campaign>) -> Result<()>;
    async fn insert_rule_sets(&self, items: Vec<RuleSet>) -> Result<()>;
    async fn insert_discounts(&self, items: Vec<Discount>) -> Result<()>;
    /// Returns `(name, id)` per category, in input order.
    async fn insert_categories(&self, items: Vec<CategorySeed>) -> Result<Vec<(String, u64)>>;
    async fn insert_manufacturers(&self, items: Vec<ManufacturerSeed>) -> Result<Vec<(String, u64)>>;
    /// Returns `(seed, id)` per product, in input order.
    async fn insert_products(&self, items: Vec<ProductSeed>) -> Result<Vec<(ProductSeed, u64)>>;
    async fn attach_product_download(&self, product_id: u64) -> Result<()>;
    async fn repair_product_main_pictures(&self) -> Result<()>;
    async fn link_grouped_product(&self, parent_id: u64, child_id: u64) -> Result<()>;
    async fn insert_bundle_items(&self, items: Vec<BundleItem>) -> Result<()>;
    async fn insert_variant_combinations(&self, items: Vec<VariantCombination>) -> Result<()>;
    async fn insert_product_tags(&self, product_id: u64, tags: Vec<String>) -> Result<()>;
    async fn insert_url_records(&self, records: Vec<UrlRecord>) -> Result<()>;

    // ----- media reconciliation -----

    async fn media_files_with_db_payload(&self) -> Result<Vec<MediaFile>>;
    async fn clear_media_payload(&self, media_id: u64) -> Result<()>;
    async fn albums(&self) -> Result<Vec<String>>;
    async fn detect_album_tracks(&self, album: &str) -> Result<()>;
}

/// Read-only configuration for one seeding run, derived from the request plus
/// the resolved language provider.
pub struct SeedConfiguration {
    pub admin_email: String,
    pub admin_password: String,
    pub language: String,
    pub install_sample_data: bool,
    pub provider: Box<dyn SeedDataProvider>,
    /// Directory holding per-language resource documents and the head-version
    /// marker for catch-up imports.
    pub resources_dir: PathBuf,
}

pub struct SeedPipeline<'a> {
    store: &'a dyn SeedStore,
    database: &'a dyn InstallationDatabase,
    descriptor: &'a ConnectionDescriptor,
    config: &'a SeedConfiguration,
    states: &'a InstallationStateStore,
    cancel: &'a CancelToken,
    /// Captured while seeding stores; later steps depend on it.
    default_store_id: Option<u64>,
    store_url: Option<String>,
}

fn step_failed(name: &str) -> String {
    format!("Seed step '{}' failed", name)
}

impl<'a> SeedPipeline<'a> {
    pub fn new(
        store: &'a dyn SeedStore,
        database: &'a dyn InstallationDatabase,
        descriptor: &'a ConnectionDescriptor,
        config: &'a SeedConfiguration,
        states: &'a InstallationStateStore,
        cancel: &'a CancelToken,
    ) -> Self {
        Self {
            store,
            database,
            descriptor,
            config,
            states,
            cancel,
            default_store_id: None,
            store_url: None,
        }
    }

    /// URL of the default store, available after the mandatory steps ran.
    pub fn store_url(&self) -> Option<&str> {
        self.store_url.as_deref()
    }

    /// Id of the default store, captured while seeding stores.
    pub fn default_store_id(&self) -> Option<u64> {
        self.default_store_id
    }

    /// Cancellation check + localized progress message, at the boundary before
    /// each step. Progress reporting never fails: an unknown code is reported
    /// verbatim.
    fn announce(&self, step: &str, code: &str) -> Result<()> {
        self.cancel.ensure_not_cancelled()?;
        let message = localize(code, &self.config.language);
        info!("[PHASE: seed] [STEP: {}] {}", step, message);
        self.states.progress(|s| s.progress_message = message.clone());
        Ok(())
    }

    pub async fn run(&mut self) -> Result<()> {
        self.run_mandatory().await?;
        if self.config.install_sample_data {
            self.run_sample_data().await?;
        }
        Ok(())
    }

    async fn run_mandatory(&mut self) -> Result<()> {
        let p = &*self.config.provider;

        self.announce("media_placeholders", "Progress.SeedingMediaPlaceholders")?;
        self.store
            .insert_media_placeholders(p.media_placeholders())
            .await
            .with_context(|| step_failed("media placeholders"))?;

        self.announce("currencies", "Progress.SeedingCurrencies")?;
        self.store
            .insert_currencies(p.currencies())
            .await
            .with_context(|| step_failed("currencies"))?;

        self.announce("stores", "Progress.SeedingStores")?;
        let store_seed = p.store();
        self.store_url = Some(store_seed.url.clone());
        let store_id = self
            .store
            .insert_store(store_seed)
            .await
            .with_context(|| step_failed("stores"))?;
        self.default_store_id = Some(store_id);

        self.announce("language", "Progress.SeedingLanguage")?;
        self.store
            .insert_language(p.primary_language(), store_id)
            .await
            .with_context(|| step_failed("primary language"))?;

        self.announce("measures", "Progress.SeedingMeasures")?;
        self.store
            .insert_measures(p.measure_dimensions(), p.measure_weights())
            .await
            .with_context(|| step_failed("measures"))?;

        self.announce("tax_categories", "Progress.SeedingTaxCategories")?;
        let tax_categories = self
            .store
            .insert_tax_categories(p.tax_categories())
            .await
            .with_context(|| step_failed("tax categories"))?;
        // Fixed tax-rate settings are keyed by the category id just assigned.
        let tax_settings: Vec<Setting> = tax_categories
            .iter()
            .map(|(category, id)| Setting {
                name: format!("Tax.TaxRate.{}", id),
                value: category.fixed_rate.to_string(),
                store_scoped: false,
            })
            .collect();
        self.store
            .insert_settings(tax_settings, store_id)
            .await
            .with_context(|| step_failed("tax categories"))?;

        self.announce("countries", "Progress.SeedingCountries")?;
        self.store
            .insert_countries(p.countries())
            .await
            .with_context(|| step_failed("countries"))?;

        self.announce("shipping_methods", "Progress.SeedingShippingMethods")?;
        self.store
            .insert_shipping_methods(p.shipping_methods())
            .await
            .with_context(|| step_failed("shipping methods"))?;

        self.announce("delivery_times", "Progress.SeedingDeliveryTimes")?;
        self.store
            .insert_delivery_times(p.delivery_times())
            .await
            .with_context(|| step_failed("delivery times"))?;

        self.announce("quantity_units", "Progress.SeedingQuantityUnits")?;
        self.store
            .insert_quantity_units(p.quantity_units())
            .await
            .with_context(|| step_failed("quantity units"))?;

        self.announce("customers", "Progress.SeedingCustomers")?;
        // Administrator first, seeded with the plain password; rehashed later
        // once nothing else needs the plain value.
        let admin = CustomerSeed {
            email: self.config.admin_email.clone(),
            password: Some(self.config.admin_password.clone()),
            role: "Administrators".to_string(),
            system_account: false,
        };
        let admin_id = self
            .store
            .insert_customer(admin)
            .await
            .with_context(|| step_failed("customers"))?;
        self.store
            .assign_customer_role(admin_id, "Administrators")
            .await
            .with_context(|| step_failed("customers"))?;
        for customer in p.system_customers() {
            let role = customer.role.clone();
            let id = self
                .store
                .insert_customer(customer)
                .await
                .with_context(|| step_failed("customers"))?;
            self.store
                .assign_customer_role(id, &role)
                .await
                .with_context(|| step_failed("customers"))?;
        }

        self.announce("email_accounts", "Progress.SeedingEmailAccounts")?;
        self.store
            .insert_email_accounts(p.email_accounts())
            .await
            .with_context(|| step_failed("email accounts"))?;

        self.announce("message_templates", "Progress.SeedingMessageTemplates")?;
        self.store
            .insert_message_templates(p.message_templates())
            .await
            .with_context(|| step_failed("message templates"))?;

        self.announce("topics", "Progress.SeedingTopics")?;
        self.store
            .insert_topics(p.topics())
            .await
            .with_context(|| step_failed("topics"))?;

        self.announce("settings", "Progress.SeedingSettings")?;
        self.store
            .insert_settings(p.settings(), store_id)
            .await
            .with_context(|| step_failed("settings"))?;

        self.announce("activity_log_types", "Progress.SeedingActivityLogTypes")?;
        self.store
            .insert_activity_log_types(p.activity_log_types())
            .await
            .with_context(|| step_failed("activity log types"))?;

        self.announce("admin_password", "Progress.HashingAdminPassword")?;
        let hash = hash_password(&self.config.admin_password);
        self.store
            .set_customer_password_hash(&self.config.admin_email, &hash)
            .await
            .with_context(|| step_failed("admin password"))?;

        self.announce("view_templates", "Progress.SeedingViewTemplates")?;
        self.store
            .insert_view_templates(p.view_templates())
            .await
            .with_context(|| step_failed("view templates"))?;

        self.announce("scheduled_tasks", "Progress.SeedingScheduledTasks")?;
        self.store
            .insert_scheduled_tasks(p.scheduled_tasks())
            .await
            .with_context(|| step_failed("scheduled tasks"))?;

        self.announce("locale_resources", "Progress.ImportingResources")?;
        let documents =
            locale::load_resource_documents(&self.config.resources_dir, &self.config.language)
                .await
                .with_context(|| step_failed("locale resources"))?;
        for doc in &documents {
            self.store
                .import_locale_resources(&self.config.language, doc.flattened())
                .await
                .with_context(|| step_failed("locale resources"))?;
        }
        // Catch-up: resources added after the head migration version.
        if let Some(head_version) = locale::read_head_version(&self.config.resources_dir).await {
            self.database
                .seed_pending_locale_resources(self.descriptor, &self.config.language, head_version)
                .await
                .with_context(|| step_failed("locale resources"))?;
        }

        self.announce("menus", "Progress.SeedingMenus")?;
        self.store
            .insert_menus(p.menus())
            .await
            .with_context(|| step_failed("menus"))?;

        Ok(())
    }

    async fn run_sample_data(&mut self) -> Result<()> {
        let p = &*self.config.provider;

        self.announce("sample_spec_attributes", "Progress.SeedingSampleData")?;
        self.store
            .insert_specification_attributes(p.specification_attributes())
            .await
            .with_context(|| step_failed("specification attributes"))?;

        self.announce("sample_product_attributes", "Progress.SeedingSampleData")?;
        self.store
            .insert_product_attributes(p.product_attributes())
            .await
            .with_context(|| step_failed("product attributes"))?;

        self.announce("sample_campaigns", "Progress.SeedingSampleData")?;
        self.store
            .insert_campaigns(p.campaigns())
            .await
            .with_context(|| step_failed("campaigns"))?;

        self.announce("sample_rule_sets", "Progress.SeedingSampleData")?;
        self.store
            .insert_rule_sets(p.rule_sets())
            .await
            .with_context(|| step_failed("rule sets"))?;

        self.announce("sample_discounts", "Progress.SeedingSampleData")?;
        self.store
            .insert_discounts(p.discounts())
            .await
            .with_context(|| step_failed("discounts"))?;

        self.announce("sample_categories", "Progress.SeedingSampleData")?;
        let all_categories = p.categories();
        let first_level: Vec<CategorySeed> = all_categories
            .iter()
            .filter(|c| c.parent.is_none())
            .cloned()
            .collect();
        let second_level: Vec<CategorySeed> = all_categories
            .iter()
            .filter(|c| c.parent.is_some())
            .cloned()
            .collect();

        let first_ids = self
            .store
            .insert_categories(first_level)
            .await
            .with_context(|| step_failed("categories"))?;
        self.insert_slugs("Category", &first_ids)
            .await
            .with_context(|| step_failed("categories"))?;

        let second_ids = self
            .store
            .insert_categories(second_level)
            .await
            .with_context(|| step_failed("categories"))?;
        self.insert_slugs("Category", &second_ids)
            .await
            .with_context(|| step_failed("categories"))?;

        self.announce("sample_manufacturers", "Progress.SeedingSampleData")?;
        let manufacturer_ids = self
            .store
            .insert_manufacturers(p.manufacturers())
            .await
            .with_context(|| step_failed("manufacturers"))?;
        self.insert_slugs("Manufacturer", &manufacturer_ids)
            .await
            .with_context(|| step_failed("manufacturers"))?;

        self.announce("sample_products", "Progress.SeedingSampleData")?;
        let products = self
            .store
            .insert_products(p.products())
            .await
            .with_context(|| step_failed("products"))?;
        for (seed, id) in &products {
            if seed.has_download {
                self.store
                    .attach_product_download(*id)
                    .await
                    .with_context(|| step_failed("products"))?;
            }
        }
        self.store
            .repair_product_main_pictures()
            .await
            .with_context(|| step_failed("products"))?;
        let product_names: Vec<(String, u64)> = products
            .iter()
            .map(|(seed, id)| (seed.name.clone(), *id))
            .collect();
        self.insert_slugs("Product", &product_names)
            .await
            .with_context(|| step_failed("products"))?;
        for (seed, id) in &products {
            if let Some(parent_name) = &seed.grouped_parent {
                if let Some((_, parent_id)) =
                    product_names.iter().find(|(name, _)| name == parent_name)
                {
                    self.store
                        .link_grouped_product(*parent_id, *id)
                        .await
                        .with_context(|| step_failed("products"))?;
                }
            }
        }

        self.announce("sample_bundles", "Progress.SeedingSampleData")?;
        self.store
            .insert_bundle_items(p.bundle_items())
            .await
            .with_context(|| step_failed("bundle items"))?;

        self.announce("sample_variants", "Progress.SeedingSampleData")?;
        self.store
            .insert_variant_combinations(p.variant_combinations())
            .await
            .with_context(|| step_failed("variant combinations"))?;

        self.announce("sample_tags", "Progress.SeedingSampleData")?;
        for (seed, id) in &products {
            if !seed.tags.is_empty() {
                self.store
                    .insert_product_tags(*id, seed.tags.clone())
                    .await
                    .with_context(|| step_failed("product tags"))?;
            }
        }

        self.announce("sample_finalize", "Progress.SeedingSampleData")?;
        p.finalize(self.store)
            .await
            .with_context(|| step_failed("sample finalization"))?;

        Ok(())
    }

    async fn insert_slugs(&self, entity: &str, items: &[(String, u64)]) -> Result<()> {
        let records: Vec<UrlRecord> = items
            .iter()
            .map(|(name, id)| UrlRecord {
                entity: entity.to_string(),
                entity_id: *id,
                slug: slugify(name),
            })
            .collect();
        self.store.insert_url_records(records).await
    }
}
