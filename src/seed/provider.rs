// Seed data providers
//
// A provider supplies the canonical reference sets for one target language.
// Resolution falls back to the invariant (en-US) data with the requested
// culture applied, so an exotic language code never blocks installation.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::seed::pipeline::SeedStore;

// =============================================================================
// Reference entity records
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Currency {
    pub code: String,
    pub name: String,
    pub rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSeed {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageSeed {
    pub culture: String,
    pub name: String,
    pub rtl: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureDimension {
    pub keyword: String,
    pub ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureWeight {
    pub keyword: String,
    pub ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxCategory {
    pub name: String,
    /// Fixed rate seeded into the tax settings, keyed by the category id the
    /// store assigns on insert.
    pub fixed_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Country {
    pub two_letter_code: String,
    pub name: String,
    #[serde(default)]
    pub states: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingMethod {
    pub name: String,
    pub display_order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryTime {
    pub name: String,
    pub min_days: u32,
    pub max_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityUnit {
    pub name: String,
}

/// Built-in system accounts seeded alongside the administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSeed {
    pub email: String,
    /// Plain password at seed time; the admin account is rehashed in place
    /// after all structures referencing it were written.
    pub password: Option<String>,
    pub role: String,
    pub system_account: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAccount {
    pub display_name: String,
    pub email: String,
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageTemplate {
    pub name: String,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub system_name: String,
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Setting {
    pub name: String,
    pub value: String,
    /// Theme-like settings are scoped to the default store; everything else
    /// is global (store id 0).
    pub store_scoped: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityLogType {
    pub keyword: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewTemplate {
    pub entity: String,
    pub view_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub name: String,
    pub cron_expression: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuSeed {
    pub system_name: String,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPlaceholder {
    pub name: String,
    pub mime_type: String,
}

// ----- sample data -----

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecificationAttribute {
    pub name: String,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductAttribute {
    pub name: String,
    pub option_set: Option<String>,
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub name: String,
    pub subject: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleSet {
    pub name: String,
    pub scope: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    pub name: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySeed {
    pub name: String,
    /// Name of the first-level parent; `None` for first-level categories.
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManufacturerSeed {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSeed {
    pub name: String,
    pub sku: String,
    pub category: String,
    pub price: f64,
    #[serde(default)]
    pub has_download: bool,
    /// Name of the grouped parent product, if any.
    #[serde(default)]
    pub grouped_parent: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleItem {
    pub bundle_sku: String,
    pub part_sku: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantCombination {
    pub product_sku: String,
    pub attributes: Vec<(String, String)>,
}

/// URL slug record for a seeded entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlRecord {
    pub entity: String,
    pub entity_id: u64,
    pub slug: String,
}

/// Lowercase-dashed slug for generated URL records.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

// =============================================================================
// Provider trait + invariant data
// =============================================================================

/// Canonical reference sets for one target language.
#[async_trait]
pub trait SeedDataProvider: Send + Sync {
    fn language(&self) -> &str;

    fn media_placeholders(&self) -> Vec<MediaPlaceholder>;
    fn currencies(&self) -> Vec<Currency>;
    fn store(&self) -> StoreSeed;
    fn primary_language(&self) -> LanguageSeed;
    fn measure_dimensions(&self) -> Vec<MeasureDimension>;
    fn measure_weights(&self) -> Vec<MeasureWeight>;
    fn tax_categories(&self) -> Vec<TaxCategory>;
    fn countries(&self) -> Vec<Country>;
    fn shipping_methods(&self) -> Vec<ShippingMethod>;
    fn delivery_times(&self) -> Vec<DeliveryTime>;
    fn quantity_units(&self) -> Vec<QuantityUnit>;
    fn system_customers(&self) -> Vec<CustomerSeed>;
    fn email_accounts(&self) -> Vec<EmailAccount>;
    fn message_templates(&self) -> Vec<MessageTemplate>;
    fn topics(&self) -> Vec<Topic>;
    fn settings(&self) -> Vec<Setting>;
    fn activity_log_types(&self) -> Vec<ActivityLogType>;
    fn view_templates(&self) -> Vec<ViewTemplate>;
    fn scheduled_tasks(&self) -> Vec<ScheduledTask>;
    fn menus(&self) -> Vec<MenuSeed>;

    fn specification_attributes(&self) -> Vec<SpecificationAttribute>;
    fn product_attributes(&self) -> Vec<ProductAttribute>;
    fn campaigns(&self) -> Vec<Campaign>;
    fn rule_sets(&self) -> Vec<RuleSet>;
    fn discounts(&self) -> Vec<Discount>;
    fn categories(&self) -> Vec<CategorySeed>;
    fn manufacturers(&self) -> Vec<ManufacturerSeed>;
    fn products(&self) -> Vec<ProductSeed>;
    fn bundle_items(&self) -> Vec<BundleItem>;
    fn variant_combinations(&self) -> Vec<VariantCombination>;

    /// Finalization hook, invoked at the end of the sample-data branch.
    async fn finalize(&self, _store: &dyn SeedStore) -> Result<()> {
        Ok(())
    }
}

/// Resolve the provider for a language. Unknown languages fall back to the
/// invariant data with the requested culture applied.
pub fn resolve_provider(language: &str) -> Box<dyn SeedDataProvider> {
    Box::new(InvariantSeedData::new(language))
}

/// Built-in invariant seed data (en-US reference sets).
pub struct InvariantSeedData {
    language: String,
}

impl InvariantSeedData {
    pub fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
        }
    }
}

#[async_trait]
impl SeedDataProvider for InvariantSeedData {
    fn language(&self) -> &str {
        &self.language
    }

    fn media_placeholders(&self) -> Vec<MediaPlaceholder> {
        vec![
            MediaPlaceholder {
                name: "product-placeholder.png".into(),
                mime_type: "image/png".into(),
            },
            MediaPlaceholder {
                name: "category-placeholder.png".into(),
                mime_type: "image/png".into(),
            },
            MediaPlaceholder {
                name: "avatar-placeholder.png".into(),
                mime_type: "image/png".into(),
            },
        ]
    }

    fn currencies(&self) -> Vec<Currency> {
        vec![
            Currency {
                code: "USD".into(),
                name: "US Dollar".into(),
                rate: 1.0,
            },
            Currency {
                code: "EUR".into(),
                name: "Euro".into(),
                rate: 0.92,
            },
            Currency {
                code: "GBP".into(),
                name: "British Pound".into(),
                rate: 0.79,
            },
        ]
    }

    fn store(&self) -> StoreSeed {
        StoreSeed {
            name: "Default Store".into(),
            url: "http://localhost/".into(),
        }
    }

    fn primary_language(&self) -> LanguageSeed {
        LanguageSeed {
            culture: self.language.clone(),
            name: "Default language".into(),
            rtl: false,
        }
    }

    fn measure_dimensions(&self) -> Vec<MeasureDimension> {
        vec![
            MeasureDimension {
                keyword: "inch".into(),
                ratio: 1.0,
            },
            MeasureDimension {
                keyword: "cm".into(),
                ratio: 2.54,
            },
        ]
    }

    fn measure_weights(&self) -> Vec<MeasureWeight> {
        vec![
            MeasureWeight {
                keyword: "lb".into(),
                ratio: 1.0,
            },
            MeasureWeight {
                keyword: "kg".into(),
                ratio: 0.4536,
            },
        ]
    }

    fn tax_categories(&self) -> Vec<TaxCategory> {
        vec![
            TaxCategory {
                name: "Standard".into(),
                fixed_rate: 19.0,
            },
            TaxCategory {
                name: "Reduced".into(),
                fixed_rate: 7.0,
            },
            TaxCategory {
                name: "Tax exempt".into(),
                fixed_rate: 0.0,
            },
        ]
    }

    fn countries(&self) -> Vec<Country> {
        vec![
            Country {
                two_letter_code: "US".into(),
                name: "United States".into(),
                states: vec!["California".into(), "New York".into(), "Texas".into()],
            },
            Country {
                two_letter_code: "DE".into(),
                name: "Germany".into(),
                states: vec![],
            },
            Country {
                two_letter_code: "GB".into(),
                name: "United Kingdom".into(),
                states: vec![],
            },
        ]
    }

    fn shipping_methods(&self) -> Vec<ShippingMethod> {
        vec![
            ShippingMethod {
                name: "In-store pickup".into(),
                display_order: 0,
            },
            ShippingMethod {
                name: "Ground".into(),
                display_order: 1,
            },
            ShippingMethod {
                name: "Next day air".into(),
                display_order: 2,
            },
        ]
    }

    fn delivery_times(&self) -> Vec<DeliveryTime> {
        vec![
            DeliveryTime {
                name: "available and ready to ship".into(),
                min_days: 1,
                max_days: 2,
            },
            DeliveryTime {
                name: "2-5 working days".into(),
                min_days: 2,
                max_days: 5,
            },
            DeliveryTime {
                name: "7 working days".into(),
                min_days: 7,
                max_days: 7,
            },
        ]
    }

    fn quantity_units(&self) -> Vec<QuantityUnit> {
        vec![
            QuantityUnit {
                name: "Piece".into(),
            },
            QuantityUnit { name: "Box".into() },
            QuantityUnit {
                name: "Pallet".into(),
            },
        ]
    }

    fn system_customers(&self) -> Vec<CustomerSeed> {
        vec![
            CustomerSeed {
                email: "builtin@search-engine-record.com".into(),
                password: None,
                role: "Guests".into(),
                system_account: true,
            },
            CustomerSeed {
                email: "builtin@background-task-record.com".into(),
                password: None,
                role: "Guests".into(),
                system_account: true,
            },
            CustomerSeed {
                email: "builtin@pdf-converter-record.com".into(),
                password: None,
                role: "Guests".into(),
                system_account: true,
            },
        ]
    }

    fn email_accounts(&self) -> Vec<EmailAccount> {
        vec![EmailAccount {
            display_name: "General contact".into(),
            email: "shop@localhost.local".into(),
            host: "localhost".into(),
            port: 25,
        }]
    }

    fn message_templates(&self) -> Vec<MessageTemplate> {
        vec![
            MessageTemplate {
                name: "OrderPlaced.CustomerNotification".into(),
                subject: "Your order has been received".into(),
            },
            MessageTemplate {
                name: "Customer.WelcomeMessage".into(),
                subject: "Welcome to {{ Store.Name }}".into(),
            },
            MessageTemplate {
                name: "Customer.PasswordRecovery".into(),
                subject: "Password recovery".into(),
            },
        ]
    }

    fn topics(&self) -> Vec<Topic> {
        vec![
            Topic {
                system_name: "AboutUs".into(),
                title: "About us".into(),
            },
            Topic {
                system_name: "PrivacyInfo".into(),
                title: "Privacy policy".into(),
            },
            Topic {
                system_name: "ConditionsOfUse".into(),
                title: "Conditions of use".into(),
            },
        ]
    }

    fn settings(&self) -> Vec<Setting> {
        vec![
            Setting {
                name: "CatalogSettings.DefaultPageSize".into(),
                value: "24".into(),
                store_scoped: false,
            },
            Setting {
                name: "OrderSettings.AnonymousCheckoutAllowed".into(),
                value: "true".into(),
                store_scoped: false,
            },
            Setting {
                name: "ThemeSettings.DefaultTheme".into(),
                value: "Flex".into(),
                store_scoped: true,
            },
            Setting {
                name: "ThemeSettings.AssetCachingEnabled".into(),
                value: "true".into(),
                store_scoped: true,
            },
        ]
    }

    fn activity_log_types(&self) -> Vec<ActivityLogType> {
        vec![
            ActivityLogType {
                keyword: "AddNewProduct".into(),
                enabled: true,
            },
            ActivityLogType {
                keyword: "EditOrder".into(),
                enabled: true,
            },
            ActivityLogType {
                keyword: "PublicStore.PlaceOrder".into(),
                enabled: false,
            },
        ]
    }

    fn view_templates(&self) -> Vec<ViewTemplate> {
        vec![
            ViewTemplate {
                entity: "Product".into(),
                view_path: "ProductTemplate.Simple".into(),
            },
            ViewTemplate {
                entity: "Category".into(),
                view_path: "CategoryTemplate.ProductsInGridOrLines".into(),
            },
            ViewTemplate {
                entity: "Manufacturer".into(),
                view_path: "ManufacturerTemplate.ProductsInGridOrLines".into(),
            },
        ]
    }

    fn scheduled_tasks(&self) -> Vec<ScheduledTask> {
        vec![
            ScheduledTask {
                name: "Send emails".into(),
                cron_expression: "* * * * *".into(),
                enabled: true,
            },
            ScheduledTask {
                name: "Delete guests".into(),
                cron_expression: "*/10 * * * *".into(),
                enabled: true,
            },
            ScheduledTask {
                name: "Rebuild XML sitemap".into(),
                cron_expression: "45 3 * * *".into(),
                enabled: true,
            },
        ]
    }

    fn menus(&self) -> Vec<MenuSeed> {
        vec![
            MenuSeed {
                system_name: "Main".into(),
                items: vec!["Home".into(), "Catalog".into(), "Contact".into()],
            },
            MenuSeed {
                system_name: "Footer".into(),
                items: vec!["About us".into(), "Privacy policy".into()],
            },
        ]
    }

    fn specification_attributes(&self) -> Vec<SpecificationAttribute> {
        vec![
            SpecificationAttribute {
                name: "Color".into(),
                options: vec!["Black".into(), "White".into(), "Red".into()],
            },
            SpecificationAttribute {
                name: "Material".into(),
                options: vec!["Cotton".into(), "Leather".into()],
            },
        ]
    }

    fn product_attributes(&self) -> Vec<ProductAttribute> {
        vec![
            ProductAttribute {
                name: "Size".into(),
                option_set: Some("Apparel sizes".into()),
                options: vec!["S".into(), "M".into(), "L".into(), "XL".into()],
            },
            ProductAttribute {
                name: "Color".into(),
                option_set: None,
                options: vec!["Black".into(), "White".into()],
            },
        ]
    }

    fn campaigns(&self) -> Vec<Campaign> {
        vec![Campaign {
            name: "Welcome campaign".into(),
            subject: "Welcome to our store".into(),
        }]
    }

    fn rule_sets(&self) -> Vec<RuleSet> {
        vec![
            RuleSet {
                name: "Weekend shoppers".into(),
                scope: "Customer".into(),
            },
            RuleSet {
                name: "Cart over 100".into(),
                scope: "Cart".into(),
            },
        ]
    }

    fn discounts(&self) -> Vec<Discount> {
        vec![Discount {
            name: "Sample discount 10%".into(),
            percentage: 10.0,
        }]
    }

    fn categories(&self) -> Vec<CategorySeed> {
        vec![
            CategorySeed {
                name: "Fashion".into(),
                parent: None,
            },
            CategorySeed {
                name: "Electronics".into(),
                parent: None,
            },
            CategorySeed {
                name: "Shoes".into(),
                parent: Some("Fashion".into()),
            },
            CategorySeed {
                name: "Notebooks".into(),
                parent: Some("Electronics".into()),
            },
        ]
    }

    fn manufacturers(&self) -> Vec<ManufacturerSeed> {
        vec![
            ManufacturerSeed {
                name: "Acme Corp".into(),
            },
            ManufacturerSeed {
                name: "Globex".into(),
            },
        ]
    }

    fn products(&self) -> Vec<ProductSeed> {
        vec![
            ProductSeed {
                name: "Leather sneaker".into(),
                sku: "SHOE-001".into(),
                category: "Shoes".into(),
                price: 79.9,
                has_download: false,
                grouped_parent: None,
                tags: vec!["shoes".into(), "leather".into()],
            },
            ProductSeed {
                name: "Ultrabook 14".into(),
                sku: "NB-014".into(),
                category: "Notebooks".into(),
                price: 1099.0,
                has_download: false,
                grouped_parent: None,
                tags: vec!["notebook".into()],
            },
            ProductSeed {
                name: "E-book: Commerce patterns".into(),
                sku: "EBOOK-01".into(),
                category: "Electronics".into(),
                price: 9.9,
                has_download: true,
                grouped_parent: None,
                tags: vec!["download".into()],
            },
            ProductSeed {
                name: "Sneaker bundle part".into(),
                sku: "SHOE-001-L".into(),
                category: "Shoes".into(),
                price: 0.0,
                has_download: false,
                grouped_parent: Some("Leather sneaker".into()),
                tags: vec![],
            },
        ]
    }

    fn bundle_items(&self) -> Vec<BundleItem> {
        vec![BundleItem {
            bundle_sku: "SHOE-001".into(),
            part_sku: "SHOE-001-L".into(),
            quantity: 1,
        }]
    }

    fn variant_combinations(&self) -> Vec<VariantCombination> {
        vec![VariantCombination {
            product_sku: "SHOE-001".into(),
            attributes: vec![("Size".into(), "M".into()), ("Color".into(), "Black".into())],
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_basics() {
        assert_eq!(slugify("Leather sneaker"), "leather-sneaker");
        assert_eq!(slugify("Ultrabook 14"), "ultrabook-14");
        assert_eq!(slugify("E-book: Commerce patterns"), "e-book-commerce-patterns");
        assert_eq!(slugify("  trailing!  "), "trailing");
    }

    #[test]
    fn resolve_provider_carries_requested_language() {
        let provider = resolve_provider("fr-FR");
        assert_eq!(provider.language(), "fr-FR");
        assert_eq!(provider.primary_language().culture, "fr-FR");
    }

    #[test]
    fn invariant_data_respects_dependency_shape() {
        let provider = InvariantSeedData::new("en-US");
        // First-level categories must exist for every second-level parent.
        let categories = provider.categories();
        for cat in categories.iter().filter(|c| c.parent.is_some()) {
            let parent = cat.parent.as_deref().unwrap();
            assert!(
                categories
                    .iter()
                    .any(|c| c.parent.is_none() && c.name == parent),
                "missing first-level parent '{}'",
                parent
            );
        }
        // Every product references a seeded category.
        for product in provider.products() {
            assert!(
                categories.iter().any(|c| c.name == product.category),
                "product '{}' references unknown category",
                product.name
            );
        }
        // Bundle items reference seeded SKUs.
        let skus: Vec<String> = provider.products().iter().map(|p| p.sku.clone()).collect();
        for item in provider.bundle_items() {
            assert!(skus.contains(&item.bundle_sku));
            assert!(skus.contains(&item.part_sku));
        }
    }
}
