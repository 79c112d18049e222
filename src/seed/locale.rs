// Localization: progress-message lookup and resource document import
//
// The progress lookup is a pure function falling back to the code itself, so
// progress reporting never fails on an incomplete translation set. Resource
// documents are JSON files with nested maps flattened to dotted keys; a
// head-version marker in the resource directory triggers catch-up seeding of
// resources added after that migration version.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

/// Progress message lookup: `(code, language) -> text`, defaulting to the code
/// itself when no translation exists.
pub fn localize(code: &str, language: &str) -> String {
    let table = match language {
        lang if lang.eq_ignore_ascii_case("de-DE") => DE_DE,
        _ => EN_US,
    };
    table
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, text)| text.to_string())
        .unwrap_or_else(|| code.to_string())
}

const EN_US: &[(&str, &str)] = &[
    ("Progress.CheckingPermissions", "Checking directory permissions..."),
    ("Progress.CreatingDatabase", "Creating database..."),
    ("Progress.CreatingTables", "Creating database tables..."),
    ("Progress.SeedingMediaPlaceholders", "Populating media placeholders..."),
    ("Progress.SeedingCurrencies", "Populating currencies..."),
    ("Progress.SeedingStores", "Populating stores..."),
    ("Progress.SeedingLanguage", "Populating primary language..."),
    ("Progress.SeedingMeasures", "Populating measure dimensions and weights..."),
    ("Progress.SeedingTaxCategories", "Populating tax categories..."),
    ("Progress.SeedingCountries", "Populating countries and states..."),
    ("Progress.SeedingShippingMethods", "Populating shipping methods..."),
    ("Progress.SeedingDeliveryTimes", "Populating delivery times..."),
    ("Progress.SeedingQuantityUnits", "Populating quantity units..."),
    ("Progress.SeedingCustomers", "Populating customers and system accounts..."),
    ("Progress.SeedingEmailAccounts", "Populating email accounts..."),
    ("Progress.SeedingMessageTemplates", "Populating message templates..."),
    ("Progress.SeedingTopics", "Populating topics..."),
    ("Progress.SeedingSettings", "Populating settings..."),
    ("Progress.SeedingActivityLogTypes", "Populating activity log types..."),
    ("Progress.HashingAdminPassword", "Securing administrator account..."),
    ("Progress.SeedingViewTemplates", "Populating view templates..."),
    ("Progress.SeedingScheduledTasks", "Populating scheduled tasks..."),
    ("Progress.ImportingResources", "Importing localized resources..."),
    ("Progress.SeedingMenus", "Populating navigation menus..."),
    ("Progress.SeedingSampleData", "Populating sample data..."),
    ("Progress.InstallingModules", "Installing modules... ({current} of {total})"),
    ("Progress.ReconcilingMedia", "Moving media into the configured storage..."),
    ("Progress.Finalizing", "Finalizing installation..."),
];

const DE_DE: &[(&str, &str)] = &[
    ("Progress.CreatingDatabase", "Datenbank wird erstellt..."),
    ("Progress.CreatingTables", "Datenbanktabellen werden erstellt..."),
    ("Progress.SeedingCurrencies", "Währungen werden eingerichtet..."),
    ("Progress.InstallingModules", "Module werden installiert... ({current} von {total})"),
    ("Progress.Finalizing", "Installation wird abgeschlossen..."),
];

// =============================================================================
// Resource documents
// =============================================================================

/// Parsed language resource document. `resources` keeps the nested shape;
/// [`ResourceDocument::flattened`] produces the dotted key/value pairs the
/// importer persists.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDocument {
    pub language: String,
    /// First migration version that contains this document's resources.
    #[serde(default)]
    pub min_version: u32,
    pub resources: Value,
}

impl ResourceDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).context("Failed to parse resource document")
    }

    /// Flatten nested maps to dotted resource names, e.g.
    /// `{"Admin": {"Common": {"Save": "Save"}}}` -> `("Admin.Common.Save", "Save")`.
    pub fn flattened(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        flatten_into(&self.resources, String::new(), &mut out);
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}

fn flatten_into(value: &Value, prefix: String, out: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let name = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten_into(child, name, out);
            }
        }
        Value::String(s) => out.push((prefix, s.clone())),
        Value::Null => {}
        other => out.push((prefix, other.to_string())),
    }
}

/// Load all resource documents for a language from a directory
/// (`<lang>*.json`, e.g. `en-US.json`, `en-US.sample.json`).
pub async fn load_resource_documents(dir: &Path, language: &str) -> Result<Vec<ResourceDocument>> {
    let mut documents = Vec::new();
    if !tokio::fs::try_exists(dir).await.unwrap_or(false) {
        return Ok(documents);
    }

    let mut rd = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to read resource dir {:?}", dir))?;
    let mut paths = Vec::new();
    while let Some(entry) = rd.next_entry().await? {
        let path = entry.path();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        if path.extension().and_then(|e| e.to_str()) == Some("json")
            && file_name
                .to_ascii_lowercase()
                .starts_with(&language.to_ascii_lowercase())
        {
            paths.push(path);
        }
    }
    paths.sort();

    for path in paths {
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read resource file {:?}", path))?;
        let doc = ResourceDocument::parse(&bytes)
            .with_context(|| format!("Resource file {:?} is not valid", path))?;
        documents.push(doc);
    }
    Ok(documents)
}

/// Read the head-version marker (`head-version.txt`) from the resource
/// directory. Absent or unparsable markers disable catch-up seeding.
pub async fn read_head_version(dir: &Path) -> Option<u32> {
    let path = dir.join("head-version.txt");
    let content = tokio::fs::read_to_string(&path).await.ok()?;
    content.trim().parse::<u32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localize_known_code() {
        assert_eq!(
            localize("Progress.SeedingCurrencies", "en-US"),
            "Populating currencies..."
        );
    }

    #[test]
    fn localize_falls_back_to_code_on_miss() {
        assert_eq!(localize("Progress.Unknown", "en-US"), "Progress.Unknown");
        assert_eq!(localize("Progress.Unknown", "xx-XX"), "Progress.Unknown");
    }

    #[test]
    fn localize_unknown_language_uses_default_table() {
        assert_eq!(
            localize("Progress.CreatingDatabase", "fr-FR"),
            "Creating database..."
        );
    }

    #[test]
    fn localize_language_specific_table() {
        assert_eq!(
            localize("Progress.CreatingDatabase", "de-DE"),
            "Datenbank wird erstellt..."
        );
    }

    #[test]
    fn flattens_nested_maps_to_dotted_keys() {
        let doc = ResourceDocument::parse(
            br#"{
                "language": "en-US",
                "minVersion": 3,
                "resources": {
                    "Admin": { "Common": { "Save": "Save", "Cancel": "Cancel" } },
                    "Checkout": { "Total": "Total" }
                }
            }"#,
        )
        .unwrap();

        let flat = doc.flattened();
        assert_eq!(
            flat,
            vec![
                ("Admin.Common.Cancel".to_string(), "Cancel".to_string()),
                ("Admin.Common.Save".to_string(), "Save".to_string()),
                ("Checkout.Total".to_string(), "Total".to_string()),
            ]
        );
        assert_eq!(doc.min_version, 3);
    }

    #[test]
    fn flatten_keeps_non_string_scalars() {
        let doc = ResourceDocument::parse(
            br#"{ "language": "en-US", "resources": { "PageSize": 24, "Enabled": true } }"#,
        )
        .unwrap();
        let flat = doc.flattened();
        assert!(flat.contains(&("PageSize".to_string(), "24".to_string())));
        assert!(flat.contains(&("Enabled".to_string(), "true".to_string())));
    }

    #[tokio::test]
    async fn load_resource_documents_filters_by_language() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("en-US.json"),
            r#"{ "language": "en-US", "resources": { "A": "a" } }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join("de-DE.json"),
            r#"{ "language": "de-DE", "resources": { "A": "a" } }"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("head-version.txt"), "12\n").unwrap();

        let docs = load_resource_documents(dir.path(), "en-US").await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].language, "en-US");

        assert_eq!(read_head_version(dir.path()).await, Some(12));
    }

    #[tokio::test]
    async fn missing_resource_dir_yields_empty_set() {
        let docs = load_resource_documents(Path::new("/nonexistent/resources"), "en-US")
            .await
            .unwrap();
        assert!(docs.is_empty());
        assert_eq!(read_head_version(Path::new("/nonexistent/resources")).await, None);
    }
}
