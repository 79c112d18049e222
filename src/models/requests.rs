// Installation request model
//
// Submitted once by the setup UI and immutable afterwards. Database connection
// parameters arrive either as discrete fields or as a raw connection string;
// the resolver in `database::connection` turns both into a validated
// descriptor.

use serde::{Deserialize, Serialize};

use crate::error::InstallError;
use crate::utils::validation::{validate_admin_credentials, validate_collation_name};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaStorageKind {
    /// Media binaries stay in the database.
    Db,
    /// Media binaries live on the filesystem backend.
    Fs,
}

impl Default for MediaStorageKind {
    fn default() -> Self {
        MediaStorageKind::Db
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbConnectionInfo {
    /// Raw connection string; when set, it wins over the discrete fields.
    #[serde(default)]
    pub raw_connection_string: Option<String>,

    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Integrated/trusted authentication; credential fields are dropped when set.
    #[serde(default)]
    pub use_trusted_auth: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationRequest {
    pub admin_email: String,
    pub admin_password: String,
    pub confirm_password: String,

    #[serde(default = "default_language")]
    pub primary_language: String,

    #[serde(default = "default_provider")]
    pub data_provider: String,

    #[serde(default)]
    pub media_storage: MediaStorageKind,

    /// Create the database if it does not exist yet (vs. reuse an existing one).
    #[serde(default = "default_true")]
    pub create_database: bool,

    #[serde(default)]
    pub connection: DbConnectionInfo,

    #[serde(default)]
    pub use_custom_collation: bool,
    #[serde(default)]
    pub collation: Option<String>,

    #[serde(default)]
    pub install_sample_data: bool,

    /// Best-effort completion webhook target.
    #[serde(default)]
    pub callback_url: Option<String>,
}

fn default_language() -> String {
    "en-US".to_string()
}

fn default_provider() -> String {
    "postgres".to_string()
}

fn default_true() -> bool {
    true
}

impl InstallationRequest {
    /// Request-level validation. Connection parameters are validated separately
    /// by the resolver so that a bad connection string yields its own error.
    pub fn validate(&self) -> Result<(), InstallError> {
        validate_admin_credentials(&self.admin_email, &self.admin_password, &self.confirm_password)
            .map_err(InstallError::InvalidRequest)?;

        if self.primary_language.trim().is_empty() {
            return Err(InstallError::InvalidRequest(
                "Primary language is required.".to_string(),
            ));
        }

        if self.use_custom_collation {
            let collation = self.collation.as_deref().unwrap_or("");
            validate_collation_name(collation).map_err(InstallError::InvalidRequest)?;
        }

        if let Some(cb) = self.callback_url.as_deref() {
            if url::Url::parse(cb).is_err() {
                return Err(InstallError::InvalidRequest(
                    "Callback URL is not a valid absolute URL.".to_string(),
                ));
            }
        }

        Ok(())
    }
}
