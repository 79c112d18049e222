//! Storefront one-shot installation orchestrator.
//!
//! Provisions a brand-new deployment from nothing: creates the database
//! schema, drives the migration engine, seeds reference and localized data in
//! a fixed dependency order, creates the administrator identity, installs
//! feature modules, and reconciles media storage. Exactly one installation can
//! run at a time; partial failure rolls back to a clean slate and a remote
//! caller can poll live progress throughout.

pub mod database;
pub mod error;
pub mod install;
pub mod models;
pub mod seed;
pub mod utils;

pub use database::connection::{resolve_descriptor, ConnectionDescriptor};
pub use database::provisioning::{InstallationDatabase, PostgresDatabase, SchemaProvisioner};
pub use error::{compose_error_message, InstallError};
pub use install::media::MediaStorage;
pub use install::modules::{ModuleCatalog, ModuleDescriptor, ModuleOutcome};
pub use install::orchestrator::Installer;
pub use install::settings::{InstallSettings, SettingsStore};
pub use models::requests::{DbConnectionInfo, InstallationRequest, MediaStorageKind};
pub use models::state::{CancelToken, InstallationState, InstallationStateStore};
pub use seed::pipeline::{MediaFile, SeedConfiguration, SeedStore};
pub use seed::provider::{resolve_provider, SeedDataProvider};
pub use utils::paths::InstallPaths;
