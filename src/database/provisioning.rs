// Schema provisioning
//
// Creates the physical database and drives the migration engine. Tracks
// whether the schema pre-existed so that failure cleanup only ever deletes a
// schema this run created. Creation and migration are distinct steps with a
// cancellation check between them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, warn};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgConnection, PgPool, Row};
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::database::connection::ConnectionDescriptor;
use crate::seed::locale::{self, ResourceDocument};
use crate::utils::logging::mask_connection_string;
use crate::utils::validation::validate_database_name;

/// Persistence-layer seam consumed by the orchestrator: schema lifecycle plus
/// the migration engine. The shipped implementation is [`PostgresDatabase`];
/// tests substitute recording stubs.
#[async_trait]
pub trait InstallationDatabase: Send + Sync {
    /// Best-effort connectivity probe against the target database.
    async fn can_connect(&self, descriptor: &ConnectionDescriptor) -> bool;

    /// Create the physical database if it does not exist yet.
    async fn ensure_created(
        &self,
        descriptor: &ConnectionDescriptor,
        collation: Option<&str>,
    ) -> Result<()>;

    /// Drop the physical database if it exists.
    async fn ensure_deleted(&self, descriptor: &ConnectionDescriptor) -> Result<()>;

    /// Apply all pending migrations so the schema reaches the latest version.
    async fn ensure_schema_populated(&self, descriptor: &ConnectionDescriptor) -> Result<()>;

    /// Import locale resources that were added after `since_version`
    /// (catch-up seeding driven by the head-version marker).
    async fn seed_pending_locale_resources(
        &self,
        descriptor: &ConnectionDescriptor,
        language: &str,
        since_version: u32,
    ) -> Result<()>;
}

/// Drives schema creation + migration and remembers whether this run created
/// the schema (`should_delete_on_failure`).
pub struct SchemaProvisioner {
    database: Arc<dyn InstallationDatabase>,
    should_delete_on_failure: AtomicBool,
}

impl SchemaProvisioner {
    pub fn new(database: Arc<dyn InstallationDatabase>) -> Self {
        Self {
            database,
            should_delete_on_failure: AtomicBool::new(false),
        }
    }

    /// Probe for a pre-existing schema and create it when requested and
    /// absent. Schema creation and migration application are distinct steps;
    /// the orchestrator checks cancellation between them.
    ///
    /// The pre-existence probe is best-effort: another process creating the
    /// schema between probe and creation is not detected.
    pub async fn ensure_schema(
        &self,
        descriptor: &ConnectionDescriptor,
        collation: Option<&str>,
        create_database: bool,
    ) -> Result<()> {
        let pre_existing = self.database.can_connect(descriptor).await;
        info!(
            "[PHASE: database] [STEP: probe] Connectivity probe (database={}, pre_existing={})",
            descriptor.database, pre_existing
        );

        if !pre_existing {
            if !create_database {
                anyhow::bail!(
                    "Database '{}' does not exist or is not reachable, and database creation was not requested.",
                    descriptor.database
                );
            }
            self.database
                .ensure_created(descriptor, collation)
                .await
                .context("Database creation failed")?;
            self.should_delete_on_failure.store(true, Ordering::SeqCst);
            info!(
                "[PHASE: database] [STEP: create] Database created (database={})",
                descriptor.database
            );
        }

        Ok(())
    }

    /// Drive the migration engine to the latest schema version.
    pub async fn populate_schema(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        self.database
            .ensure_schema_populated(descriptor)
            .await
            .context("Schema migration failed")?;
        info!(
            "[PHASE: database] [STEP: migrate] Schema populated (database={})",
            descriptor.database
        );
        Ok(())
    }

    pub fn should_delete_on_failure(&self) -> bool {
        self.should_delete_on_failure.load(Ordering::SeqCst)
    }

    /// Best-effort rollback: delete the schema iff this run created it.
    pub async fn rollback(&self, descriptor: &ConnectionDescriptor) {
        if !self.should_delete_on_failure() {
            info!(
                "[PHASE: database] [STEP: rollback] Schema pre-existed; leaving it in place (database={})",
                descriptor.database
            );
            return;
        }
        match self.database.ensure_deleted(descriptor).await {
            Ok(()) => info!(
                "[PHASE: database] [STEP: rollback] Dropped self-created database (database={})",
                descriptor.database
            ),
            Err(e) => warn!(
                "[PHASE: database] [STEP: rollback] Failed to drop self-created database (database={}, error={:?})",
                descriptor.database, e
            ),
        }
    }
}

// =============================================================================
// Statement generation (quoted identifiers)
// =============================================================================

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn create_database_stmt(db_name: &str, collation: Option<&str>) -> String {
    match collation.filter(|c| !c.trim().is_empty()) {
        Some(collation) => format!(
            "CREATE DATABASE {} TEMPLATE template0 LC_COLLATE '{}' LC_CTYPE '{}';",
            quote_ident(db_name),
            collation.replace('\'', "''"),
            collation.replace('\'', "''")
        ),
        None => format!("CREATE DATABASE {};", quote_ident(db_name)),
    }
}

pub fn drop_database_stmt(db_name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {};", quote_ident(db_name))
}

pub fn database_exists_query() -> &'static str {
    "SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1) AS db_exists"
}

// =============================================================================
// PostgreSQL implementation
// =============================================================================

/// Shipped PostgreSQL implementation of [`InstallationDatabase`].
///
/// CREATE/DROP DATABASE run on a maintenance-database connection; migrations
/// are ordered SQL files applied inside transactions with an
/// `installed_migrations` tracking table.
pub struct PostgresDatabase {
    maintenance_database: String,
    migrations_dir: PathBuf,
    resources_dir: PathBuf,
}

impl PostgresDatabase {
    pub fn new(migrations_dir: PathBuf, resources_dir: PathBuf) -> Self {
        Self {
            maintenance_database: "postgres".to_string(),
            migrations_dir,
            resources_dir,
        }
    }

    async fn connect(&self, url: &str) -> Result<PgPool> {
        connect_with_retry(url).await
    }

    async fn maintenance_pool(&self, descriptor: &ConnectionDescriptor) -> Result<PgPool> {
        self.connect(&descriptor.connection_string_for(&self.maintenance_database))
            .await
            .context("Could not connect to the maintenance database")
    }

    /// Ordered list of migration files (by file name).
    async fn migration_files(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.migrations_dir)
            .await
            .with_context(|| format!("Failed to read migrations dir {:?}", self.migrations_dir))?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("sql") {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                entries.push((name, path));
            }
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(entries)
    }
}

#[async_trait]
impl InstallationDatabase for PostgresDatabase {
    async fn can_connect(&self, descriptor: &ConnectionDescriptor) -> bool {
        let url = descriptor.connection_string();
        match connect_with_retry(&url).await {
            Ok(pool) => sqlx::query_scalar::<_, i64>("SELECT 1")
                .fetch_one(&pool)
                .await
                .is_ok(),
            Err(e) => {
                info!(
                    "[PHASE: database] [STEP: probe] Probe failed (masked_conn_str={}, error={})",
                    mask_connection_string(&url),
                    e
                );
                false
            }
        }
    }

    async fn ensure_created(
        &self,
        descriptor: &ConnectionDescriptor,
        collation: Option<&str>,
    ) -> Result<()> {
        validate_database_name(&descriptor.database).map_err(|m| anyhow::anyhow!(m))?;

        let pool = self.maintenance_pool(descriptor).await?;
        let exists: bool = sqlx::query(database_exists_query())
            .bind(&descriptor.database)
            .fetch_one(&pool)
            .await
            .context("Failed to check database existence")?
            .try_get("db_exists")?;
        if exists {
            return Ok(());
        }

        sqlx::raw_sql(&create_database_stmt(&descriptor.database, collation))
            .execute(&pool)
            .await
            .with_context(|| format!("CREATE DATABASE failed for '{}'", descriptor.database))?;
        Ok(())
    }

    async fn ensure_deleted(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        validate_database_name(&descriptor.database).map_err(|m| anyhow::anyhow!(m))?;

        let pool = self.maintenance_pool(descriptor).await?;
        sqlx::raw_sql(&drop_database_stmt(&descriptor.database))
            .execute(&pool)
            .await
            .with_context(|| format!("DROP DATABASE failed for '{}'", descriptor.database))?;
        Ok(())
    }

    async fn ensure_schema_populated(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        let pool = self.connect(&descriptor.connection_string()).await?;
        let migrations = self.migration_files().await?;
        run_migrations(pool, migrations).await
    }

    async fn seed_pending_locale_resources(
        &self,
        descriptor: &ConnectionDescriptor,
        language: &str,
        since_version: u32,
    ) -> Result<()> {
        let documents = locale::load_resource_documents(&self.resources_dir, language).await?;
        let pending: Vec<&ResourceDocument> = documents
            .iter()
            .filter(|d| d.min_version > since_version)
            .collect();
        if pending.is_empty() {
            return Ok(());
        }

        let pool = self.connect(&descriptor.connection_string()).await?;
        for doc in pending {
            for (name, value) in doc.flattened() {
                sqlx::query(
                    r#"
                    INSERT INTO locale_string_resources (language, resource_name, resource_value)
                    VALUES ($1, $2, $3)
                    ON CONFLICT (language, resource_name) DO NOTHING
                    "#,
                )
                .bind(language)
                .bind(&name)
                .bind(&value)
                .execute(&pool)
                .await
                .with_context(|| format!("Failed to import pending resource '{}'", name))?;
            }
        }
        Ok(())
    }
}

/// Connect with bounded retry for transient faults only; permanent failures
/// (bad credentials, unknown database) surface immediately.
async fn connect_with_retry(url: &str) -> Result<PgPool> {
    let url = url.to_string();
    let attempt = move || {
        let url = url.clone();
        async move {
            PgPoolOptions::new()
                .max_connections(4)
                .acquire_timeout(Duration::from_secs(20))
                .connect(&url)
                .await
                .map_err(anyhow::Error::new)
        }
    };

    let retry_strategy = ExponentialBackoff::from_millis(100)
        .factor(2)
        .max_delay(Duration::from_secs(2))
        .take(3)
        .map(jitter);

    RetryIf::spawn(retry_strategy, attempt, |e: &anyhow::Error| {
        let msg = e.to_string().to_ascii_lowercase();
        msg.contains("timed out")
            || msg.contains("timeout")
            || msg.contains("network")
            || msg.contains("connection refused")
            || msg.contains("i/o")
    })
    .await
}

/// Ensure the migration-tracking table exists and apply any pending migrations.
///
/// Lives as a free function (rather than inline in the `#[async_trait]`
/// method) so the `Executor` lifetimes and the future's `Send` bound are
/// inferred against a concrete signature; the boxed async-trait future
/// otherwise cannot unify the higher-ranked `&Pool`/`&mut PgConnection`
/// lifetimes.
async fn run_migrations(pool: PgPool, migrations: Vec<(String, PathBuf)>) -> Result<()> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS installed_migrations (
            name        text PRIMARY KEY,
            checksum    text NOT NULL,
            applied_at  timestamptz NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(&pool)
    .await
    .context("Failed to ensure migration tracking table")?;

    let applied: Vec<String> =
        sqlx::query_scalar::<_, String>("SELECT name FROM installed_migrations")
            .fetch_all(&pool)
            .await
            .context("Failed to query applied migrations")?;

    for (name, path) in migrations {
        if applied.contains(&name) {
            continue;
        }
        let sql = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read migration file {:?}", path))?;
        let checksum = crate::utils::crypto::sha256_hex(sql.as_bytes());

        apply_migration_in_tx(&pool, &name, &sql, &checksum).await?;

        info!(
            "[PHASE: database] [STEP: migrate] Applied migration '{}' (checksum={})",
            name,
            &checksum[..12.min(checksum.len())]
        );
    }
    Ok(())
}

/// Apply a single migration and record it, inside one transaction.
///
/// Lives as a free function (rather than inline in the `#[async_trait]`
/// method) so the `Executor for &mut PgConnection` lifetime and the future's
/// `Send` bound are inferred against a concrete signature; the boxed
/// async-trait future otherwise cannot unify the higher-ranked lifetime.
async fn apply_migration_in_tx(
    pool: &PgPool,
    name: &str,
    sql: &str,
    checksum: &str,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    let conn: &mut PgConnection = &mut tx;
    sqlx::raw_sql(sql)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Migration '{}' failed", name))?;
    sqlx::query("INSERT INTO installed_migrations (name, checksum) VALUES ($1, $2)")
        .bind(name)
        .bind(checksum)
        .execute(&mut *conn)
        .await?;
    tx.commit().await?;
    Ok(())
}
