//! Database layer for the update metadata store.
//!
//! - `records` - fragmentation and space usage records
//! - `store` - the maintenance capability and its SQLite implementation

mod records;
mod store;

pub use records::*;
pub(crate) use store::quote_identifier;
pub use store::{MaintenanceStore, SqliteStore};

use anyhow::Result;
use sqlx::sqlite::{SqliteAutoVacuum, SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::DatabaseConfig;
use crate::constants::database::BUSY_TIMEOUT_MILLIS;
use crate::errors::DatabaseError;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    descriptor: String,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let path = &config.path;
        info!("Connecting to update database at {}", path.display());

        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            // Only takes effect on a new file; older files keep full VACUUM
            .auto_vacuum(SqliteAutoVacuum::Incremental)
            .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MILLIS));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| {
                error!("Failed to connect to {}: {}", path.display(), e);
                DatabaseError::ConnectionFailed {
                    reason: format!("{}: {}", path.display(), e),
                }
            })?;

        let database = Self {
            pool,
            descriptor: path.display().to_string(),
        };
        database.initialize_tables().await?;

        info!("Update database ready at {}", database.descriptor);
        Ok(database)
    }

    /// Wrap an existing pool, e.g. an in-memory database in tests.
    pub fn from_pool(pool: Pool<Sqlite>, descriptor: &str) -> Self {
        Self {
            pool,
            descriptor: descriptor.to_string(),
        }
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    /// Create the update metadata tables when absent. Existing data is left
    /// untouched.
    pub async fn initialize_tables(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tbUpdate (
                LocalUpdateID INTEGER PRIMARY KEY AUTOINCREMENT,
                UpdateID TEXT NOT NULL UNIQUE,
                IsDeclined INTEGER NOT NULL DEFAULT 0,
                IsSuperseded INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tbRevision (
                RevisionID INTEGER PRIMARY KEY AUTOINCREMENT,
                LocalUpdateID INTEGER NOT NULL REFERENCES tbUpdate(LocalUpdateID)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tbRevisionSupersedesUpdate (
                RevisionID INTEGER NOT NULL,
                SupersededUpdateID TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS ixSupersededUpdate ON tbRevisionSupersedesUpdate(SupersededUpdateID)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS ixUpdateState ON tbUpdate(IsDeclined, IsSuperseded)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS ixRevisionUpdate ON tbRevision(LocalUpdateID)")
            .execute(&self.pool)
            .await?;

        debug!("Update metadata tables initialized");
        Ok(())
    }
}
