//! Test database utilities for SQLite-backed maintenance tests

use anyhow::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use std::sync::Arc;
use update_keeper::config::DatabaseConfig;
use update_keeper::{Database, SqliteStore};

/// Update database wrapper, in memory or file-backed
pub struct TestDatabase {
    database: Database,
}

impl TestDatabase {
    /// Create a new in-memory test database with the update tables
    pub async fn new() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let database = Database::from_pool(pool, "memory");
        database.initialize_tables().await?;
        Ok(Self { database })
    }

    /// File-backed database, needed wherever a backup file is attached
    pub async fn at(path: &Path) -> Result<Self> {
        let database = Database::connect(&Self::config_for(path)).await?;
        Ok(Self { database })
    }

    pub fn config_for(path: &Path) -> DatabaseConfig {
        DatabaseConfig {
            path: path.to_path_buf(),
            max_connections: 2,
            ..DatabaseConfig::default()
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.database.pool()
    }

    pub fn database(&self) -> Database {
        self.database.clone()
    }

    pub fn store(&self) -> Arc<SqliteStore> {
        Arc::new(SqliteStore::new(
            self.database.clone(),
            &DatabaseConfig::default(),
        ))
    }

    /// Insert an update and `links` supersession rows pointing at it
    pub async fn seed_update(
        &self,
        update_id: &str,
        declined: bool,
        superseded: bool,
        links: u32,
    ) -> Result<()> {
        sqlx::query("INSERT INTO tbUpdate (UpdateID, IsDeclined, IsSuperseded) VALUES (?, ?, ?)")
            .bind(update_id)
            .bind(declined)
            .bind(superseded)
            .execute(self.pool())
            .await?;

        let mut tx = self.pool().begin().await?;
        for revision in 0..links {
            sqlx::query(
                "INSERT INTO tbRevisionSupersedesUpdate (RevisionID, SupersededUpdateID) VALUES (?, ?)",
            )
            .bind(i64::from(revision))
            .bind(update_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Insert `updates` current updates and `links` supersession rows whose
    /// keys arrive out of order, so the key index splits all over
    pub async fn seed_scattered_links(&self, updates: u32, links: u32) -> Result<()> {
        let mut tx = self.pool().begin().await?;
        for update in 0..updates {
            sqlx::query("INSERT INTO tbUpdate (UpdateID) VALUES (?)")
                .bind(format!("kb-{:05}", update))
                .execute(&mut *tx)
                .await?;
        }
        for revision in 0..links {
            let key = (u64::from(revision) * 7_919) % u64::from(updates.max(1));
            sqlx::query(
                "INSERT INTO tbRevisionSupersedesUpdate (RevisionID, SupersededUpdateID) VALUES (?, ?)",
            )
            .bind(i64::from(revision))
            .bind(format!("kb-{:05}", key))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Delete every second supersession row, leaving half-empty index leaves
    pub async fn thin_out_links(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM tbRevisionSupersedesUpdate WHERE rowid % 2 = 0")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn count_links(&self) -> Result<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM tbRevisionSupersedesUpdate")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    pub async fn count_links_for(&self, update_id: &str) -> Result<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM tbRevisionSupersedesUpdate WHERE SupersededUpdateID = ?",
        )
        .bind(update_id)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }
}
