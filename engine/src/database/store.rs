// File: engine/src/database/store.rs
use anyhow::Result;
use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::Sqlite;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::records::{leaf_free_percent, pages_to_release, IndexFragmentation, SpaceUsage};
use super::Database;
use crate::config::DatabaseConfig;
use crate::constants::database::BUSY_TIMEOUT_MILLIS;
use crate::errors::DatabaseError;

/// Maintenance capability over the live update database.
///
/// Every method is one complete statement (or one statement per index) so a
/// failure never leaves a step half-applied.
#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    /// Connection descriptor shown in health verdicts.
    fn descriptor(&self) -> String;

    /// Cheap connectivity probe.
    async fn probe(&self) -> Result<()>;

    /// Delete supersession links whose superseded update is declined.
    async fn delete_declined_supersessions(&self) -> Result<u64>;

    /// Delete at most `batch_size` supersession links of superseded updates.
    async fn delete_superseded_batch(&self, batch_size: u32) -> Result<u64>;

    async fn index_fragmentation(&self) -> Result<Vec<IndexFragmentation>>;

    async fn rebuild_index(&self, index: &IndexFragmentation) -> Result<()>;

    async fn reorganize_index(&self, index: &IndexFragmentation) -> Result<()>;

    async fn update_statistics(&self) -> Result<()>;

    /// Release free pages until `target_free_percent` of the file is free.
    /// Returns the number of pages released.
    async fn shrink(&self, target_free_percent: u8) -> Result<u64>;

    async fn space_usage(&self) -> Result<SpaceUsage>;
}

/// `MaintenanceStore` over an sqlx SQLite pool.
///
/// Read-only queries use the short query timeout, mutating commands the
/// maintenance timeout (unbounded when not configured).
pub struct SqliteStore {
    database: Database,
    query_timeout: Option<Duration>,
    maintenance_timeout: Option<Duration>,
    low_priority_busy_millis: u64,
}

impl SqliteStore {
    pub fn new(database: Database, config: &DatabaseConfig) -> Self {
        Self {
            database,
            query_timeout: config.query_timeout(),
            maintenance_timeout: config.maintenance_timeout(),
            low_priority_busy_millis: config.low_priority_busy_millis,
        }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    async fn bounded<T, F>(&self, operation: &str, limit: Option<Duration>, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match limit {
            Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
                DatabaseError::Timeout {
                    operation: operation.to_string(),
                }
            })?,
            None => work.await,
        }
    }

    /// A pooled connection that gives up quickly on lock contention so the
    /// update service's own writers keep priority.
    async fn low_priority_connection(&self) -> Result<PoolConnection<Sqlite>> {
        let mut conn = self.database.pool().acquire().await?;
        sqlx::query(&format!("PRAGMA busy_timeout = {}", self.low_priority_busy_millis))
            .execute(&mut *conn)
            .await?;
        Ok(conn)
    }

    async fn release_low_priority(&self, mut conn: PoolConnection<Sqlite>) {
        if let Err(e) = sqlx::query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MILLIS))
            .execute(&mut *conn)
            .await
        {
            warn!("Failed to restore busy timeout, closing connection: {}", e);
            conn.close_on_drop();
        }
    }

    async fn page_counters(&self) -> Result<(u64, u64, u64)> {
        let pool = self.database.pool();
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count").fetch_one(pool).await?;
        let freelist: i64 = sqlx::query_scalar("PRAGMA freelist_count").fetch_one(pool).await?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size").fetch_one(pool).await?;
        Ok((
            page_count.max(0) as u64,
            freelist.max(0) as u64,
            page_size.max(0) as u64,
        ))
    }
}

pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl MaintenanceStore for SqliteStore {
    fn descriptor(&self) -> String {
        self.database.descriptor().to_string()
    }

    async fn probe(&self) -> Result<()> {
        self.bounded("probe", self.query_timeout, async {
            let _: i64 = sqlx::query_scalar("SELECT 1")
                .fetch_one(self.database.pool())
                .await?;
            Ok(())
        })
        .await
    }

    async fn delete_declined_supersessions(&self) -> Result<u64> {
        self.bounded("remove declined supersessions", self.maintenance_timeout, async {
            let result = sqlx::query(
                r#"
                DELETE FROM tbRevisionSupersedesUpdate
                WHERE SupersededUpdateID IN (
                    SELECT UpdateID FROM tbUpdate WHERE IsDeclined = 1
                )
                "#,
            )
            .execute(self.database.pool())
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn delete_superseded_batch(&self, batch_size: u32) -> Result<u64> {
        self.bounded("remove superseded batch", self.maintenance_timeout, async {
            let result = sqlx::query(
                r#"
                DELETE FROM tbRevisionSupersedesUpdate
                WHERE rowid IN (
                    SELECT s.rowid
                    FROM tbRevisionSupersedesUpdate s
                    JOIN tbUpdate u ON u.UpdateID = s.SupersededUpdateID
                    WHERE u.IsSuperseded = 1
                    LIMIT ?
                )
                "#,
            )
            .bind(i64::from(batch_size))
            .execute(self.database.pool())
            .await?;
            Ok(result.rows_affected())
        })
        .await
    }

    async fn index_fragmentation(&self) -> Result<Vec<IndexFragmentation>> {
        self.bounded("index fragmentation scan", self.maintenance_timeout, async {
            let pool = self.database.pool();
            let indexes: Vec<(String, String)> = sqlx::query_as(
                r#"
                SELECT name, tbl_name FROM sqlite_master
                WHERE type = 'index' AND name NOT LIKE 'sqlite_%'
                "#,
            )
            .fetch_all(pool)
            .await?;

            let mut scanned = Vec::with_capacity(indexes.len());
            for (index_name, table_name) in indexes {
                let (pages, leaves, unused, leaf_bytes): (i64, i64, i64, i64) = sqlx::query_as(
                    r#"
                    SELECT
                        COUNT(*),
                        COALESCE(SUM(pagetype = 'leaf'), 0),
                        COALESCE(SUM(CASE WHEN pagetype = 'leaf' THEN unused ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN pagetype = 'leaf' THEN pgsize ELSE 0 END), 0)
                    FROM dbstat WHERE name = ?
                    "#,
                )
                .bind(&index_name)
                .fetch_one(pool)
                .await?;

                debug!(
                    "Index {} spans {} pages, {} unused bytes over {} leaves",
                    index_name, pages, unused, leaves
                );
                scanned.push(IndexFragmentation {
                    fragmentation_percent: leaf_free_percent(
                        leaves.max(0) as u64,
                        unused.max(0) as u64,
                        leaf_bytes.max(0) as u64,
                    ),
                    page_count: pages.max(0) as u64,
                    table_name,
                    index_name,
                });
            }
            Ok(scanned)
        })
        .await
    }

    async fn rebuild_index(&self, index: &IndexFragmentation) -> Result<()> {
        let mut conn = self.low_priority_connection().await?;
        let statement = format!("REINDEX {}", quote_identifier(&index.index_name));
        let result = self
            .bounded("rebuild index", self.maintenance_timeout, async {
                sqlx::query(&statement).execute(&mut *conn).await?;
                Ok(())
            })
            .await;
        self.release_low_priority(conn).await;
        result
    }

    async fn reorganize_index(&self, index: &IndexFragmentation) -> Result<()> {
        // SQLite has no online reorganize; REINDEX on a normal connection is
        // the lighter path since it waits for readers instead of failing.
        let statement = format!("REINDEX {}", quote_identifier(&index.index_name));
        self.bounded("reorganize index", self.maintenance_timeout, async {
            sqlx::query(&statement)
                .execute(self.database.pool())
                .await?;
            Ok(())
        })
        .await
    }

    async fn update_statistics(&self) -> Result<()> {
        self.bounded("update statistics", self.maintenance_timeout, async {
            sqlx::query("ANALYZE").execute(self.database.pool()).await?;
            Ok(())
        })
        .await
    }

    async fn shrink(&self, target_free_percent: u8) -> Result<u64> {
        let (page_count, freelist, _) = self.page_counters().await?;
        let release = pages_to_release(page_count, freelist, target_free_percent);
        if release == 0 {
            info!(
                "Free space already within {}% headroom ({} of {} pages free)",
                target_free_percent, freelist, page_count
            );
            return Ok(0);
        }

        let auto_vacuum: i64 = sqlx::query_scalar("PRAGMA auto_vacuum")
            .fetch_one(self.database.pool())
            .await?;

        // auto_vacuum = 2 is incremental mode, the only one that can release
        // a bounded number of pages. VACUUM releases every free page.
        let (statement, released) = if auto_vacuum == 2 {
            (format!("PRAGMA incremental_vacuum({})", release), release)
        } else {
            ("VACUUM".to_string(), freelist)
        };
        info!("Shrinking database: {} ({} free pages over target)", statement, release);

        let mut conn = self.low_priority_connection().await?;
        let result = self
            .bounded("shrink database", self.maintenance_timeout, async {
                sqlx::query(&statement).execute(&mut *conn).await?;
                Ok(released)
            })
            .await;
        self.release_low_priority(conn).await;
        result
    }

    async fn space_usage(&self) -> Result<SpaceUsage> {
        self.bounded("space usage", self.query_timeout, async {
            let (page_count, freelist, page_size) = self.page_counters().await?;
            Ok(SpaceUsage::from_pages(page_count, freelist, page_size))
        })
        .await
    }
}
