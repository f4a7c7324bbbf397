// File: engine/src/transfer/archive.rs
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{Connection, SqliteConnection};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ArchiveCommandConfig;
use crate::database::{quote_identifier, Database};
use crate::progress::{emit, ProgressEvent, ProgressSink, ProgressStage};
use crate::services::commands::{run_streaming, OutputStream};

/// Database backup and restore behind the transfer coordinator.
#[async_trait]
pub trait DatabaseArchiver: Send + Sync {
    async fn backup(
        &self,
        destination: &Path,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()>;

    async fn restore(
        &self,
        source: &Path,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()>;
}

/// Backup with `VACUUM INTO`, restore by replacing every table's rows from
/// the attached backup in one transaction.
pub struct SqliteArchiver {
    database: Database,
}

impl SqliteArchiver {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    async fn replace_tables(&self, conn: &mut SqliteConnection) -> Result<u64> {
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM backup.sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut *conn)
        .await?;

        let mut tx = conn.begin().await?;
        // Tables are replaced in catalog order, so references are checked at commit
        sqlx::query("PRAGMA defer_foreign_keys = ON")
            .execute(&mut *tx)
            .await?;
        let mut rows = 0;
        for table in &tables {
            let quoted = quote_identifier(table);
            sqlx::query(&format!("DELETE FROM main.{}", quoted))
                .execute(&mut *tx)
                .await?;
            rows += sqlx::query(&format!("INSERT INTO main.{0} SELECT * FROM backup.{0}", quoted))
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }
        tx.commit().await?;

        info!("Restored {} rows across {} tables", rows, tables.len());
        Ok(rows)
    }
}

#[async_trait]
impl DatabaseArchiver for SqliteArchiver {
    async fn backup(
        &self,
        destination: &Path,
        _cancel: &CancellationToken,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()> {
        // VACUUM INTO refuses an existing target
        if tokio::fs::try_exists(destination).await? {
            tokio::fs::remove_file(destination).await?;
        }

        emit(
            progress,
            ProgressEvent::message(
                ProgressStage::DatabaseBackup,
                format!("Backing up {} to {}", self.database.descriptor(), destination.display()),
            ),
        );

        sqlx::query("VACUUM INTO ?")
            .bind(destination.to_string_lossy().to_string())
            .execute(self.database.pool())
            .await?;

        info!("Database backup written to {}", destination.display());
        Ok(())
    }

    async fn restore(
        &self,
        source: &Path,
        _cancel: &CancellationToken,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()> {
        if !tokio::fs::try_exists(source).await? {
            return Err(anyhow!("backup file {} does not exist", source.display()));
        }

        emit(
            progress,
            ProgressEvent::message(
                ProgressStage::DatabaseRestore,
                format!("Restoring {} from {}", self.database.descriptor(), source.display()),
            ),
        );

        let mut conn = self.database.pool().acquire().await?;
        sqlx::query("ATTACH DATABASE ? AS backup")
            .bind(source.to_string_lossy().to_string())
            .execute(&mut *conn)
            .await?;

        let restored = self.replace_tables(&mut conn).await;

        if let Err(e) = sqlx::query("DETACH DATABASE backup").execute(&mut *conn).await {
            warn!("Failed to detach backup, closing connection: {}", e);
            conn.close_on_drop();
        }

        restored.map(|_| ())
    }
}

/// Backup and restore through an external tool. Output lines are relayed as
/// progress; the exit status decides success.
pub struct CommandArchiver {
    command: ArchiveCommandConfig,
}

impl CommandArchiver {
    pub fn new(command: ArchiveCommandConfig) -> Self {
        Self { command }
    }

    async fn run(
        &self,
        args: &[String],
        path: &Path,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()> {
        let path = path.to_string_lossy();
        let args: Vec<String> = args.iter().map(|arg| arg.replace("{path}", &path)).collect();

        let relay = |stream: OutputStream, line: &str| {
            if stream == OutputStream::Stderr {
                warn!("{}: {}", self.command.program, line);
            }
            emit(
                progress,
                ProgressEvent::message(ProgressStage::ExternalTool, line),
            );
        };

        let status = run_streaming(&self.command.program, &args, cancel, &relay).await?;
        if status.success() {
            Ok(())
        } else {
            Err(anyhow!(
                "{} exited with code {}",
                self.command.program,
                status.code().unwrap_or(-1)
            ))
        }
    }
}

#[async_trait]
impl DatabaseArchiver for CommandArchiver {
    async fn backup(
        &self,
        destination: &Path,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()> {
        self.run(&self.command.backup_args, destination, cancel, progress)
            .await
    }

    async fn restore(
        &self,
        source: &Path,
        cancel: &CancellationToken,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()> {
        self.run(&self.command.restore_args, source, cancel, progress)
            .await
    }
}
