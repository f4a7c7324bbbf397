//! Export and import of update content plus a database backup across an
//! air gap.
//!
//! Layout of an export destination:
//!
//! ```text
//! <destination>/content/...            copied content tree
//! <destination>/database.bak           database backup (optional)
//! <destination>/transfer-manifest.json written first as incomplete, last as complete
//! ```

pub mod archive;
pub mod fs;
pub mod manifest;
pub mod validation;

pub use archive::{CommandArchiver, DatabaseArchiver, SqliteArchiver};
pub use manifest::{TransferDirection, TransferManifest, TransferMode};
pub use validation::validate_transfer_path;

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::TransferConfig;
use crate::constants::database::RESOURCE_NAME;
use crate::constants::transfer::{CONTENT_DIR, DATABASE_BACKUP_FILE};
use crate::errors::TransferError;
use crate::maintenance::MaintenanceEngine;
use crate::operation_tracker::OperationTracker;
use crate::progress::{emit, ProgressEvent, ProgressSink, ProgressStage};

#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub manifest: TransferManifest,
    pub success: bool,
    pub message: String,
}

impl TransferOutcome {
    pub fn status_message(&self) -> String {
        let direction = match self.manifest.direction {
            TransferDirection::Export => "Export",
            TransferDirection::Import => "Import",
        };
        if self.success {
            format!(
                "{} complete: {} files ({} bytes){}",
                direction,
                self.manifest.files,
                self.manifest.bytes,
                if self.manifest.database_included {
                    " and database"
                } else {
                    ""
                }
            )
        } else {
            format!("{} failed: {}", direction, self.message)
        }
    }
}

pub struct TransferCoordinator {
    settings: TransferConfig,
    maintenance: Arc<MaintenanceEngine>,
    archiver: Option<Arc<dyn DatabaseArchiver>>,
    tracker: OperationTracker,
    cancel: CancellationToken,
}

impl TransferCoordinator {
    /// Without an archiver, transfers cover the content tree only.
    pub fn new(
        settings: TransferConfig,
        maintenance: Arc<MaintenanceEngine>,
        archiver: Option<Arc<dyn DatabaseArchiver>>,
    ) -> Self {
        let tracker = maintenance.tracker().clone();
        Self {
            settings,
            maintenance,
            archiver,
            tracker,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Differential mode with the configured age window.
    pub fn differential(&self) -> TransferMode {
        TransferMode::Differential {
            max_age_days: self.settings.default_max_age_days,
        }
    }

    /// Export the configured content directory.
    pub async fn export_configured(
        &self,
        destination: &Path,
        mode: TransferMode,
        progress: Option<&dyn ProgressSink>,
    ) -> TransferOutcome {
        let source = self.settings.content_path.clone();
        self.export(&source, destination, mode, progress).await
    }

    #[instrument(skip(self, progress))]
    pub async fn export(
        &self,
        source_content: &Path,
        destination: &Path,
        mode: TransferMode,
        progress: Option<&dyn ProgressSink>,
    ) -> TransferOutcome {
        let mut manifest =
            TransferManifest::new(TransferDirection::Export, source_content, destination, mode);
        let result = self.run_export(&mut manifest, progress).await;
        self.finish(manifest, result, progress)
    }

    #[instrument(skip(self, progress))]
    pub async fn import(
        &self,
        source: &Path,
        destination_content: &Path,
        progress: Option<&dyn ProgressSink>,
    ) -> TransferOutcome {
        let mut manifest = TransferManifest::new(
            TransferDirection::Import,
            source,
            destination_content,
            TransferMode::Full,
        );
        let result = self.run_import(&mut manifest, progress).await;
        self.finish(manifest, result, progress)
    }

    /// Run `work` while holding `target` in the shared operation tracker.
    async fn guarded<F>(&self, target: &str, operation: &str, work: F) -> Result<()>
    where
        F: std::future::Future<Output = Result<()>>,
    {
        self.tracker.try_start_operation(target, operation).await?;
        let result = work.await;
        self.tracker.finish_operation(target).await;
        result
    }

    fn finish(
        &self,
        mut manifest: TransferManifest,
        result: Result<()>,
        progress: Option<&dyn ProgressSink>,
    ) -> TransferOutcome {
        let outcome = match result {
            Ok(()) => {
                manifest.mark_complete();
                TransferOutcome {
                    manifest,
                    success: true,
                    message: String::new(),
                }
            }
            Err(e) => TransferOutcome {
                manifest,
                success: false,
                message: e.to_string(),
            },
        };

        let message = outcome.status_message();
        if outcome.success {
            info!("{}", message);
            emit(progress, ProgressEvent::message(ProgressStage::Finished, message));
        } else {
            error!("{}", message);
            emit(progress, ProgressEvent::message(ProgressStage::Failed, message));
        }
        outcome
    }

    fn validate(&self, path: &Path) -> Result<PathBuf, TransferError> {
        validate_transfer_path(path, &self.settings.allowed_roots)
    }

    async fn run_export(
        &self,
        manifest: &mut TransferManifest,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()> {
        emit(
            progress,
            ProgressEvent::message(ProgressStage::Validation, "Validating export paths"),
        );
        let source = self.validate(&manifest.source)?;
        let destination = self.validate(&manifest.destination)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(TransferError::SourceMissing {
                path: source.display().to_string(),
            }
            .into());
        }

        let target = destination.display().to_string();
        self.guarded(
            &target,
            "export",
            self.export_validated(manifest, &source, &destination, progress),
        )
        .await
    }

    async fn export_validated(
        &self,
        manifest: &mut TransferManifest,
        source: &Path,
        destination: &Path,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()> {
        let include_database = self.settings.include_database && self.archiver.is_some();
        let max_age_days = match manifest.mode {
            TransferMode::Full => None,
            TransferMode::Differential { max_age_days } => Some(max_age_days),
        };

        let files = fs::collect_content(source, max_age_days).await?;
        let mut required: u64 = files.iter().map(|f| f.size).sum();
        if include_database {
            if let Some(usage) = self.maintenance.space_usage().await {
                required += usage.used_bytes;
            }
        }

        tokio::fs::create_dir_all(destination).await?;
        fs::ensure_capacity(destination, required).await?;
        manifest.write(destination).await?;

        info!(
            "Exporting {} files from {} to {}",
            files.len(),
            source.display(),
            destination.display()
        );
        let stats = fs::copy_files(
            source,
            &destination.join(CONTENT_DIR),
            &files,
            &self.cancel,
            progress,
        )
        .await?;
        manifest.files = stats.files;
        manifest.bytes = stats.bytes;

        if include_database {
            self.ensure_not_cancelled()?;
            self.backup_database(&destination.join(DATABASE_BACKUP_FILE), progress)
                .await?;
            manifest.database_included = true;
        }

        self.ensure_not_cancelled()?;
        let mut completed = manifest.clone();
        completed.mark_complete();
        completed.write(destination).await?;
        Ok(())
    }

    async fn run_import(
        &self,
        manifest: &mut TransferManifest,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()> {
        emit(
            progress,
            ProgressEvent::message(ProgressStage::Validation, "Validating import paths"),
        );
        let source = self.validate(&manifest.source)?;
        let destination = self.validate(&manifest.destination)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(TransferError::SourceMissing {
                path: source.display().to_string(),
            }
            .into());
        }

        let exported = TransferManifest::read_completed_export(&source).await?;
        manifest.mode = exported.mode;

        let target = destination.display().to_string();
        let work = self.import_validated(manifest, &exported, &source, &destination, progress);
        if exported.database_included {
            // The restore replaces live tables, so the database is claimed
            // before any content is copied
            self.guarded(
                RESOURCE_NAME,
                "restore database",
                self.guarded(&target, "import", work),
            )
            .await
        } else {
            self.guarded(&target, "import", work).await
        }
    }

    async fn import_validated(
        &self,
        manifest: &mut TransferManifest,
        exported: &TransferManifest,
        source: &Path,
        destination: &Path,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<()> {
        let content = source.join(CONTENT_DIR);
        let files = if tokio::fs::try_exists(&content).await? {
            fs::collect_content(&content, None).await?
        } else {
            Vec::new()
        };

        tokio::fs::create_dir_all(destination).await?;
        fs::ensure_capacity(destination, files.iter().map(|f| f.size).sum()).await?;

        info!(
            "Importing {} files from {} to {}",
            files.len(),
            source.display(),
            destination.display()
        );
        let stats = fs::copy_files(&content, destination, &files, &self.cancel, progress).await?;
        manifest.files = stats.files;
        manifest.bytes = stats.bytes;

        if exported.database_included {
            self.ensure_not_cancelled()?;
            self.restore_database(&source.join(DATABASE_BACKUP_FILE), progress)
                .await?;
            manifest.database_included = true;
        }

        Ok(())
    }

    async fn backup_database(&self, target: &Path, progress: Option<&dyn ProgressSink>) -> Result<()> {
        let archiver = self
            .archiver
            .as_ref()
            .ok_or_else(|| anyhow!("no database archiver configured"))?;
        self.guarded(RESOURCE_NAME, "back up database", async {
            self.maintenance
                .probe()
                .await
                .map_err(|e| anyhow!("database is not reachable: {}", e))?;
            archiver.backup(target, &self.cancel, progress).await
        })
        .await
    }

    async fn restore_database(&self, backup: &Path, progress: Option<&dyn ProgressSink>) -> Result<()> {
        let archiver = self
            .archiver
            .as_ref()
            .ok_or_else(|| anyhow!("export contains a database backup but no archiver is configured"))?;
        self.maintenance
            .probe()
            .await
            .map_err(|e| anyhow!("database is not reachable: {}", e))?;
        archiver.restore(backup, &self.cancel, progress).await
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(anyhow!("transfer cancelled"))
        } else {
            Ok(())
        }
    }
}
