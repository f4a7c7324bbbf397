// File: engine/src/maintenance/engine.rs
use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use super::result::{
    IndexAction, IndexOptimization, MaintenanceOperationKind, MaintenanceOperationResult,
    MaintenancePlan, MaintenanceReport,
};
use crate::config::MaintenanceConfig;
use crate::constants::database::RESOURCE_NAME;
use crate::database::{MaintenanceStore, SpaceUsage};
use crate::operation_tracker::OperationTracker;
use crate::progress::{emit, ProgressEvent, ProgressSink, ProgressStage};

/// Catalog of maintenance operations against the live update database.
///
/// Mutating operations claim the database in the operation tracker first, so
/// two of them never overlap inside one process. Failures come back as
/// unsuccessful results with a message, never as errors.
pub struct MaintenanceEngine {
    store: Arc<dyn MaintenanceStore>,
    settings: MaintenanceConfig,
    tracker: OperationTracker,
    cancel: CancellationToken,
}

impl MaintenanceEngine {
    pub fn new(store: Arc<dyn MaintenanceStore>, settings: MaintenanceConfig) -> Self {
        Self {
            store,
            settings,
            tracker: OperationTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Share a tracker with other components guarding the same database.
    pub fn with_tracker(mut self, tracker: OperationTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn settings(&self) -> &MaintenanceConfig {
        &self.settings
    }

    pub fn tracker(&self) -> &OperationTracker {
        &self.tracker
    }

    pub fn descriptor(&self) -> String {
        self.store.descriptor()
    }

    pub async fn probe(&self) -> Result<()> {
        self.store.probe().await
    }

    pub async fn remove_declined_records(&self) -> MaintenanceOperationResult {
        let kind = MaintenanceOperationKind::RemoveDeclined;
        if let Err(rejected) = self.claim(kind).await {
            return rejected;
        }
        let result = self.remove_declined_inner().await;
        self.release().await;
        result
    }

    pub async fn remove_superseded_records(
        &self,
        batch_size: u32,
        progress: Option<&dyn ProgressSink>,
    ) -> MaintenanceOperationResult {
        let kind = MaintenanceOperationKind::RemoveSuperseded;
        if let Err(rejected) = self.claim(kind).await {
            return rejected;
        }
        let result = self.remove_superseded_inner(batch_size, progress).await;
        self.release().await;
        result
    }

    pub async fn optimize_indexes(
        &self,
        fragmentation_threshold: f64,
        rebuild_threshold: f64,
        progress: Option<&dyn ProgressSink>,
    ) -> IndexOptimization {
        let kind = MaintenanceOperationKind::OptimizeIndexes;
        if let Err(rejected) = self.claim(kind).await {
            return IndexOptimization {
                rebuilt: 0,
                reorganized: 0,
                failed: 0,
                result: rejected,
            };
        }
        let result = self
            .optimize_indexes_inner(fragmentation_threshold, rebuild_threshold, progress)
            .await;
        self.release().await;
        result
    }

    pub async fn update_statistics(&self) -> MaintenanceOperationResult {
        let kind = MaintenanceOperationKind::UpdateStatistics;
        if let Err(rejected) = self.claim(kind).await {
            return rejected;
        }
        let result = self.update_statistics_inner().await;
        self.release().await;
        result
    }

    pub async fn shrink_database(&self, target_free_percent: u8) -> MaintenanceOperationResult {
        let kind = MaintenanceOperationKind::Shrink;
        if let Err(rejected) = self.claim(kind).await {
            return rejected;
        }
        let result = self.shrink_inner(target_free_percent).await;
        self.release().await;
        result
    }

    /// Read-only; `None` when the database cannot be queried.
    pub async fn space_usage(&self) -> Option<SpaceUsage> {
        match self.store.space_usage().await {
            Ok(usage) => Some(usage),
            Err(e) => {
                warn!("Space usage query failed: {}", e);
                None
            }
        }
    }

    pub async fn size_gb(&self) -> Option<f64> {
        self.space_usage().await.map(|usage| usage.allocated_gb())
    }

    /// Remove declined, remove superseded, optimize indexes, refresh
    /// statistics and optionally shrink, holding the database for the whole
    /// run. Later steps still run when an earlier one failed.
    #[instrument(skip(self, plan, progress))]
    pub async fn run_maintenance(
        &self,
        plan: &MaintenancePlan,
        progress: Option<&dyn ProgressSink>,
    ) -> MaintenanceReport {
        let started_at = Utc::now();
        let started = Instant::now();

        if let Err(rejected) = self.claim(MaintenanceOperationKind::RemoveDeclined).await {
            return MaintenanceReport {
                started_at,
                elapsed: started.elapsed(),
                steps: vec![rejected],
                space_before: None,
                space_after: None,
                cancelled: false,
                success: false,
            };
        }

        info!("Starting maintenance run on {}", self.store.descriptor());
        let space_before = self.space_usage().await;
        let mut steps = Vec::new();

        let mut kinds = vec![
            MaintenanceOperationKind::RemoveDeclined,
            MaintenanceOperationKind::RemoveSuperseded,
            MaintenanceOperationKind::OptimizeIndexes,
            MaintenanceOperationKind::UpdateStatistics,
        ];
        if plan.shrink {
            kinds.push(MaintenanceOperationKind::Shrink);
        }

        for kind in kinds {
            if self.cancel.is_cancelled() {
                warn!("Maintenance run cancelled before '{}'", kind);
                break;
            }

            let step = match kind {
                MaintenanceOperationKind::RemoveDeclined => self.remove_declined_inner().await,
                MaintenanceOperationKind::RemoveSuperseded => {
                    self.remove_superseded_inner(plan.batch_size, progress).await
                }
                MaintenanceOperationKind::OptimizeIndexes => {
                    self.optimize_indexes_inner(
                        plan.fragmentation_threshold,
                        plan.rebuild_threshold,
                        progress,
                    )
                    .await
                    .result
                }
                MaintenanceOperationKind::UpdateStatistics => self.update_statistics_inner().await,
                MaintenanceOperationKind::Shrink => {
                    self.shrink_inner(plan.shrink_target_free_percent).await
                }
            };
            info!("{}", step.status_message());
            steps.push(step);
        }

        let space_after = self.space_usage().await;
        self.release().await;

        let cancelled = self.cancel.is_cancelled();
        let report = MaintenanceReport {
            started_at,
            elapsed: started.elapsed(),
            success: !cancelled && steps.iter().all(|s| s.success),
            steps,
            space_before,
            space_after,
            cancelled,
        };

        let stage = if report.success {
            ProgressStage::Finished
        } else {
            ProgressStage::Failed
        };
        emit(progress, ProgressEvent::message(stage, report.status_message()));
        info!("{}", report.status_message());
        report
    }

    async fn claim(&self, kind: MaintenanceOperationKind) -> Result<(), MaintenanceOperationResult> {
        self.tracker
            .try_start_operation(RESOURCE_NAME, &kind.to_string())
            .await
            .map_err(|busy| {
                MaintenanceOperationResult::failed(
                    kind,
                    0,
                    std::time::Duration::ZERO,
                    busy.to_string(),
                )
            })
    }

    async fn release(&self) {
        self.tracker.finish_operation(RESOURCE_NAME).await;
    }

    async fn remove_declined_inner(&self) -> MaintenanceOperationResult {
        let kind = MaintenanceOperationKind::RemoveDeclined;
        let started = Instant::now();
        match self.store.delete_declined_supersessions().await {
            Ok(removed) => {
                info!("Removed {} declined supersession records", removed);
                MaintenanceOperationResult::succeeded(kind, removed, started.elapsed())
            }
            Err(e) => {
                warn!("Declined record cleanup failed, continuing: {}", e);
                MaintenanceOperationResult::failed(kind, 0, started.elapsed(), e.to_string())
            }
        }
    }

    async fn remove_superseded_inner(
        &self,
        batch_size: u32,
        progress: Option<&dyn ProgressSink>,
    ) -> MaintenanceOperationResult {
        let kind = MaintenanceOperationKind::RemoveSuperseded;
        let started = Instant::now();
        let batch_size = batch_size.max(1);
        let report_every = self.settings.progress_every_batches.max(1);
        let mut total: u64 = 0;
        let mut batches: u32 = 0;

        info!("Removing superseded records in batches of {}", batch_size);

        loop {
            if self.cancel.is_cancelled() {
                warn!("Superseded cleanup cancelled after {} records", total);
                return MaintenanceOperationResult::failed(
                    kind,
                    total,
                    started.elapsed(),
                    "cancelled",
                );
            }

            let deleted = match self.store.delete_superseded_batch(batch_size).await {
                Ok(deleted) => deleted,
                Err(e) => {
                    error!("Superseded batch {} failed after {} records: {}", batches + 1, total, e);
                    return MaintenanceOperationResult::failed(
                        kind,
                        total,
                        started.elapsed(),
                        e.to_string(),
                    );
                }
            };

            if deleted == 0 {
                break;
            }

            total += deleted;
            batches += 1;
            debug!("Batch {} removed {} records", batches, deleted);

            if batches % report_every == 0 {
                info!("Removed {} superseded records so far", total);
                emit(
                    progress,
                    ProgressEvent::counted(
                        ProgressStage::SupersededCleanup,
                        format!("Removed {} superseded records", total),
                        total,
                        None,
                    ),
                );
            }

            if !self.pause_between_batches().await {
                warn!("Superseded cleanup cancelled after {} records", total);
                return MaintenanceOperationResult::failed(
                    kind,
                    total,
                    started.elapsed(),
                    "cancelled",
                );
            }
        }

        info!("Removed {} superseded records in {} batches", total, batches);
        emit(
            progress,
            ProgressEvent::counted(
                ProgressStage::SupersededCleanup,
                format!("Superseded cleanup complete: {} records", total),
                total,
                Some(total),
            ),
        );
        MaintenanceOperationResult::succeeded(kind, total, started.elapsed())
    }

    /// Returns `false` when cancelled during the pause.
    async fn pause_between_batches(&self) -> bool {
        let pause = self.settings.batch_pause();
        if pause.is_zero() {
            return true;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(pause) => true,
        }
    }

    async fn optimize_indexes_inner(
        &self,
        fragmentation_threshold: f64,
        rebuild_threshold: f64,
        progress: Option<&dyn ProgressSink>,
    ) -> IndexOptimization {
        let kind = MaintenanceOperationKind::OptimizeIndexes;
        let started = Instant::now();

        let mut indexes = match self.store.index_fragmentation().await {
            Ok(indexes) => indexes,
            Err(e) => {
                warn!("Index fragmentation scan failed: {}", e);
                return IndexOptimization {
                    rebuilt: 0,
                    reorganized: 0,
                    failed: 0,
                    result: MaintenanceOperationResult::failed(kind, 0, started.elapsed(), e.to_string()),
                };
            }
        };

        // Largest first so a bounded window covers the biggest wins
        indexes.sort_by(|a, b| b.page_count.cmp(&a.page_count));

        let candidates: Vec<_> = indexes
            .into_iter()
            .map(|index| {
                let action = IndexAction::classify(
                    index.fragmentation_percent,
                    fragmentation_threshold,
                    rebuild_threshold,
                );
                (index, action)
            })
            .filter(|(_, action)| *action != IndexAction::Skip)
            .collect();

        let total = candidates.len() as u64;
        let (mut rebuilt, mut reorganized, mut failed) = (0u32, 0u32, 0u32);
        let mut cancelled = false;

        for (position, (index, action)) in candidates.iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let outcome = match action {
                IndexAction::Rebuild => self.store.rebuild_index(index).await,
                IndexAction::Reorganize => self.store.reorganize_index(index).await,
                IndexAction::Skip => continue,
            };

            match outcome {
                Ok(()) => {
                    debug!(
                        "{:?} {} on {} ({:.1}% fragmented)",
                        action, index.index_name, index.table_name, index.fragmentation_percent
                    );
                    if *action == IndexAction::Rebuild {
                        rebuilt += 1;
                    } else {
                        reorganized += 1;
                    }
                }
                Err(e) => {
                    warn!("Skipping index {} after failure: {}", index.index_name, e);
                    failed += 1;
                }
            }

            emit(
                progress,
                ProgressEvent::counted(
                    ProgressStage::IndexOptimization,
                    format!("{:?} {}", action, index.index_name),
                    position as u64 + 1,
                    Some(total),
                ),
            );
        }

        info!(
            "Index optimization: {} rebuilt, {} reorganized, {} failed",
            rebuilt, reorganized, failed
        );

        let affected = u64::from(rebuilt + reorganized);
        let result = if cancelled {
            MaintenanceOperationResult::failed(kind, affected, started.elapsed(), "cancelled")
        } else if failed > 0 {
            MaintenanceOperationResult::failed(
                kind,
                affected,
                started.elapsed(),
                format!("{} indexes could not be optimized", failed),
            )
        } else {
            MaintenanceOperationResult::succeeded(kind, affected, started.elapsed())
        };

        IndexOptimization {
            rebuilt,
            reorganized,
            failed,
            result,
        }
    }

    async fn update_statistics_inner(&self) -> MaintenanceOperationResult {
        let kind = MaintenanceOperationKind::UpdateStatistics;
        let started = Instant::now();
        match self.store.update_statistics().await {
            Ok(()) => {
                info!("Statistics refreshed");
                MaintenanceOperationResult::succeeded(kind, 0, started.elapsed())
            }
            Err(e) => {
                warn!("Statistics refresh failed: {}", e);
                MaintenanceOperationResult::failed(kind, 0, started.elapsed(), e.to_string())
            }
        }
    }

    async fn shrink_inner(&self, target_free_percent: u8) -> MaintenanceOperationResult {
        let kind = MaintenanceOperationKind::Shrink;
        let started = Instant::now();
        match self.store.shrink(target_free_percent).await {
            Ok(released) => {
                info!(
                    "Released {} pages, keeping {}% free headroom",
                    released, target_free_percent
                );
                MaintenanceOperationResult::succeeded(kind, released, started.elapsed())
            }
            Err(e) => {
                error!("Shrink failed: {}", e);
                MaintenanceOperationResult::failed(kind, 0, started.elapsed(), e.to_string())
            }
        }
    }
}
