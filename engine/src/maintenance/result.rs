use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::config::MaintenanceConfig;
use crate::database::SpaceUsage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MaintenanceOperationKind {
    RemoveDeclined,
    RemoveSuperseded,
    OptimizeIndexes,
    UpdateStatistics,
    Shrink,
}

impl fmt::Display for MaintenanceOperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MaintenanceOperationKind::RemoveDeclined => "remove declined records",
            MaintenanceOperationKind::RemoveSuperseded => "remove superseded records",
            MaintenanceOperationKind::OptimizeIndexes => "optimize indexes",
            MaintenanceOperationKind::UpdateStatistics => "update statistics",
            MaintenanceOperationKind::Shrink => "shrink database",
        };
        f.write_str(label)
    }
}

/// Outcome of one maintenance operation. `affected` counts rows for deletes,
/// indexes for optimization, released pages for a shrink and is 0 for a
/// statistics refresh.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceOperationResult {
    pub kind: MaintenanceOperationKind,
    pub affected: u64,
    pub elapsed: Duration,
    pub success: bool,
    pub message: Option<String>,
}

impl MaintenanceOperationResult {
    pub(crate) fn succeeded(kind: MaintenanceOperationKind, affected: u64, elapsed: Duration) -> Self {
        Self {
            kind,
            affected,
            elapsed,
            success: true,
            message: None,
        }
    }

    pub(crate) fn failed(
        kind: MaintenanceOperationKind,
        affected: u64,
        elapsed: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            affected,
            elapsed,
            success: false,
            message: Some(message.into()),
        }
    }

    pub fn status_message(&self) -> String {
        match (&self.message, self.success) {
            (None, true) => format!(
                "{}: {} affected in {:.1}s",
                self.kind,
                self.affected,
                self.elapsed.as_secs_f64()
            ),
            (Some(message), true) => format!("{}: {}", self.kind, message),
            (message, false) => format!(
                "{} failed after {} affected: {}",
                self.kind,
                self.affected,
                message.as_deref().unwrap_or("unknown error")
            ),
        }
    }
}

/// What `optimize_indexes` did, next to its generic result.
#[derive(Debug, Clone, Serialize)]
pub struct IndexOptimization {
    pub rebuilt: u32,
    pub reorganized: u32,
    pub failed: u32,
    pub result: MaintenanceOperationResult,
}

/// Action chosen for one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexAction {
    Rebuild,
    Reorganize,
    Skip,
}

impl IndexAction {
    pub fn classify(fragmentation: f64, fragmentation_threshold: f64, rebuild_threshold: f64) -> Self {
        if fragmentation > rebuild_threshold {
            IndexAction::Rebuild
        } else if fragmentation >= fragmentation_threshold {
            IndexAction::Reorganize
        } else {
            IndexAction::Skip
        }
    }
}

/// Parameters of a full maintenance run.
#[derive(Debug, Clone, Serialize)]
pub struct MaintenancePlan {
    pub batch_size: u32,
    pub fragmentation_threshold: f64,
    pub rebuild_threshold: f64,
    pub shrink: bool,
    pub shrink_target_free_percent: u8,
}

impl From<&MaintenanceConfig> for MaintenancePlan {
    fn from(config: &MaintenanceConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            fragmentation_threshold: config.fragmentation_threshold,
            rebuild_threshold: config.rebuild_threshold,
            shrink: config.shrink_after_maintenance,
            shrink_target_free_percent: config.shrink_target_free_percent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub steps: Vec<MaintenanceOperationResult>,
    pub space_before: Option<SpaceUsage>,
    pub space_after: Option<SpaceUsage>,
    pub cancelled: bool,
    pub success: bool,
}

impl MaintenanceReport {
    pub fn step(&self, kind: MaintenanceOperationKind) -> Option<&MaintenanceOperationResult> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    pub fn status_message(&self) -> String {
        let failed: Vec<String> = self
            .steps
            .iter()
            .filter(|s| !s.success)
            .map(|s| s.kind.to_string())
            .collect();

        let reclaimed = match (self.space_before, self.space_after) {
            (Some(before), Some(after)) if before.allocated_bytes > after.allocated_bytes => {
                format!(
                    ", {:.1} MB reclaimed",
                    (before.allocated_bytes - after.allocated_bytes) as f64 / (1024.0 * 1024.0)
                )
            }
            _ => String::new(),
        };

        if self.cancelled {
            format!(
                "Maintenance cancelled after {} of its steps{}",
                self.steps.len(),
                reclaimed
            )
        } else if failed.is_empty() {
            format!(
                "Maintenance completed: {} steps in {:.0}s{}",
                self.steps.len(),
                self.elapsed.as_secs_f64(),
                reclaimed
            )
        } else {
            format!("Maintenance finished with failures: {}{}", failed.join(", "), reclaimed)
        }
    }
}
