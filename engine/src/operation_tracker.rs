//! In-process guard for mutating operations
//!
//! Bulk deletes, index rebuilds and transfers must never overlap on the same
//! target. The tracker keeps one active operation per target (the database,
//! or a transfer destination) and rejects a second one instead of queueing
//! it.
//!
//! # Usage
//!
//! ```ignore
//! tracker.try_start_operation("database", "remove superseded").await?;
//! // ... run the operation ...
//! tracker.finish_operation("database").await;
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::errors::EngineError;

#[derive(Debug, Clone, Serialize)]
pub struct ActiveOperation {
    pub operation_type: String,
    pub target_name: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationStatus {
    pub busy_targets: HashMap<String, ActiveOperation>,
    pub total_active: usize,
}

#[derive(Clone, Default)]
pub struct OperationTracker {
    active_operations: Arc<RwLock<HashMap<String, ActiveOperation>>>, // target_name -> operation
}

impl OperationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `target_name` for `operation_type`; fails with `EngineError::Busy`
    /// when another operation holds it.
    #[instrument(skip(self), fields(target = %target_name, operation = %operation_type))]
    pub async fn try_start_operation(
        &self,
        target_name: &str,
        operation_type: &str,
    ) -> Result<(), EngineError> {
        let mut active = self.active_operations.write().await;

        if let Some(current_op) = active.get(target_name) {
            let elapsed = Utc::now().signed_duration_since(current_op.started_at);
            warn!(
                "Rejected '{}' on {}: '{}' running for {}s",
                operation_type,
                target_name,
                current_op.operation_type,
                elapsed.num_seconds()
            );
            return Err(EngineError::Busy {
                target: target_name.to_string(),
                operation: current_op.operation_type.clone(),
            });
        }

        active.insert(
            target_name.to_string(),
            ActiveOperation {
                operation_type: operation_type.to_string(),
                target_name: target_name.to_string(),
                started_at: Utc::now(),
            },
        );
        info!("Started operation '{}' on {}", operation_type, target_name);
        Ok(())
    }

    #[instrument(skip(self), fields(target = %target_name))]
    pub async fn finish_operation(&self, target_name: &str) {
        let mut active = self.active_operations.write().await;
        if let Some(op) = active.remove(target_name) {
            let elapsed = Utc::now().signed_duration_since(op.started_at);
            info!(
                "Finished operation '{}' on {} (took {}s)",
                op.operation_type,
                target_name,
                elapsed.num_seconds()
            );
        }
    }

    pub async fn get_operation_status(&self) -> OperationStatus {
        let active = self.active_operations.read().await;
        OperationStatus {
            busy_targets: active.clone(),
            total_active: active.len(),
        }
    }

    pub async fn is_busy(&self, target_name: &str) -> bool {
        self.active_operations.read().await.contains_key(target_name)
    }

    pub async fn get_active_operation(&self, target_name: &str) -> Option<ActiveOperation> {
        self.active_operations.read().await.get(target_name).cloned()
    }

    /// Drop entries older than `max_hours`, left behind by a task that died
    /// without finishing.
    pub async fn cleanup_old_operations(&self, max_hours: i64) -> u32 {
        let mut active = self.active_operations.write().await;
        let cutoff = Utc::now() - chrono::Duration::hours(max_hours);
        let initial_count = active.len();

        active.retain(|target_name, operation| {
            let keep = operation.started_at > cutoff;
            if !keep {
                warn!(
                    "Cleaned up stuck operation '{}' on {} (started {})",
                    operation.operation_type, target_name, operation.started_at
                );
            }
            keep
        });

        (initial_count - active.len()) as u32
    }
}
