//! Database maintenance: batched cleanup of supersession records,
//! fragmentation-driven index optimization, statistics refresh and shrink.

mod engine;
mod result;

pub use engine::MaintenanceEngine;
pub use result::{
    IndexAction, IndexOptimization, MaintenanceOperationKind, MaintenanceOperationResult,
    MaintenancePlan, MaintenanceReport,
};
