//! Health aggregation
//!
//! Turns service states and database reachability into a single verdict and
//! drives best-effort repair of stopped services.

pub mod aggregator;
mod endpoint;
pub mod types;

pub use aggregator::HealthAggregator;
pub use types::{HealthLevel, HealthVerdict, RepairOutcome};
