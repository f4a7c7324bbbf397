pub mod config;
pub mod constants;
pub mod database;
pub mod errors;
pub mod health;
pub mod maintenance;
pub mod operation_tracker;
pub mod progress;
pub mod resource;
pub mod scheduler;
pub mod services;
pub mod transfer;

// Re-export commonly used types
pub use config::{Config, ConfigManager};
pub use database::{Database, MaintenanceStore, SqliteStore};
pub use errors::EngineError;
pub use health::{HealthAggregator, HealthLevel, HealthVerdict};
pub use maintenance::{MaintenanceEngine, MaintenanceOperationResult};
pub use operation_tracker::OperationTracker;
pub use progress::{ProgressEvent, ProgressSink};
pub use resource::{ResourceHandle, ResourceState, ServiceControl};
pub use services::{ServiceOrchestrator, SystemctlControl};
pub use transfer::{TransferCoordinator, TransferMode};
