pub mod commands;
pub mod orchestrator;
pub mod systemctl;

pub use orchestrator::{ServiceBatchOutcome, ServiceOrchestrator, ServiceOutcome, ServiceRole};
pub use systemctl::SystemctlControl;
