//! Controllable external resources.
//!
//! A resource is either a named platform service or the database connection.
//! Handles are stateless: they are built when a caller needs the current
//! state and dropped right after.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observed state of a resource. Transitions are driven by the platform only;
/// the engine learns about them by querying again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceState {
    Unknown,
    Stopped,
    StartPending,
    Running,
    StopPending,
    NotFound,
}

impl ResourceState {
    pub fn is_running(self) -> bool {
        self == ResourceState::Running
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ResourceState::Unknown => "Unknown",
            ResourceState::Stopped => "Stopped",
            ResourceState::StartPending => "StartPending",
            ResourceState::Running => "Running",
            ResourceState::StopPending => "StopPending",
            ResourceState::NotFound => "NotFound",
        };
        f.write_str(label)
    }
}

/// Platform service control capability.
///
/// Implementations report failures as errors; the orchestrator is the layer
/// that turns them into boolean outcomes.
#[async_trait]
pub trait ServiceControl: Send + Sync {
    async fn query(&self, service_name: &str) -> Result<ResourceState>;

    async fn start(&self, service_name: &str) -> Result<()>;

    async fn stop(&self, service_name: &str) -> Result<()>;

    /// Whether the service accepts a graceful stop request
    async fn can_stop(&self, service_name: &str) -> Result<bool>;

    /// Terminate the process backing the service
    async fn kill(&self, service_name: &str) -> Result<()>;
}

/// Identity of a controllable resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceIdentity {
    Service { name: String },
    Database { descriptor: String },
}

/// One-shot view of a resource: its identity and the state observed when the
/// handle was built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub identity: ResourceIdentity,
    pub state: ResourceState,
}

impl ResourceHandle {
    pub fn service(name: &str, state: ResourceState) -> Self {
        Self {
            identity: ResourceIdentity::Service {
                name: name.to_string(),
            },
            state,
        }
    }

    pub fn database(descriptor: &str, connected: bool) -> Self {
        Self {
            identity: ResourceIdentity::Database {
                descriptor: descriptor.to_string(),
            },
            state: if connected {
                ResourceState::Running
            } else {
                ResourceState::Unknown
            },
        }
    }

    pub fn name(&self) -> &str {
        match &self.identity {
            ResourceIdentity::Service { name } => name,
            ResourceIdentity::Database { descriptor } => descriptor,
        }
    }
}
