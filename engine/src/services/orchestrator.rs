// File: engine/src/services/orchestrator.rs
//
// Ordered start/stop of the platform services with bounded, cancellable waits.
//
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::ServiceSet;
use crate::resource::{ResourceHandle, ResourceState, ServiceControl};

/// Position of a service in the dependency chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum ServiceRole {
    DatabaseEngine,
    WebHost,
    UpdateService,
}

impl ServiceRole {
    /// Dependency order: each service needs the ones before it
    pub const START_ORDER: [ServiceRole; 3] = [
        ServiceRole::DatabaseEngine,
        ServiceRole::WebHost,
        ServiceRole::UpdateService,
    ];

    pub const STOP_ORDER: [ServiceRole; 3] = [
        ServiceRole::UpdateService,
        ServiceRole::WebHost,
        ServiceRole::DatabaseEngine,
    ];
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ServiceRole::DatabaseEngine => "database engine",
            ServiceRole::WebHost => "web host",
            ServiceRole::UpdateService => "update service",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceOutcome {
    pub role: ServiceRole,
    pub service_name: String,
    pub success: bool,
}

/// Per-service outcomes of a start-all or stop-all, in the order attempted.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceBatchOutcome {
    pub action: &'static str,
    pub outcomes: Vec<ServiceOutcome>,
}

impl ServiceBatchOutcome {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    pub fn as_map(&self) -> BTreeMap<String, bool> {
        self.outcomes
            .iter()
            .map(|o| (o.service_name.clone(), o.success))
            .collect()
    }

    pub fn failed(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|o| !o.success)
            .map(|o| o.service_name.as_str())
            .collect()
    }

    pub fn status_message(&self) -> String {
        let failed = self.failed();
        if failed.is_empty() {
            format!("All {} services {} successfully", self.outcomes.len(), self.action)
        } else {
            format!(
                "{} of {} services could not be {}: {}",
                failed.len(),
                self.outcomes.len(),
                self.action,
                failed.join(", ")
            )
        }
    }
}

pub struct ServiceOrchestrator {
    control: Arc<dyn ServiceControl>,
    services: ServiceSet,
    cancel: CancellationToken,
}

impl ServiceOrchestrator {
    pub fn new(control: Arc<dyn ServiceControl>, services: ServiceSet) -> Self {
        Self {
            control,
            services,
            cancel: CancellationToken::new(),
        }
    }

    /// Waits observe this token and give up (returning `false`) once it fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn services(&self) -> &ServiceSet {
        &self.services
    }

    pub fn service_name(&self, role: ServiceRole) -> &str {
        match role {
            ServiceRole::DatabaseEngine => &self.services.database_engine,
            ServiceRole::WebHost => &self.services.web_host,
            ServiceRole::UpdateService => &self.services.update_service,
        }
    }

    /// Current state of a service. Lookup failures become `NotFound`.
    pub async fn query_state(&self, service_name: &str) -> ResourceState {
        match self.control.query(service_name).await {
            Ok(state) => state,
            Err(e) => {
                debug!("State query for {} failed, treating as not found: {}", service_name, e);
                ResourceState::NotFound
            }
        }
    }

    pub async fn query_handle(&self, service_name: &str) -> ResourceHandle {
        ResourceHandle::service(service_name, self.query_state(service_name).await)
    }

    #[instrument(skip(self), fields(service = %service_name))]
    pub async fn start(&self, service_name: &str, timeout: Duration) -> bool {
        let state = self.query_state(service_name).await;
        match state {
            ResourceState::Running => {
                debug!("{} already running", service_name);
                return true;
            }
            ResourceState::NotFound => {
                warn!("Cannot start {}: service not found", service_name);
                return false;
            }
            _ => {}
        }

        if state != ResourceState::StartPending {
            if let Err(e) = self.control.start(service_name).await {
                error!("Start command for {} failed: {}", service_name, e);
                return false;
            }
        }

        let reached = self
            .wait_for_state(service_name, ResourceState::Running, timeout)
            .await;
        if reached {
            info!("Service {} is running", service_name);
        } else {
            warn!("Service {} did not reach Running within {:?}", service_name, timeout);
        }
        reached
    }

    #[instrument(skip(self), fields(service = %service_name))]
    pub async fn stop(&self, service_name: &str, force: bool, timeout: Duration) -> bool {
        let state = self.query_state(service_name).await;
        match state {
            ResourceState::Stopped => {
                debug!("{} already stopped", service_name);
                return true;
            }
            ResourceState::NotFound => {
                warn!("Cannot stop {}: service not found", service_name);
                return false;
            }
            _ => {}
        }

        let can_stop = match self.control.can_stop(service_name).await {
            Ok(can_stop) => can_stop,
            Err(e) => {
                debug!("CanStop query for {} failed, assuming graceful stop: {}", service_name, e);
                true
            }
        };

        if can_stop {
            if state != ResourceState::StopPending {
                if let Err(e) = self.control.stop(service_name).await {
                    error!("Stop command for {} failed: {}", service_name, e);
                    if !force {
                        return false;
                    }
                    self.kill_best_effort(service_name).await;
                }
            }
        } else if force {
            self.kill_best_effort(service_name).await;
        } else {
            warn!("{} refuses a graceful stop and force was not requested", service_name);
            return false;
        }

        let reached = self
            .wait_for_state(service_name, ResourceState::Stopped, timeout)
            .await;
        if reached {
            info!("Service {} is stopped", service_name);
        } else {
            warn!("Service {} did not reach Stopped within {:?}", service_name, timeout);
        }
        reached
    }

    /// Stop, settle, start. Start is never attempted when the stop failed.
    #[instrument(skip(self), fields(service = %service_name))]
    pub async fn restart(&self, service_name: &str, force: bool) -> bool {
        if !self
            .stop(service_name, force, self.services.stop_timeout())
            .await
        {
            error!("Restart of {} aborted: stop did not complete", service_name);
            return false;
        }

        tokio::select! {
            _ = self.cancel.cancelled() => {
                warn!("Restart of {} cancelled after stop", service_name);
                return false;
            }
            _ = sleep(self.services.restart_settle()) => {}
        }

        self.start(service_name, self.services.start_timeout()).await
    }

    pub async fn start_all(&self) -> ServiceBatchOutcome {
        let mut outcomes = Vec::with_capacity(3);
        for role in ServiceRole::START_ORDER {
            let service_name = self.service_name(role).to_string();
            let success = self.start(&service_name, self.services.start_timeout()).await;
            outcomes.push(ServiceOutcome {
                role,
                service_name,
                success,
            });
        }

        let outcome = ServiceBatchOutcome {
            action: "started",
            outcomes,
        };
        info!("{}", outcome.status_message());
        outcome
    }

    pub async fn stop_all(&self, force: bool) -> ServiceBatchOutcome {
        let mut outcomes = Vec::with_capacity(3);
        for role in ServiceRole::STOP_ORDER {
            let service_name = self.service_name(role).to_string();
            let success = self
                .stop(&service_name, force, self.services.stop_timeout())
                .await;
            outcomes.push(ServiceOutcome {
                role,
                service_name,
                success,
            });
        }

        let outcome = ServiceBatchOutcome {
            action: "stopped",
            outcomes,
        };
        info!("{}", outcome.status_message());
        outcome
    }

    async fn kill_best_effort(&self, service_name: &str) {
        if let Err(e) = self.control.kill(service_name).await {
            warn!("Forced termination of {} failed (ignored): {}", service_name, e);
        }
    }

    async fn wait_for_state(
        &self,
        service_name: &str,
        target: ResourceState,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.query_state(service_name).await == target {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            let pause = self.services.poll_interval().min(deadline - now);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    warn!("Wait for {} to reach {} cancelled", service_name, target);
                    return false;
                }
                _ = sleep(pause) => {}
            }
        }
    }
}
