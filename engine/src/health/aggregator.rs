// File: engine/src/health/aggregator.rs
use anyhow::Result;
use futures::future::join_all;
use reqwest::Client as HttpClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::endpoint::probe_endpoint;
use super::types::{HealthLevel, HealthVerdict, RepairOutcome};
use crate::config::HealthConfig;
use crate::constants::database::RESOURCE_NAME;
use crate::maintenance::MaintenanceEngine;
use crate::resource::{ResourceHandle, ResourceState};
use crate::services::{ServiceOrchestrator, ServiceRole};

/// Combines service states and database reachability into one verdict.
/// Holds no state between checks.
pub struct HealthAggregator {
    orchestrator: Arc<ServiceOrchestrator>,
    maintenance: Arc<MaintenanceEngine>,
    settings: HealthConfig,
    client: HttpClient,
}

impl HealthAggregator {
    pub fn new(
        orchestrator: Arc<ServiceOrchestrator>,
        maintenance: Arc<MaintenanceEngine>,
        settings: HealthConfig,
    ) -> Result<Self> {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(settings.endpoint_timeout_seconds))
            .build()?;

        Ok(Self {
            orchestrator,
            maintenance,
            settings,
            client,
        })
    }

    #[instrument(skip(self))]
    pub async fn check_health(&self, include_database: bool) -> HealthVerdict {
        let mut verdict = HealthVerdict::new();

        let handles = join_all(
            ServiceRole::START_ORDER
                .iter()
                .map(|role| self.orchestrator.query_handle(self.orchestrator.service_name(*role))),
        )
        .await;

        for (role, handle) in ServiceRole::START_ORDER.into_iter().zip(handles) {
            if !handle.state.is_running() {
                verdict.record_issue(
                    HealthLevel::Unhealthy,
                    format!("{} '{}' is {}", role, handle.name(), handle.state),
                );
            } else if role == ServiceRole::WebHost {
                self.check_endpoint(&mut verdict).await;
            }
            verdict.resources.insert(handle.name().to_string(), handle.state);
        }

        if include_database {
            self.check_database(&mut verdict).await;
        }

        if verdict.is_healthy() {
            debug!("{}", verdict.status_message());
        } else {
            warn!("{}", verdict.status_message());
        }
        verdict
    }

    /// Start every required service that is not running, using the short
    /// repair timeout. The database itself is never repaired here.
    #[instrument(skip(self))]
    pub async fn repair_health(&self) -> RepairOutcome {
        let timeout = self.orchestrator.services().repair_timeout();
        let mut attempted = Vec::new();
        let mut services_started = Vec::new();

        for role in ServiceRole::START_ORDER {
            let name = self.orchestrator.service_name(role).to_string();
            let state = self.orchestrator.query_state(&name).await;
            if state.is_running() {
                continue;
            }

            info!("Repair: starting {} '{}' (was {})", role, name, state);
            attempted.push(name.clone());
            if self.orchestrator.start(&name, timeout).await {
                services_started.push(name);
            }
        }

        let outcome = RepairOutcome {
            success: services_started.len() == attempted.len(),
            attempted,
            services_started,
        };
        info!("{}", outcome.status_message());
        outcome
    }

    async fn check_endpoint(&self, verdict: &mut HealthVerdict) {
        let Some(url) = self.settings.endpoint_url.as_deref() else {
            return;
        };

        if let Err(e) = probe_endpoint(&self.client, url).await {
            verdict.record_issue(
                HealthLevel::Degraded,
                format!("web host is running but its endpoint is not responding: {}", e),
            );
        }
    }

    async fn check_database(&self, verdict: &mut HealthVerdict) {
        let descriptor = self.maintenance.descriptor();

        let handle = match self.maintenance.probe().await {
            Ok(()) => ResourceHandle::database(&descriptor, true),
            Err(e) => {
                verdict.record_issue(
                    HealthLevel::Unhealthy,
                    format!("database '{}' is not reachable: {}", descriptor, e),
                );
                ResourceHandle::database(&descriptor, false)
            }
        };
        verdict.resources.insert(RESOURCE_NAME.to_string(), handle.state);

        if handle.state != ResourceState::Running {
            return;
        }

        verdict.database_size_gb = self.maintenance.size_gb().await;
        if let (Some(size), Some(limit)) = (
            verdict.database_size_gb,
            self.settings.database_size_warning_gb,
        ) {
            if size >= limit {
                verdict.record_issue(
                    HealthLevel::Degraded,
                    format!("database size {:.2} GB is at or above {:.2} GB", size, limit),
                );
            }
        }
    }
}
