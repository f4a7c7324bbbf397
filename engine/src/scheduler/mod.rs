//! Cron-based scheduling of the maintenance workflow
//!
//! Uses 6-field cron expressions (sec min hour day month dow), configured in
//! `main.toml`:
//!
//! ```toml
//! [schedule]
//! maintenance = "0 0 2 * * 0"  # Sundays at 2 AM
//! ```
//!
//! A run that fires while another maintenance operation holds the database
//! is skipped by the operation tracker and logged.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::maintenance::{MaintenanceEngine, MaintenancePlan};

pub struct MaintenanceScheduler {
    maintenance: Arc<MaintenanceEngine>,
    scheduler: JobScheduler,
}

impl MaintenanceScheduler {
    pub async fn new(maintenance: Arc<MaintenanceEngine>) -> Result<Self> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| anyhow!("Failed to create JobScheduler: {}", e))?;

        Ok(Self {
            maintenance,
            scheduler,
        })
    }

    /// Register the maintenance job and start the scheduler. Returns the job id.
    #[instrument(skip(self))]
    pub async fn start(&mut self, schedule: &str) -> Result<Uuid> {
        validate_6_field_cron(schedule)
            .map_err(|e| anyhow!("Invalid 6-field cron schedule '{}': {}", schedule, e))?;

        let maintenance = self.maintenance.clone();
        let job = Job::new_async(schedule, move |_uuid, _scheduler| {
            let maintenance = maintenance.clone();

            Box::pin(async move {
                info!("Executing scheduled maintenance");
                let plan = MaintenancePlan::from(maintenance.settings());
                let report = maintenance.run_maintenance(&plan, None).await;

                if report.success {
                    info!("Scheduled maintenance completed: {}", report.status_message());
                } else {
                    warn!("Scheduled maintenance did not succeed: {}", report.status_message());
                }
            })
        })
        .map_err(|e| anyhow!("Failed to create maintenance job: {}", e))?;

        let job_id = self
            .scheduler
            .add(job)
            .await
            .map_err(|e| anyhow!("Failed to add maintenance job: {}", e))?;

        self.scheduler
            .start()
            .await
            .map_err(|e| anyhow!("Failed to start scheduler: {}", e))?;

        info!("Maintenance scheduled: '{}'", schedule);
        Ok(job_id)
    }

    pub async fn shutdown(&mut self) {
        if let Err(e) = self.scheduler.shutdown().await {
            error!("Scheduler shutdown failed: {}", e);
        }
    }
}

/// Validate a 6-field cron expression (sec min hour day month dow).
pub fn validate_6_field_cron(schedule: &str) -> Result<()> {
    let parts: Vec<&str> = schedule.split_whitespace().collect();

    if parts.len() != 6 {
        return Err(anyhow!(
            "tokio-cron-scheduler requires exactly 6 fields: second minute hour day month dayofweek. Got {} fields: '{}'",
            parts.len(),
            schedule
        ));
    }

    validate_cron_field(parts[0], "second", 0, 59)?;
    validate_cron_field(parts[1], "minute", 0, 59)?;
    validate_cron_field(parts[2], "hour", 0, 23)?;
    validate_cron_field(parts[3], "day", 1, 31)?;
    validate_cron_field(parts[4], "month", 1, 12)?;
    validate_cron_field(parts[5], "dayofweek", 0, 7)?;

    Ok(())
}

fn validate_cron_field(field: &str, name: &str, min: u32, max: u32) -> Result<()> {
    if field == "?" {
        return Ok(());
    }

    for part in field.split(',') {
        let base = match part.split_once('/') {
            Some((base, step)) => {
                let step = step
                    .parse::<u32>()
                    .map_err(|_| anyhow!("Invalid {} step value: {}", name, step))?;
                if step == 0 {
                    return Err(anyhow!("{} step value cannot be 0", name));
                }
                base
            }
            None => part,
        };
        if base == "*" {
            continue;
        }

        for bound in base.splitn(2, '-') {
            let value = bound
                .parse::<u32>()
                .map_err(|_| anyhow!("Invalid {} value: {}", name, bound))?;
            if value < min || value > max {
                return Err(anyhow!(
                    "{} value {} is outside valid range {}-{}",
                    name,
                    value,
                    min,
                    max
                ));
            }
        }
    }

    Ok(())
}
