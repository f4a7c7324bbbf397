// File: engine/src/main.rs
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use update_keeper::constants::cleanup;
use update_keeper::scheduler::MaintenanceScheduler;
use update_keeper::{
    ConfigManager, Database, HealthAggregator, HealthLevel, MaintenanceEngine, OperationTracker,
    ServiceOrchestrator, SqliteStore, SystemctlControl,
};

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::from_default_env()
        .add_directive("update_keeper=info".parse()?)
        .add_directive("tokio_cron_scheduler=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting update keeper");

    let config_dir = std::env::args().nth(1).unwrap_or_else(|| "config".to_string());
    let config_manager = ConfigManager::new(&config_dir).await?;
    let config = config_manager.get_current_config();

    let cancel = CancellationToken::new();

    let database = Database::connect(&config.database).await?;
    let store = Arc::new(SqliteStore::new(database, &config.database));

    let operation_tracker = OperationTracker::new();
    let maintenance = Arc::new(
        MaintenanceEngine::new(store, config.maintenance.clone())
            .with_tracker(operation_tracker.clone())
            .with_cancellation(cancel.clone()),
    );
    info!("Maintenance engine initialized");

    let control = Arc::new(SystemctlControl::new(config.services.use_sudo));
    let orchestrator = Arc::new(
        ServiceOrchestrator::new(control, config.services.clone())
            .with_cancellation(cancel.clone()),
    );

    let health = Arc::new(HealthAggregator::new(
        orchestrator.clone(),
        maintenance.clone(),
        config.health.clone(),
    )?);
    info!("Health aggregator initialized");

    // Periodic health check with optional auto-repair
    let health_clone = health.clone();
    let auto_repair = config.health.auto_repair;
    let check_interval = config.health.check_interval_seconds.max(1);
    let health_cancel = cancel.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(check_interval));
        loop {
            tokio::select! {
                _ = health_cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let verdict = health_clone.check_health(true).await;
            if verdict.level == HealthLevel::Unhealthy && auto_repair {
                let outcome = health_clone.repair_health().await;
                if !outcome.success {
                    warn!("Auto-repair: {}", outcome.status_message());
                }
            }
        }
    });

    // Periodic cleanup of operations left behind by dead tasks
    let tracker_clone = operation_tracker.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(cleanup::CLEANUP_INTERVAL_SECONDS));
        loop {
            interval.tick().await;
            let cleaned = tracker_clone
                .cleanup_old_operations(cleanup::OPERATION_CLEANUP_HOURS)
                .await;
            if cleaned > 0 {
                warn!(
                    "Cleaned up {} stuck operations older than {} hours",
                    cleaned,
                    cleanup::OPERATION_CLEANUP_HOURS
                );
            }
        }
    });

    let mut scheduler = match &config.schedule.maintenance {
        Some(schedule) => {
            let mut scheduler = MaintenanceScheduler::new(maintenance.clone()).await?;
            match scheduler.start(schedule).await {
                Ok(job_id) => info!("Maintenance job {} registered", job_id),
                Err(e) => error!("Failed to schedule maintenance: {}", e),
            }
            Some(scheduler)
        }
        None => {
            info!("No maintenance schedule configured");
            None
        }
    };

    info!(
        "Update keeper running: health checks every {}s, auto-repair {}",
        check_interval,
        if auto_repair { "enabled" } else { "disabled" }
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, cancelling in-flight work");
    cancel.cancel();

    if let Some(scheduler) = scheduler.as_mut() {
        scheduler.shutdown().await;
    }

    info!("Update keeper stopped");
    Ok(())
}
