// File: engine/src/config/mod.rs
pub mod manager;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use manager::ConfigManager;

use crate::constants;

/// Engine configuration, loaded from `main.toml`. Every section has defaults
/// so a partial file is valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub services: ServiceSet,
    pub database: DatabaseConfig,
    pub maintenance: MaintenanceConfig,
    pub health: HealthConfig,
    pub transfer: TransferConfig,
    pub schedule: ScheduleConfig,
}

/// The three platform services the engine manages, plus control timings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSet {
    pub database_engine: String,
    pub web_host: String,
    pub update_service: String,
    pub use_sudo: bool,
    pub start_timeout_seconds: u64,
    pub stop_timeout_seconds: u64,
    pub repair_timeout_seconds: u64,
    pub poll_interval_millis: u64,
    pub restart_settle_millis: u64,
}

impl Default for ServiceSet {
    fn default() -> Self {
        Self {
            database_engine: "mssql-server".to_string(),
            web_host: "update-web-host".to_string(),
            update_service: "update-service".to_string(),
            use_sudo: true,
            start_timeout_seconds: constants::services::START_TIMEOUT.as_secs(),
            stop_timeout_seconds: constants::services::STOP_TIMEOUT.as_secs(),
            repair_timeout_seconds: constants::services::REPAIR_START_TIMEOUT.as_secs(),
            poll_interval_millis: constants::services::POLL_INTERVAL.as_millis() as u64,
            restart_settle_millis: constants::services::RESTART_SETTLE.as_millis() as u64,
        }
    }
}

impl ServiceSet {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_seconds)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }

    pub fn repair_timeout(&self) -> Duration {
        Duration::from_secs(self.repair_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    pub fn restart_settle(&self) -> Duration {
        Duration::from_millis(self.restart_settle_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    pub query_timeout_seconds: u64,
    /// 0 disables the timeout for maintenance commands
    pub maintenance_timeout_seconds: u64,
    pub low_priority_busy_millis: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/updates.db"),
            max_connections: constants::database::MAX_CONNECTIONS,
            query_timeout_seconds: constants::database::QUERY_TIMEOUT_SECONDS,
            maintenance_timeout_seconds: 0,
            low_priority_busy_millis: constants::database::LOW_PRIORITY_BUSY_MILLIS,
        }
    }
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Option<Duration> {
        non_zero_seconds(self.query_timeout_seconds)
    }

    pub fn maintenance_timeout(&self) -> Option<Duration> {
        non_zero_seconds(self.maintenance_timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub batch_size: u32,
    pub batch_pause_millis: u64,
    pub progress_every_batches: u32,
    pub fragmentation_threshold: f64,
    pub rebuild_threshold: f64,
    pub shrink_target_free_percent: u8,
    pub shrink_after_maintenance: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            batch_size: constants::maintenance::BATCH_SIZE,
            batch_pause_millis: constants::maintenance::BATCH_PAUSE_MILLIS,
            progress_every_batches: constants::maintenance::PROGRESS_EVERY_BATCHES,
            fragmentation_threshold: constants::maintenance::FRAGMENTATION_THRESHOLD,
            rebuild_threshold: constants::maintenance::REBUILD_THRESHOLD,
            shrink_target_free_percent: constants::maintenance::SHRINK_TARGET_FREE_PERCENT,
            shrink_after_maintenance: false,
        }
    }
}

impl MaintenanceConfig {
    pub fn batch_pause(&self) -> Duration {
        Duration::from_millis(self.batch_pause_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub check_interval_seconds: u64,
    pub auto_repair: bool,
    pub database_size_warning_gb: Option<f64>,
    pub endpoint_url: Option<String>,
    pub endpoint_timeout_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_seconds: constants::health::CHECK_INTERVAL_SECONDS,
            auto_repair: false,
            database_size_warning_gb: Some(constants::health::DATABASE_SIZE_WARNING_GB),
            endpoint_url: None,
            endpoint_timeout_seconds: constants::health::ENDPOINT_TIMEOUT_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub content_path: PathBuf,
    /// Empty means any absolute path is accepted
    pub allowed_roots: Vec<PathBuf>,
    pub default_max_age_days: u32,
    pub include_database: bool,
    /// External backup tool; the built-in SQLite backup is used when absent
    pub archive_command: Option<ArchiveCommandConfig>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            content_path: PathBuf::from("/srv/updates/content"),
            allowed_roots: Vec::new(),
            default_max_age_days: constants::transfer::DEFAULT_MAX_AGE_DAYS,
            include_database: true,
            archive_command: None,
        }
    }
}

/// Arguments may contain `{path}`, replaced by the backup file path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveCommandConfig {
    pub program: String,
    pub backup_args: Vec<String>,
    pub restore_args: Vec<String>,
}

/// Extra roots contributed by `*.toml` fragments next to `main.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferRootsFragment {
    pub allowed_roots: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// 6-field cron expression (sec min hour day month dow)
    pub maintenance: Option<String>,
}

fn non_zero_seconds(seconds: u64) -> Option<Duration> {
    if seconds == 0 {
        None
    } else {
        Some(Duration::from_secs(seconds))
    }
}
