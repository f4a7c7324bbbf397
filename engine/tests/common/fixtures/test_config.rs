//! Fast engine settings and a config directory builder

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use update_keeper::config::{HealthConfig, MaintenanceConfig, ServiceSet, TransferConfig};

pub const DB_SERVICE: &str = "test-db";
pub const WEB_SERVICE: &str = "test-web";
pub const UPDATE_SERVICE: &str = "test-update";

/// Service names used by every orchestrator test, with timings short enough
/// that a timeout costs about a second.
pub fn fast_services() -> ServiceSet {
    ServiceSet {
        database_engine: DB_SERVICE.to_string(),
        web_host: WEB_SERVICE.to_string(),
        update_service: UPDATE_SERVICE.to_string(),
        use_sudo: false,
        start_timeout_seconds: 1,
        stop_timeout_seconds: 1,
        repair_timeout_seconds: 1,
        poll_interval_millis: 10,
        restart_settle_millis: 10,
    }
}

/// No pause between batches and a progress event for every batch.
pub fn fast_maintenance() -> MaintenanceConfig {
    MaintenanceConfig {
        batch_pause_millis: 0,
        progress_every_batches: 1,
        ..MaintenanceConfig::default()
    }
}

pub fn health_settings(endpoint_url: Option<String>) -> HealthConfig {
    HealthConfig {
        endpoint_url,
        endpoint_timeout_seconds: 2,
        ..HealthConfig::default()
    }
}

pub fn transfer_settings(allowed_roots: Vec<PathBuf>) -> TransferConfig {
    TransferConfig {
        allowed_roots,
        ..TransferConfig::default()
    }
}

/// Builder for a config directory holding `main.toml` and optional fragments
pub struct TestConfigBuilder {
    temp_dir: TempDir,
    main_toml: String,
    fragments: Vec<(String, String)>,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp dir"),
            main_toml: String::new(),
            fragments: Vec::new(),
        }
    }

    pub fn with_main(mut self, toml: &str) -> Self {
        self.main_toml = toml.to_string();
        self
    }

    pub fn with_fragment(mut self, name: &str, toml: &str) -> Self {
        self.fragments.push((name.to_string(), toml.to_string()));
        self
    }

    pub fn build(self) -> TestConfig {
        let config_dir = self.temp_dir.path().join("config");
        fs::create_dir_all(&config_dir).expect("Failed to create config dir");
        fs::write(config_dir.join("main.toml"), &self.main_toml).expect("Failed to write main.toml");

        for (name, toml) in &self.fragments {
            fs::write(config_dir.join(format!("{}.toml", name)), toml)
                .expect("Failed to write config fragment");
        }

        TestConfig {
            _temp_dir: self.temp_dir,
            config_dir,
        }
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps the temp directory alive for the duration of a test
pub struct TestConfig {
    _temp_dir: TempDir,
    config_dir: PathBuf,
}

impl TestConfig {
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn config_dir_str(&self) -> &str {
        self.config_dir.to_str().expect("temp dir path is not UTF-8")
    }
}
