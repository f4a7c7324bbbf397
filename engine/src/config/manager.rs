// File: engine/src/config/manager.rs
use super::{Config, TransferRootsFragment};
use crate::errors::ConfigError;
use crate::scheduler::validate_6_field_cron;
use anyhow::Result;
use glob::glob;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info};

pub struct ConfigManager {
    current_config: Arc<Config>,
}

impl ConfigManager {
    pub async fn new(config_dir: &str) -> Result<Self> {
        let config = Self::load_configuration(config_dir).await?;
        Self::validate(&config)?;
        Ok(Self {
            current_config: Arc::new(config),
        })
    }

    pub fn get_current_config(&self) -> Arc<Config> {
        self.current_config.clone()
    }

    async fn load_configuration(config_dir: &str) -> Result<Config> {
        let main_config_path = format!("{}/main.toml", config_dir);
        let main_config_content =
            fs::read_to_string(&main_config_path)
                .await
                .map_err(|e| ConfigError::LoadFailed {
                    path: main_config_path.clone(),
                    reason: e.to_string(),
                })?;

        let mut config: Config =
            toml::from_str(&main_config_content).map_err(|e| ConfigError::ParseError {
                reason: format!("{}: {}", main_config_path, e),
            })?;

        // Fragments next to main.toml may only contribute transfer roots
        let pattern = format!("{}/*.toml", config_dir);
        let entries = glob(&pattern).map_err(|e| ConfigError::ParseError {
            reason: format!("glob pattern error: {}", e),
        })?;

        for entry in entries {
            let path = entry.map_err(|e| ConfigError::ParseError {
                reason: format!("glob entry error: {}", e),
            })?;

            if path.file_name().and_then(|n| n.to_str()) == Some("main.toml") {
                continue;
            }

            debug!("Loading config fragment: {}", path.display());

            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| ConfigError::LoadFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;

            let fragment: TransferRootsFragment =
                toml::from_str(&content).map_err(|e| ConfigError::ParseError {
                    reason: format!("{}: {}", path.display(), e),
                })?;

            for root in fragment.allowed_roots {
                if !config.transfer.allowed_roots.contains(&root) {
                    config.transfer.allowed_roots.push(root);
                }
            }
        }

        info!(
            "Loaded configuration: services [{}, {}, {}], database {}, {} transfer roots",
            config.services.database_engine,
            config.services.web_host,
            config.services.update_service,
            config.database.path.display(),
            config.transfer.allowed_roots.len()
        );

        Ok(config)
    }

    fn validate(config: &Config) -> std::result::Result<(), ConfigError> {
        let services = &config.services;
        for (field, value) in [
            ("services.database_engine", &services.database_engine),
            ("services.web_host", &services.web_host),
            ("services.update_service", &services.update_service),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(field, "service name must not be empty"));
            }
        }

        if services.poll_interval_millis == 0 {
            return Err(invalid("services.poll_interval_millis", "must be greater than 0"));
        }

        if services.repair_timeout_seconds > services.start_timeout_seconds {
            return Err(invalid(
                "services.repair_timeout_seconds",
                "must not exceed services.start_timeout_seconds",
            ));
        }

        let maintenance = &config.maintenance;
        if maintenance.batch_size == 0 {
            return Err(invalid("maintenance.batch_size", "must be greater than 0"));
        }

        if !(0.0..=100.0).contains(&maintenance.fragmentation_threshold)
            || !(0.0..=100.0).contains(&maintenance.rebuild_threshold)
        {
            return Err(invalid(
                "maintenance.fragmentation_threshold",
                "thresholds must be percentages",
            ));
        }

        if maintenance.fragmentation_threshold > maintenance.rebuild_threshold {
            return Err(invalid(
                "maintenance.rebuild_threshold",
                "must be at least maintenance.fragmentation_threshold",
            ));
        }

        if maintenance.shrink_target_free_percent > 100 {
            return Err(invalid(
                "maintenance.shrink_target_free_percent",
                "must be a percentage",
            ));
        }

        for root in &config.transfer.allowed_roots {
            if !Path::new(root).is_absolute() {
                return Err(invalid(
                    "transfer.allowed_roots",
                    &format!("'{}' is not absolute", root.display()),
                ));
            }
        }

        if let Some(schedule) = &config.schedule.maintenance {
            validate_6_field_cron(schedule)
                .map_err(|e| invalid("schedule.maintenance", &e.to_string()))?;
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}
