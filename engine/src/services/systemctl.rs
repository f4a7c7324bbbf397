// File: engine/src/services/systemctl.rs
use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command as AsyncCommand;
use tracing::{debug, info, warn};

use crate::errors::ServiceError;
use crate::resource::{ResourceState, ServiceControl};

/// Service control through `systemctl`.
#[derive(Debug, Clone)]
pub struct SystemctlControl {
    use_sudo: bool,
}

impl SystemctlControl {
    pub fn new(use_sudo: bool) -> Self {
        Self { use_sudo }
    }

    fn privileged(&self) -> AsyncCommand {
        if self.use_sudo {
            let mut command = AsyncCommand::new("sudo");
            command.arg("systemctl");
            command
        } else {
            AsyncCommand::new("systemctl")
        }
    }

    async fn run_privileged(&self, service_name: &str, args: &[&str]) -> Result<()> {
        let output = self
            .privileged()
            .args(args)
            .arg(service_name)
            .output()
            .await
            .map_err(|e| ServiceError::CommandFailed {
                service: service_name.to_string(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceError::CommandFailed {
                service: service_name.to_string(),
                reason: format!("systemctl {} failed: {}", args.join(" "), error.trim()),
            }
            .into());
        }

        Ok(())
    }

    async fn show(&self, service_name: &str, properties: &[&str]) -> Result<String> {
        let mut command = AsyncCommand::new("systemctl");
        command.arg("show").arg(service_name);
        for property in properties {
            command.arg(format!("--property={}", property));
        }

        let output = command.output().await.map_err(|e| ServiceError::CommandFailed {
            service: service_name.to_string(),
            reason: e.to_string(),
        })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ServiceError::CommandFailed {
                service: service_name.to_string(),
                reason: format!("systemctl show failed: {}", error.trim()),
            }
            .into());
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl ServiceControl for SystemctlControl {
    async fn query(&self, service_name: &str) -> Result<ResourceState> {
        debug!("Checking service status: {}", service_name);
        let output = self.show(service_name, &["LoadState", "ActiveState"]).await?;
        Ok(parse_show_output(&output))
    }

    async fn start(&self, service_name: &str) -> Result<()> {
        info!("Starting service: {}", service_name);
        self.run_privileged(service_name, &["start", "--no-block"]).await
    }

    async fn stop(&self, service_name: &str) -> Result<()> {
        info!("Stopping service: {}", service_name);
        self.run_privileged(service_name, &["stop", "--no-block"]).await
    }

    async fn can_stop(&self, service_name: &str) -> Result<bool> {
        let output = self.show(service_name, &["CanStop"]).await?;
        Ok(property(&output, "CanStop") != Some("no"))
    }

    async fn kill(&self, service_name: &str) -> Result<()> {
        warn!("Killing processes of service: {}", service_name);
        self.run_privileged(service_name, &["kill", "--signal=SIGKILL"])
            .await
    }
}

fn property<'a>(output: &'a str, key: &str) -> Option<&'a str> {
    output.lines().find_map(|line| {
        line.trim()
            .strip_prefix(key)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

/// Map `systemctl show --property=LoadState --property=ActiveState` output
/// onto a resource state.
pub fn parse_show_output(output: &str) -> ResourceState {
    if property(output, "LoadState") == Some("not-found") {
        return ResourceState::NotFound;
    }

    match property(output, "ActiveState") {
        Some("active") => ResourceState::Running,
        Some("inactive") | Some("failed") => ResourceState::Stopped,
        Some("activating") | Some("reloading") => ResourceState::StartPending,
        Some("deactivating") => ResourceState::StopPending,
        _ => ResourceState::Unknown,
    }
}
