//! In-memory service control that records every command it receives

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use update_keeper::resource::{ResourceState, ServiceControl};

/// Fake platform. Unknown service names fail the query, which the
/// orchestrator reports as `NotFound`.
#[derive(Default)]
pub struct FakeServiceControl {
    states: Mutex<HashMap<String, ResourceState>>,
    calls: Mutex<Vec<String>>,
    failing_start: HashSet<String>,
    stuck: HashSet<String>,
    refusing_stop: HashSet<String>,
}

impl FakeServiceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(self, name: &str, state: ResourceState) -> Self {
        self.states.lock().unwrap().insert(name.to_string(), state);
        self
    }

    /// Start commands for `name` return an error
    pub fn failing_start(mut self, name: &str) -> Self {
        self.failing_start.insert(name.to_string());
        self
    }

    /// Commands for `name` are accepted but the state never changes
    pub fn stuck(mut self, name: &str) -> Self {
        self.stuck.insert(name.to_string());
        self
    }

    /// `name` reports CanStop=no
    pub fn refusing_stop(mut self, name: &str) -> Self {
        self.refusing_stop.insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn state(&self, name: &str) -> Option<ResourceState> {
        self.states.lock().unwrap().get(name).copied()
    }

    pub fn set_state(&self, name: &str, state: ResourceState) {
        self.states.lock().unwrap().insert(name.to_string(), state);
    }

    fn record(&self, call: &str, name: &str) {
        self.calls.lock().unwrap().push(format!("{}:{}", call, name));
    }

    fn transition(&self, name: &str, pending: ResourceState, target: ResourceState) {
        let state = if self.stuck.contains(name) { pending } else { target };
        self.set_state(name, state);
    }
}

#[async_trait]
impl ServiceControl for FakeServiceControl {
    async fn query(&self, service_name: &str) -> Result<ResourceState> {
        self.state(service_name)
            .ok_or_else(|| anyhow!("unit {} not found", service_name))
    }

    async fn start(&self, service_name: &str) -> Result<()> {
        self.record("start", service_name);
        if self.failing_start.contains(service_name) {
            return Err(anyhow!("permission denied"));
        }
        self.transition(service_name, ResourceState::StartPending, ResourceState::Running);
        Ok(())
    }

    async fn stop(&self, service_name: &str) -> Result<()> {
        self.record("stop", service_name);
        self.transition(service_name, ResourceState::StopPending, ResourceState::Stopped);
        Ok(())
    }

    async fn can_stop(&self, service_name: &str) -> Result<bool> {
        Ok(!self.refusing_stop.contains(service_name))
    }

    async fn kill(&self, service_name: &str) -> Result<()> {
        self.record("kill", service_name);
        self.set_state(service_name, ResourceState::Stopped);
        Ok(())
    }
}
