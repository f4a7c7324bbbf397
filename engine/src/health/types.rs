//! Health verdict and repair outcome types

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::resource::ResourceState;

/// Overall level, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
}

impl fmt::Display for HealthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HealthLevel::Healthy => "Healthy",
            HealthLevel::Degraded => "Degraded",
            HealthLevel::Unhealthy => "Unhealthy",
        };
        f.write_str(label)
    }
}

/// Result of one health check. Built fresh every time; never cached.
#[derive(Debug, Clone, Serialize)]
pub struct HealthVerdict {
    pub level: HealthLevel,
    pub resources: BTreeMap<String, ResourceState>,
    pub issues: Vec<String>,
    pub database_size_gb: Option<f64>,
    pub checked_at: DateTime<Utc>,
}

impl HealthVerdict {
    pub(crate) fn new() -> Self {
        Self {
            level: HealthLevel::Healthy,
            resources: BTreeMap::new(),
            issues: Vec::new(),
            database_size_gb: None,
            checked_at: Utc::now(),
        }
    }

    /// Record an issue and lower the level to at most `level`. The level never
    /// improves within a check.
    pub(crate) fn record_issue(&mut self, level: HealthLevel, issue: String) {
        if level > self.level {
            self.level = level;
        }
        self.issues.push(issue);
    }

    pub fn is_healthy(&self) -> bool {
        self.level == HealthLevel::Healthy
    }

    pub fn status_message(&self) -> String {
        if self.issues.is_empty() {
            format!("{}: all {} resources running", self.level, self.resources.len())
        } else {
            format!("{}: {}", self.level, self.issues.join("; "))
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    pub attempted: Vec<String>,
    pub services_started: Vec<String>,
    pub success: bool,
}

impl RepairOutcome {
    pub fn status_message(&self) -> String {
        if self.attempted.is_empty() {
            "No repair needed: all services running".to_string()
        } else if self.success {
            format!("Started {}", self.services_started.join(", "))
        } else {
            let failed: Vec<&str> = self
                .attempted
                .iter()
                .filter(|name| !self.services_started.contains(name))
                .map(String::as_str)
                .collect();
            format!("Repair incomplete, could not start: {}", failed.join(", "))
        }
    }
}
