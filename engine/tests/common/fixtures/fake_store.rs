//! Scriptable maintenance store that counts mutating calls

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;
use update_keeper::database::{IndexFragmentation, MaintenanceStore, SpaceUsage};

const GB: u64 = 1024 * 1024 * 1024;

pub struct FakeStore {
    declined_remaining: Mutex<u64>,
    superseded_remaining: Mutex<u64>,
    indexes: Vec<IndexFragmentation>,
    failing_indexes: HashSet<String>,
    mutating_calls: Mutex<Vec<String>>,
    allocated_bytes: u64,
    pub probe_fails: bool,
    pub declined_fails: bool,
    pub shrink_fails: bool,
    pub batch_delay: Option<Duration>,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self {
            declined_remaining: Mutex::new(0),
            superseded_remaining: Mutex::new(0),
            indexes: Vec::new(),
            failing_indexes: HashSet::new(),
            mutating_calls: Mutex::new(Vec::new()),
            allocated_bytes: GB,
            probe_fails: false,
            declined_fails: false,
            shrink_fails: false,
            batch_delay: None,
        }
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_declined(self, rows: u64) -> Self {
        *self.declined_remaining.lock().unwrap() = rows;
        self
    }

    pub fn with_superseded(self, rows: u64) -> Self {
        *self.superseded_remaining.lock().unwrap() = rows;
        self
    }

    pub fn with_index(mut self, name: &str, page_count: u64, fragmentation_percent: f64) -> Self {
        self.indexes.push(IndexFragmentation {
            table_name: "tbRevisionSupersedesUpdate".to_string(),
            index_name: name.to_string(),
            page_count,
            fragmentation_percent,
        });
        self
    }

    pub fn failing_index(mut self, name: &str) -> Self {
        self.failing_indexes.insert(name.to_string());
        self
    }

    pub fn with_size_gb(mut self, size_gb: f64) -> Self {
        self.allocated_bytes = (size_gb * GB as f64) as u64;
        self
    }

    pub fn mutating_calls(&self) -> Vec<String> {
        self.mutating_calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.mutating_calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MaintenanceStore for FakeStore {
    fn descriptor(&self) -> String {
        "fake.db".to_string()
    }

    async fn probe(&self) -> Result<()> {
        if self.probe_fails {
            Err(anyhow!("unable to open database file"))
        } else {
            Ok(())
        }
    }

    async fn delete_declined_supersessions(&self) -> Result<u64> {
        self.record("delete_declined".to_string());
        if self.declined_fails {
            return Err(anyhow!("no such table: tbUpdate"));
        }
        let mut remaining = self.declined_remaining.lock().unwrap();
        let removed = *remaining;
        *remaining = 0;
        Ok(removed)
    }

    async fn delete_superseded_batch(&self, batch_size: u32) -> Result<u64> {
        self.record(format!("delete_superseded_batch:{}", batch_size));
        if let Some(delay) = self.batch_delay {
            tokio::time::sleep(delay).await;
        }
        let mut remaining = self.superseded_remaining.lock().unwrap();
        let removed = (*remaining).min(u64::from(batch_size));
        *remaining -= removed;
        Ok(removed)
    }

    async fn index_fragmentation(&self) -> Result<Vec<IndexFragmentation>> {
        Ok(self.indexes.clone())
    }

    async fn rebuild_index(&self, index: &IndexFragmentation) -> Result<()> {
        self.record(format!("rebuild:{}", index.index_name));
        if self.failing_indexes.contains(&index.index_name) {
            return Err(anyhow!("database is locked"));
        }
        Ok(())
    }

    async fn reorganize_index(&self, index: &IndexFragmentation) -> Result<()> {
        self.record(format!("reorganize:{}", index.index_name));
        if self.failing_indexes.contains(&index.index_name) {
            return Err(anyhow!("database is locked"));
        }
        Ok(())
    }

    async fn update_statistics(&self) -> Result<()> {
        self.record("update_statistics".to_string());
        Ok(())
    }

    async fn shrink(&self, target_free_percent: u8) -> Result<u64> {
        self.record(format!("shrink:{}", target_free_percent));
        if self.shrink_fails {
            Err(anyhow!("database is locked"))
        } else {
            Ok(0)
        }
    }

    async fn space_usage(&self) -> Result<SpaceUsage> {
        if self.probe_fails {
            return Err(anyhow!("unable to open database file"));
        }
        Ok(SpaceUsage {
            allocated_bytes: self.allocated_bytes,
            used_bytes: self.allocated_bytes / 2,
            free_bytes: self.allocated_bytes - self.allocated_bytes / 2,
        })
    }
}
