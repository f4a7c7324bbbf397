//! Central repository for defaults, timeouts and limits
//!
//! This module organizes constants by category so every threshold the engine
//! uses has a single source of truth. Configuration values default to these.

use std::time::Duration;

/// Service control timings
pub mod services {
    use super::Duration;

    /// Default wait for a service to reach `Running` on an explicit start
    pub const START_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default wait for a service to reach `Stopped`
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(60);

    /// Start timeout used by auto-repair (fast-fail for interactive feedback)
    pub const REPAIR_START_TIMEOUT: Duration = Duration::from_secs(20);

    /// Interval between state queries while waiting for a transition
    pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

    /// Pause between stop and start during a restart
    pub const RESTART_SETTLE: Duration = Duration::from_secs(5);
}

/// Database maintenance defaults
pub mod maintenance {
    /// Rows deleted per superseded-record batch
    pub const BATCH_SIZE: u32 = 10_000;

    /// Pause between delete batches in milliseconds
    pub const BATCH_PAUSE_MILLIS: u64 = 1_000;

    /// Report a running total every N batches
    pub const PROGRESS_EVERY_BATCHES: u32 = 10;

    /// Fragmentation percentage at which an index is reorganized
    pub const FRAGMENTATION_THRESHOLD: f64 = 10.0;

    /// Fragmentation percentage above which an index is rebuilt
    pub const REBUILD_THRESHOLD: f64 = 30.0;

    /// Free space headroom kept after a shrink
    pub const SHRINK_TARGET_FREE_PERCENT: u8 = 10;
}

/// Database connection defaults
pub mod database {
    /// Timeout for read-only dashboard queries (seconds)
    pub const QUERY_TIMEOUT_SECONDS: u64 = 30;

    /// Maximum pooled connections
    pub const MAX_CONNECTIONS: u32 = 4;

    /// Busy timeout for normal statements (milliseconds)
    pub const BUSY_TIMEOUT_MILLIS: u64 = 5_000;

    /// Busy timeout applied to low-priority statements (shrink, rebuild)
    pub const LOW_PRIORITY_BUSY_MILLIS: u64 = 250;

    /// Name under which the database appears in health verdicts
    pub const RESOURCE_NAME: &str = "database";
}

/// Health check defaults
pub mod health {
    /// Dashboard refresh interval
    pub const CHECK_INTERVAL_SECONDS: u64 = 30;

    /// Size at which the database is reported as degraded (embedded edition caps at 10 GB)
    pub const DATABASE_SIZE_WARNING_GB: f64 = 9.0;

    /// Timeout for the web host endpoint probe
    pub const ENDPOINT_TIMEOUT_SECONDS: u64 = 5;
}

/// Transfer layout and defaults
pub mod transfer {
    /// Content tree directory inside an export destination
    pub const CONTENT_DIR: &str = "content";

    /// Database backup file inside an export destination
    pub const DATABASE_BACKUP_FILE: &str = "database.bak";

    /// Manifest written last by a successful export
    pub const MANIFEST_FILE: &str = "transfer-manifest.json";

    /// Default age window for differential exports
    pub const DEFAULT_MAX_AGE_DAYS: u32 = 30;

    /// Characters never accepted in transfer paths
    pub const FORBIDDEN_PATH_CHARS: &[char] = &[
        '&', '|', ';', '$', '>', '<', '`', '!', '*', '?', '(', ')', '{', '}', '[', ']', '\'',
        '"', '\n', '\r', '%',
    ];
}

/// Cleanup constants
pub mod cleanup {
    /// Hours after which a stuck tracked operation is dropped
    pub const OPERATION_CLEANUP_HOURS: i64 = 24;

    /// Cleanup interval in seconds
    pub const CLEANUP_INTERVAL_SECONDS: u64 = 3600;
}
