//! Database record types.

use serde::{Deserialize, Serialize};

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Physical ordering of one index as seen by the fragmentation scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFragmentation {
    pub table_name: String,
    pub index_name: String,
    pub page_count: u64,
    pub fragmentation_percent: f64,
}

/// Allocated, used and free bytes of the database file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceUsage {
    pub allocated_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl SpaceUsage {
    pub fn from_pages(page_count: u64, freelist_count: u64, page_size: u64) -> Self {
        let allocated_bytes = page_count * page_size;
        let free_bytes = freelist_count.min(page_count) * page_size;
        Self {
            allocated_bytes,
            used_bytes: allocated_bytes - free_bytes,
            free_bytes,
        }
    }

    pub fn allocated_gb(&self) -> f64 {
        self.allocated_bytes as f64 / BYTES_PER_GB
    }

    pub fn free_percent(&self) -> f64 {
        if self.allocated_bytes == 0 {
            0.0
        } else {
            self.free_bytes as f64 * 100.0 / self.allocated_bytes as f64
        }
    }
}

/// Unused share of an index's leaf pages, as a percentage.
///
/// Deletes and out-of-order inserts leave leaves partly empty; a rebuild
/// packs them again. An index on a single leaf is never fragmented.
pub fn leaf_free_percent(leaf_pages: u64, unused_bytes: u64, leaf_bytes: u64) -> f64 {
    if leaf_pages < 2 || leaf_bytes == 0 {
        return 0.0;
    }
    unused_bytes.min(leaf_bytes) as f64 * 100.0 / leaf_bytes as f64
}

/// Number of free pages to release so that `target_free_percent` of the
/// truncated file stays free. Zero when already at or below the target.
pub fn pages_to_release(page_count: u64, freelist_count: u64, target_free_percent: u8) -> u64 {
    let target = u64::from(target_free_percent.min(100));
    if target == 100 {
        return 0;
    }
    let freelist_count = freelist_count.min(page_count);

    // (free - r) / (pages - r) = target / 100, solved for r and rounded down
    // so the remaining headroom never drops below the target
    let excess = (freelist_count * 100).saturating_sub(target * page_count);
    (excess / (100 - target)).min(freelist_count)
}
