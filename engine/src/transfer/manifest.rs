//! Transfer manifest, serialized as `transfer-manifest.json` at the root of
//! an export destination.
//!
//! An export writes it as incomplete before copying and rewrites it as
//! complete as its last step, so an interrupted export can never be imported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::transfer::MANIFEST_FILE;
use crate::errors::TransferError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferDirection {
    Export,
    Import,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransferMode {
    Full,
    /// Only files modified within the last `max_age_days`
    Differential { max_age_days: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferManifest {
    pub direction: TransferDirection,
    pub source: PathBuf,
    pub destination: PathBuf,
    pub mode: TransferMode,
    pub complete: bool,
    pub files: u64,
    pub bytes: u64,
    pub database_included: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TransferManifest {
    pub fn new(direction: TransferDirection, source: &Path, destination: &Path, mode: TransferMode) -> Self {
        Self {
            direction,
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
            mode,
            complete: false,
            files: 0,
            bytes: 0,
            database_included: false,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn mark_complete(&mut self) {
        self.complete = true;
        self.completed_at = Some(Utc::now());
    }

    pub async fn write(&self, directory: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(directory.join(MANIFEST_FILE), content).await?;
        Ok(())
    }

    /// Load the manifest of an export, requiring it to be complete.
    pub async fn read_completed_export(directory: &Path) -> Result<Self, TransferError> {
        let path = directory.join(MANIFEST_FILE);
        let invalid = |reason: String| TransferError::ManifestInvalid {
            path: directory.display().to_string(),
            reason,
        };

        let content = tokio::fs::read(&path)
            .await
            .map_err(|e| invalid(format!("cannot read {}: {}", MANIFEST_FILE, e)))?;
        let manifest: TransferManifest =
            serde_json::from_slice(&content).map_err(|e| invalid(e.to_string()))?;

        if manifest.direction != TransferDirection::Export {
            return Err(invalid("not written by an export".to_string()));
        }
        if !manifest.complete {
            return Err(invalid("export did not complete".to_string()));
        }
        Ok(manifest)
    }
}
