// File: engine/src/transfer/fs.rs
use anyhow::{anyhow, Result};
use glob::glob;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::TransferError;
use crate::progress::{emit, ProgressEvent, ProgressSink, ProgressStage};
use crate::services::commands::available_space;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// A regular file inside a content tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFile {
    pub relative: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

/// List every regular file below `root`. With `max_age_days`, only files
/// modified within that window are returned.
pub async fn collect_content(root: &Path, max_age_days: Option<u32>) -> Result<Vec<ContentFile>> {
    let root = root.to_path_buf();
    tokio::task::spawn_blocking(move || collect_content_blocking(&root, max_age_days))
        .await
        .map_err(|e| anyhow!("content scan task failed: {}", e))?
}

fn collect_content_blocking(root: &Path, max_age_days: Option<u32>) -> Result<Vec<ContentFile>> {
    let cutoff = max_age_days
        .map(|days| SystemTime::now() - Duration::from_secs(u64::from(days) * SECONDS_PER_DAY));

    let pattern = format!("{}/**/*", root.display());
    let entries = glob(&pattern).map_err(|e| anyhow!("glob pattern error: {}", e))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = match entry {
            Ok(path) => path,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        if let Some(cutoff) = cutoff {
            if metadata.modified()? < cutoff {
                continue;
            }
        }

        let relative = path.strip_prefix(root)?.to_path_buf();
        files.push(ContentFile {
            relative,
            size: metadata.len(),
        });
    }

    debug!("Collected {} files below {}", files.len(), root.display());
    Ok(files)
}

/// Copy `files` from `source_root` to `destination_root`, keeping relative
/// paths. Cancellation is checked before every file.
pub async fn copy_files(
    source_root: &Path,
    destination_root: &Path,
    files: &[ContentFile],
    cancel: &CancellationToken,
    progress: Option<&dyn ProgressSink>,
) -> Result<CopyStats> {
    let total = files.len() as u64;
    let mut stats = CopyStats::default();

    for file in files {
        if cancel.is_cancelled() {
            return Err(anyhow!(
                "copy cancelled after {} of {} files",
                stats.files,
                total
            ));
        }

        let target = destination_root.join(&file.relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = tokio::fs::copy(source_root.join(&file.relative), &target)
            .await
            .map_err(|e| anyhow!("copying {} failed: {}", file.relative.display(), e))?;

        stats.files += 1;
        stats.bytes += bytes;
        emit(
            progress,
            ProgressEvent::counted(
                ProgressStage::ContentCopy,
                file.relative.display().to_string(),
                stats.files,
                Some(total),
            ),
        );
    }

    info!(
        "Copied {} files ({} bytes) to {}",
        stats.files,
        stats.bytes,
        destination_root.display()
    );
    Ok(stats)
}

/// Fail when the destination filesystem is known to be too small. An
/// undeterminable free space is logged and accepted.
pub async fn ensure_capacity(destination: &Path, required: u64) -> Result<(), TransferError> {
    match available_space(destination).await {
        Ok(available) if available < required => Err(TransferError::InsufficientSpace {
            path: destination.display().to_string(),
            required,
            available,
        }),
        Ok(available) => {
            debug!(
                "{} bytes required, {} available at {}",
                required,
                available,
                destination.display()
            );
            Ok(())
        }
        Err(e) => {
            warn!(
                "Could not determine free space at {}, continuing: {}",
                destination.display(),
                e
            );
            Ok(())
        }
    }
}
