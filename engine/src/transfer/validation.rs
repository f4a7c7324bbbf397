use std::path::{Component, Path, PathBuf};

use crate::constants::transfer::FORBIDDEN_PATH_CHARS;
use crate::errors::TransferError;

/// Check a transfer path before anything touches the filesystem.
///
/// The path must be absolute, free of `..` components and shell
/// metacharacters, and below one of `allowed_roots` (any absolute path when
/// the list is empty). Returns the path with `.` components, repeated
/// separators and trailing separators removed, so equal locations compare
/// equal.
pub fn validate_transfer_path(path: &Path, allowed_roots: &[PathBuf]) -> Result<PathBuf, TransferError> {
    let display = path.to_string_lossy();

    if let Some(character) = display.chars().find(|c| FORBIDDEN_PATH_CHARS.contains(c)) {
        return Err(TransferError::UnsafePath {
            path: display.to_string(),
            character,
        });
    }

    if !path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
        return Err(TransferError::NotAbsolute {
            path: display.to_string(),
        });
    }

    if !allowed_roots.is_empty() && !allowed_roots.iter().any(|root| path.starts_with(root)) {
        return Err(TransferError::OutsideAllowedRoots {
            path: display.to_string(),
        });
    }

    Ok(path.components().collect())
}
