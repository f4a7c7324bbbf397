//! Temporary content trees for transfer tests

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

pub struct ContentTree {
    dir: TempDir,
}

impl ContentTree {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    /// Typical update content: two cab files and a metadata file
    pub fn with_update_files() -> Self {
        Self::new()
            .with_file("ab/0123.cab", b"first package")
            .with_file("cd/4567.cab", b"second package body")
            .with_file("metadata/catalog.xml", b"<catalog/>")
    }

    pub fn with_file(self, relative: &str, contents: &[u8]) -> Self {
        let path = self.dir.path().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create content dir");
        }
        fs::write(&path, contents).expect("Failed to write content file");
        self
    }

    /// Push a file's modification time `days` into the past
    pub fn age_file(self, relative: &str, days: u64) -> Self {
        let file = fs::File::options()
            .write(true)
            .open(self.dir.path().join(relative))
            .expect("Failed to open content file");
        let modified = SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60);
        file.set_modified(modified).expect("Failed to set mtime");
        self
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn join(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }
}

impl Default for ContentTree {
    fn default() -> Self {
        Self::new()
    }
}
