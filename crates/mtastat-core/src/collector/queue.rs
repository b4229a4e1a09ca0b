//! Mail queue scanner.
//!
//! sendmail keeps each queued message as a control file (`qf*`) plus a data
//! file (`df*`). Only data files are counted; their sizes are rounded up to
//! the queue size unit the same way sendmail reports queue volume.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::collector::traits::{FileSystem, OpenError};
use crate::models::QueueSnapshot;

/// File name prefix of queued message data files.
pub const DATA_FILE_PREFIX: &[u8] = b"df";

/// Error type for queue scans.
#[derive(Debug)]
pub enum ScanError {
    /// Directory listing failed.
    ReadDir { dir: PathBuf, source: io::Error },
    /// Size of a data file could not be determined.
    Stat { entry: PathBuf, source: io::Error },
}

impl std::fmt::Display for ScanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanError::ReadDir { dir, source } => {
                write!(f, "could not list queue directory {:?}: {}", dir, source)
            }
            ScanError::Stat { entry, source } => {
                write!(f, "could not stat queue file {:?}: {}", entry, source)
            }
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::ReadDir { source, .. } | ScanError::Stat { source, .. } => Some(source),
        }
    }
}

/// Scanner bound to one queue directory.
#[derive(Debug, Clone)]
pub struct QueueScanner<F> {
    fs: F,
    dir: PathBuf,
}

impl<F: FileSystem + Clone> QueueScanner<F> {
    /// Binds the scanner to `dir`, verifying that the directory can be listed.
    pub fn open(fs: &F, dir: impl Into<PathBuf>) -> Result<Self, OpenError> {
        let dir = dir.into();
        fs.read_dir(&dir)
            .map_err(|e| OpenError::directory(&dir, e))?;
        debug!("queue directory {:?} opened", dir);
        Ok(Self {
            fs: fs.clone(),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Counts data files and their rounded sizes.
    ///
    /// Entries are addressed by their full path under the queue directory.
    /// Any data file whose size cannot be read aborts the whole scan.
    pub fn scan(&self, captured_at: Option<i64>) -> Result<QueueSnapshot, ScanError> {
        let entries = self
            .fs
            .read_dir(&self.dir)
            .map_err(|source| ScanError::ReadDir {
                dir: self.dir.clone(),
                source,
            })?;

        let mut snapshot = QueueSnapshot {
            captured_at,
            ..QueueSnapshot::default()
        };
        for entry in entries {
            if !is_data_file(&entry) {
                continue;
            }
            let bytes = self.fs.file_len(&entry).map_err(|source| {
                warn!("can't stat {:?}: {}", entry, source);
                ScanError::Stat {
                    entry: entry.clone(),
                    source,
                }
            })?;
            snapshot.add_file(bytes);
        }

        debug!(
            "queue {:?}: {} messages, {} kB",
            self.dir, snapshot.message_count, snapshot.size_kb
        );
        Ok(snapshot)
    }
}

fn is_data_file(entry: &Path) -> bool {
    entry
        .file_name()
        .is_some_and(|name| name.as_encoded_bytes().starts_with(DATA_FILE_PREFIX))
}
