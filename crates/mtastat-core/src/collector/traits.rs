//! Abstractions for filesystem access to enable testing and mocking.
//!
//! The `FileSystem` trait allows the collectors to work with both the real
//! sendmail files and mock implementations for testing without an MTA
//! installed.

use std::fs::File;
use std::io::{self, Read, Seek};
use std::path::{Path, PathBuf};

/// Abstraction for filesystem operations.
///
/// Collectors only ever read: open a file for sequential/seekable reading,
/// list a directory, and query a file's size.
pub trait FileSystem: Send + Sync {
    /// Handle returned by [`FileSystem::open`].
    type File: Read + Seek;

    /// Opens a file for reading.
    fn open(&self, path: &Path) -> io::Result<Self::File>;

    /// Lists entries in a directory.
    ///
    /// # Returns
    /// Full paths of the directory's entries (`dir.join(name)`), in no
    /// particular order.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Returns the size in bytes of the file at `path`.
    fn file_len(&self, path: &Path) -> io::Result<u64>;

    /// Checks if a path is an existing directory.
    fn is_dir(&self, path: &Path) -> bool;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    /// Creates a new `RealFs` instance.
    pub fn new() -> Self {
        Self
    }
}

impl FileSystem for RealFs {
    type File = File;

    fn open(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(path)?;
        let mut paths = Vec::new();
        for entry in entries {
            paths.push(entry?.path());
        }
        Ok(paths)
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        std::fs::metadata(path).map(|m| m.len())
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

/// What kind of object an [`OpenError`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenTarget {
    File,
    Directory,
}

/// A file or directory could not be opened.
#[derive(Debug)]
pub struct OpenError {
    pub path: PathBuf,
    pub target: OpenTarget,
    pub source: io::Error,
}

impl OpenError {
    pub fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            target: OpenTarget::File,
            source,
        }
    }

    pub fn directory(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            target: OpenTarget::Directory,
            source,
        }
    }
}

impl std::fmt::Display for OpenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.target {
            OpenTarget::File => write!(f, "could not open file {:?}", self.path),
            OpenTarget::Directory => write!(f, "could not open directory {:?}", self.path),
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
