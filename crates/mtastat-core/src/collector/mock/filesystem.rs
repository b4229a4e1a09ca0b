//! In-memory mock filesystem for testing collectors without sendmail.
//!
//! This module provides `MockFs` which simulates a filesystem in memory,
//! allowing tests to run without a statistics file, sendmail.cf or a queue
//! directory on disk. Clones share state, so a test can keep one handle and
//! rewrite files after passing another to a collector.

use crate::collector::traits::FileSystem;
use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct MockState {
    /// Map from path to file contents.
    files: HashMap<PathBuf, Vec<u8>>,
    /// Set of directories (for read_dir support).
    directories: HashSet<PathBuf>,
    /// Files whose size query fails.
    unreadable_metadata: HashSet<PathBuf>,
    /// Reads starting at offset 0, per file.
    reads: HashMap<PathBuf, usize>,
    /// `read_dir` calls, per directory.
    scans: HashMap<PathBuf, usize>,
}

/// In-memory filesystem for testing.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    state: Arc<Mutex<MockState>>,
}

impl MockFs {
    /// Creates a new empty mock filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds (or replaces) a file with the given content.
    ///
    /// Parent directories are automatically created.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state();
        add_parents(&mut state.directories, &path);
        state.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state();
        add_parents(&mut state.directories, &path);
        state.directories.insert(path);
    }

    /// Removes a file or directory (directories are removed with their content).
    pub fn remove(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.state();
        state.files.retain(|p, _| !p.starts_with(path));
        state.directories.retain(|p| !p.starts_with(path));
    }

    /// Makes size queries for `path` fail, as a stat() on a vanished file would.
    pub fn fail_metadata(&mut self, path: impl AsRef<Path>) {
        self.state()
            .unreadable_metadata
            .insert(path.as_ref().to_path_buf());
    }

    /// Number of reads that started at the beginning of `path`.
    pub fn read_count(&self, path: impl AsRef<Path>) -> usize {
        self.state().reads.get(path.as_ref()).copied().unwrap_or(0)
    }

    /// Number of times the directory `path` was listed.
    pub fn scan_count(&self, path: impl AsRef<Path>) -> usize {
        self.state().scans.get(path.as_ref()).copied().unwrap_or(0)
    }
}

fn add_parents(directories: &mut HashSet<PathBuf>, path: &Path) {
    let mut parent = path.parent();
    while let Some(p) = parent {
        if !p.as_os_str().is_empty() {
            directories.insert(p.to_path_buf());
        }
        parent = p.parent();
    }
}

fn not_found(what: &str, path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} not found: {:?}", what, path),
    )
}

/// Open handle on a mock file.
///
/// Reads see the file's current content, like a descriptor on a file that is
/// rewritten in place. Reads fail once the file is removed.
#[derive(Debug)]
pub struct MockFile {
    fs: MockFs,
    path: PathBuf,
    pos: u64,
}

impl Read for MockFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.fs.state();
        let len = {
            let content = state
                .files
                .get(&self.path)
                .ok_or_else(|| not_found("file", &self.path))?;
            let start = (self.pos as usize).min(content.len());
            let n = buf.len().min(content.len() - start);
            buf[..n].copy_from_slice(&content[start..start + n]);
            n
        };
        if self.pos == 0 && !buf.is_empty() {
            *state.reads.entry(self.path.clone()).or_insert(0) += 1;
        }
        self.pos += len as u64;
        Ok(len)
    }
}

impl Seek for MockFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = {
            let state = self.fs.state();
            state
                .files
                .get(&self.path)
                .map(|c| c.len() as i64)
                .ok_or_else(|| not_found("file", &self.path))?
        };
        let target = match pos {
            SeekFrom::Start(n) => n as i64,
            SeekFrom::End(delta) => len + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}

impl FileSystem for MockFs {
    type File = MockFile;

    fn open(&self, path: &Path) -> io::Result<MockFile> {
        if !self.state().files.contains_key(path) {
            return Err(not_found("file", path));
        }
        Ok(MockFile {
            fs: self.clone(),
            path: path.to_path_buf(),
            pos: 0,
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut state = self.state();
        if !state.directories.contains(path) {
            return Err(not_found("directory", path));
        }
        *state.scans.entry(path.to_path_buf()).or_insert(0) += 1;

        let mut entries = HashSet::new();

        // Find all files and directories that are direct children
        for file_path in state.files.keys() {
            if file_path.parent().is_some_and(|parent| parent == path) {
                entries.insert(file_path.clone());
            }
        }

        for dir_path in &state.directories {
            if dir_path.parent().is_some_and(|parent| parent == path) && dir_path != path {
                entries.insert(dir_path.clone());
            }
        }

        Ok(entries.into_iter().collect())
    }

    fn file_len(&self, path: &Path) -> io::Result<u64> {
        let state = self.state();
        if state.unreadable_metadata.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("cannot stat {:?}", path),
            ));
        }
        if let Some(content) = state.files.get(path) {
            return Ok(content.len() as u64);
        }
        if state.directories.contains(path) {
            return Ok(0);
        }
        Err(not_found("file", path))
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.state().directories.contains(path)
    }
}
