//! Reader for the sendmail statistics file.
//!
//! The file is opened once and its layout detected from the first read. Each
//! refresh rewinds the same handle and re-reads exactly the detected record
//! size into a buffer reused across refreshes.

mod layout;

pub use layout::{ByteOrder, RecordLayout, STAT_MAGIC, StatGeometry, WordSize, detect_layout};

use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::collector::traits::{FileSystem, OpenError};
use crate::models::{StatLayout, StatisticsSnapshot};

/// Error type for statistics file access.
#[derive(Debug)]
pub enum StatError {
    /// File could not be opened.
    Open(OpenError),
    /// File content matches none of the known layouts.
    UnrecognizedFormat { path: PathBuf, bytes_read: usize },
    /// Seek or read failed.
    Read { path: PathBuf, source: io::Error },
    /// Fewer bytes than the detected layout needs.
    ShortRead {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

impl std::fmt::Display for StatError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatError::Open(e) => write!(f, "{}", e),
            StatError::UnrecognizedFormat { path, bytes_read } => write!(
                f,
                "could not guess version of statistics file {:?} ({} bytes)",
                path, bytes_read
            ),
            StatError::Read { path, source } => {
                write!(f, "could not read statistics file {:?}: {}", path, source)
            }
            StatError::ShortRead {
                path,
                expected,
                actual,
            } => write!(
                f,
                "short read from statistics file {:?}: expected {} bytes, got {}",
                path, expected, actual
            ),
        }
    }
}

impl std::error::Error for StatError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StatError::Open(e) => Some(e),
            StatError::Read { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Open statistics file with a detected layout.
pub struct StatFileReader<R> {
    path: PathBuf,
    file: R,
    geometry: StatGeometry,
    record: RecordLayout,
    buf: Vec<u8>,
}

impl<R: Read + Seek> StatFileReader<R> {
    /// Opens the statistics file and detects its layout.
    ///
    /// On `UnrecognizedFormat` the handle is dropped; the caller may retry by
    /// opening again.
    pub fn open<F>(fs: &F, path: impl Into<PathBuf>, geometry: StatGeometry) -> Result<Self, StatError>
    where
        F: FileSystem<File = R>,
    {
        let path = path.into();
        let mut file = fs
            .open(&path)
            .map_err(|e| StatError::Open(OpenError::file(&path, e)))?;

        let mut buf = vec![0u8; geometry.buffer_len()];
        let bytes_read = read_full(&mut file, &mut buf).map_err(|source| StatError::Read {
            path: path.clone(),
            source,
        })?;

        let Some(layout) = detect_layout(&buf[..bytes_read], geometry) else {
            warn!(
                "could not guess version of statistics file {:?} ({} bytes read)",
                path, bytes_read
            );
            return Err(StatError::UnrecognizedFormat { path, bytes_read });
        };

        debug!(
            "statistics file {:?} looks like it was created by {}",
            path,
            layout.describe()
        );

        Ok(Self {
            path,
            file,
            geometry,
            record: RecordLayout::new(layout, geometry),
            buf,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Layout detected at open time.
    pub fn layout(&self) -> StatLayout {
        self.record.layout
    }

    pub fn geometry(&self) -> StatGeometry {
        self.geometry
    }

    /// Re-reads the record from the start of the file.
    ///
    /// Reads exactly the detected layout's size; anything less is an error and
    /// no snapshot is produced.
    pub fn refresh(&mut self, captured_at: Option<i64>) -> Result<StatisticsSnapshot, StatError> {
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|source| StatError::Read {
                path: self.path.clone(),
                source,
            })?;

        let expected = self.record.size;
        let record_buf = &mut self.buf[..expected];
        let actual = read_full(&mut self.file, record_buf).map_err(|source| StatError::Read {
            path: self.path.clone(),
            source,
        })?;

        let short_read = || StatError::ShortRead {
            path: self.path.clone(),
            expected,
            actual,
        };
        if actual != expected {
            return Err(short_read());
        }

        self.record
            .decode(&self.buf[..expected], self.geometry, captured_at)
            .ok_or_else(short_read)
    }
}

/// Reads until `buf` is full or EOF, retrying on `Interrupted`.
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockFs, encode_stat_record};
    use crate::collector::traits::RealFs;

    const STATS: &str = "/etc/mail/statistics";

    fn geometry() -> StatGeometry {
        StatGeometry::new(WordSize::Eight, ByteOrder::Little)
    }

    fn snapshot(layout: StatLayout) -> StatisticsSnapshot {
        let mut snap = StatisticsSnapshot::empty(layout);
        snap.received_messages[0] = 11;
        snap.transmitted_messages[4] = 7;
        snap
    }

    #[test]
    fn test_open_detects_every_layout() {
        for layout in StatLayout::ALL {
            let mut fs = MockFs::new();
            fs.add_file(STATS, encode_stat_record(&snapshot(layout), geometry()));
            let reader = StatFileReader::open(&fs, STATS, geometry()).unwrap();
            assert_eq!(reader.layout(), layout);
        }
    }

    #[test]
    fn test_open_missing_file() {
        let fs = MockFs::new();
        let err = StatFileReader::open(&fs, STATS, geometry()).err().unwrap();
        assert!(matches!(err, StatError::Open(_)));
    }

    #[test]
    fn test_open_unrecognized() {
        let mut fs = MockFs::new();
        fs.add_file(STATS, vec![0u8; 100]);
        let err = StatFileReader::open(&fs, STATS, geometry()).err().unwrap();
        assert!(matches!(
            err,
            StatError::UnrecognizedFormat {
                bytes_read: 100,
                ..
            }
        ));
    }

    #[test]
    fn test_open_rejects_oversized_file() {
        let mut bytes = encode_stat_record(&snapshot(StatLayout::Sendmail810), geometry());
        bytes.extend_from_slice(&[0u8; 64]);
        let mut fs = MockFs::new();
        fs.add_file(STATS, bytes);
        let err = StatFileReader::open(&fs, STATS, geometry()).err().unwrap();
        assert!(matches!(err, StatError::UnrecognizedFormat { .. }));
    }

    #[test]
    fn test_refresh_sees_rewritten_file() {
        let mut fs = MockFs::new();
        fs.add_file(STATS, encode_stat_record(&snapshot(StatLayout::Sendmail810), geometry()));
        let mut reader = StatFileReader::open(&fs, STATS, geometry()).unwrap();

        let first = reader.refresh(Some(100)).unwrap();
        assert_eq!(first.received_messages[0], 11);
        assert_eq!(first.captured_at, Some(100));

        let mut updated = snapshot(StatLayout::Sendmail810);
        updated.received_messages[0] = 12;
        fs.add_file(STATS, encode_stat_record(&updated, geometry()));

        let second = reader.refresh(Some(110)).unwrap();
        assert_eq!(second.received_messages[0], 12);
        assert_eq!(second.layout, StatLayout::Sendmail810);
    }

    #[test]
    fn test_refresh_short_read() {
        let mut fs = MockFs::new();
        fs.add_file(STATS, encode_stat_record(&snapshot(StatLayout::Sendmail89), geometry()));
        let mut reader = StatFileReader::open(&fs, STATS, geometry()).unwrap();

        fs.add_file(STATS, vec![0u8; 16]);
        let err = reader.refresh(None).unwrap_err();
        assert!(matches!(
            err,
            StatError::ShortRead {
                actual: 16,
                ..
            }
        ));
    }

    #[test]
    fn test_refresh_after_removal_fails() {
        let mut fs = MockFs::new();
        fs.add_file(STATS, encode_stat_record(&snapshot(StatLayout::Sendmail88), geometry()));
        let mut reader = StatFileReader::open(&fs, STATS, geometry()).unwrap();
        fs.remove(STATS);
        assert!(reader.refresh(None).is_err());
    }

    #[test]
    fn test_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sendmail.st");
        let geometry = StatGeometry::default();
        std::fs::write(
            &path,
            encode_stat_record(&snapshot(StatLayout::Sendmail810), geometry),
        )
        .unwrap();

        let mut reader = StatFileReader::open(&RealFs::new(), &path, geometry).unwrap();
        assert_eq!(reader.path(), path.as_path());
        let snap = reader.refresh(None).unwrap();
        assert_eq!(snap.transmitted_messages[4], 7);
    }
}
