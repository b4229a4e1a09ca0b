//! TTL-gated caching of statistics and queue snapshots.
//!
//! A polling caller may ask for many fields of the same rows in a burst. Each
//! source is re-read only when its snapshot is older than the TTL; otherwise
//! the cached snapshot is served. The two sources age independently.

use tracing::{debug, error};

use crate::collector::queue::{QueueScanner, ScanError};
use crate::collector::statfile::{StatError, StatFileReader};
use crate::collector::traits::FileSystem;
use crate::models::{QueueSnapshot, StatisticsSnapshot};

/// Wall-clock source in whole Unix seconds.
pub trait Clock: Send + Sync {
    /// Current time, or `None` if the clock cannot be read.
    fn now(&self) -> Option<i64>;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Option<i64> {
        Some(chrono::Utc::now().timestamp())
    }
}

/// Returns true if a source last refreshed at `last` must be re-read at `now`.
///
/// A source is stale once strictly more than `ttl` seconds have passed. An
/// unknown current time always forces a refresh.
pub fn refresh_due(last: Option<i64>, now: Option<i64>, ttl: u64) -> bool {
    match (last, now) {
        (Some(last), Some(now)) => {
            now.saturating_sub(last) > i64::try_from(ttl).unwrap_or(i64::MAX)
        }
        _ => true,
    }
}

/// Error type for cached snapshot access.
#[derive(Debug)]
pub enum CacheError {
    /// No statistics file is open.
    StatsUnavailable,
    /// No queue directory is open.
    QueueUnavailable,
    /// Re-reading the statistics file failed.
    Stats(StatError),
    /// Re-scanning the queue failed.
    Queue(ScanError),
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::StatsUnavailable => write!(f, "statistics file not available"),
            CacheError::QueueUnavailable => write!(f, "queue directory not available"),
            CacheError::Stats(e) => write!(f, "{}", e),
            CacheError::Queue(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Stats(e) => Some(e),
            CacheError::Queue(e) => Some(e),
            _ => None,
        }
    }
}

/// Cached snapshot plus the time of the refresh that produced it.
#[derive(Debug)]
struct Cached<T> {
    value: Option<T>,
    refreshed_at: Option<i64>,
}

impl<T> Default for Cached<T> {
    fn default() -> Self {
        Self {
            value: None,
            refreshed_at: None,
        }
    }
}

impl<T> Cached<T> {
    /// Stores a successful refresh. The marker only moves when the time is known.
    fn store(&mut self, value: T, now: Option<i64>) {
        self.value = Some(value);
        if now.is_some() {
            self.refreshed_at = now;
        }
    }
}

/// Statistics and queue sources with their cached snapshots.
pub struct RefreshCache<F: FileSystem> {
    clock: Box<dyn Clock>,
    stats_source: Option<StatFileReader<F::File>>,
    stats: Cached<StatisticsSnapshot>,
    queue_source: Option<QueueScanner<F>>,
    queue: Cached<QueueSnapshot>,
}

impl<F: FileSystem + Clone> RefreshCache<F> {
    pub fn new(clock: impl Clock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            stats_source: None,
            stats: Cached::default(),
            queue_source: None,
            queue: Cached::default(),
        }
    }

    /// Replaces the statistics source. The cached snapshot is dropped.
    pub fn set_stats(&mut self, reader: Option<StatFileReader<F::File>>) {
        self.stats_source = reader;
        self.stats = Cached::default();
    }

    /// Replaces the queue source. The cached snapshot is dropped.
    pub fn set_queue(&mut self, scanner: Option<QueueScanner<F>>) {
        self.queue_source = scanner;
        self.queue = Cached::default();
    }

    pub fn stats_source(&self) -> Option<&StatFileReader<F::File>> {
        self.stats_source.as_ref()
    }

    pub fn queue_source(&self) -> Option<&QueueScanner<F>> {
        self.queue_source.as_ref()
    }

    /// Returns the statistics snapshot, re-reading the file if it is older
    /// than `ttl` seconds.
    ///
    /// On a failed re-read the previous snapshot is kept for later calls,
    /// but this call reports the failure.
    pub fn get_stats(&mut self, ttl: u64) -> Result<&StatisticsSnapshot, CacheError> {
        let reader = self
            .stats_source
            .as_mut()
            .ok_or(CacheError::StatsUnavailable)?;
        let now = self.clock.now();

        if refresh_due(self.stats.refreshed_at, now, ttl) {
            match reader.refresh(now) {
                Ok(snapshot) => {
                    debug!("statistics refreshed from {:?}", reader.path());
                    self.stats.store(snapshot, now);
                }
                Err(e) => {
                    error!("{}", e);
                    return Err(CacheError::Stats(e));
                }
            }
        }

        self.stats.value.as_ref().ok_or(CacheError::StatsUnavailable)
    }

    /// Returns the queue snapshot, re-scanning the directory if it is older
    /// than `ttl` seconds.
    pub fn get_queue(&mut self, ttl: u64) -> Result<&QueueSnapshot, CacheError> {
        let scanner = self
            .queue_source
            .as_ref()
            .ok_or(CacheError::QueueUnavailable)?;
        let now = self.clock.now();

        if refresh_due(self.queue.refreshed_at, now, ttl) {
            match scanner.scan(now) {
                Ok(snapshot) => self.queue.store(snapshot, now),
                Err(e) => {
                    error!("{}", e);
                    return Err(CacheError::Queue(e));
                }
            }
        }

        self.queue.value.as_ref().ok_or(CacheError::QueueUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{
        MAIL_QUEUE, ManualClock, MockFs, STATISTICS, encode_stat_record, typical_stats,
    };
    use crate::collector::statfile::StatGeometry;

    fn cache_with(fs: &MockFs, clock: &ManualClock) -> RefreshCache<MockFs> {
        let mut cache = RefreshCache::new(clock.clone());
        cache.set_stats(StatFileReader::open(fs, STATISTICS, StatGeometry::default()).ok());
        cache.set_queue(QueueScanner::open(fs, MAIL_QUEUE).ok());
        cache
    }

    #[test]
    fn test_refresh_due() {
        assert!(refresh_due(None, Some(100), 5));
        assert!(!refresh_due(Some(100), Some(100), 5));
        assert!(!refresh_due(Some(100), Some(105), 5));
        assert!(refresh_due(Some(100), Some(106), 5));
        assert!(refresh_due(Some(100), None, 5));
        assert!(!refresh_due(Some(100), Some(101), u64::MAX));
        assert!(!refresh_due(Some(i64::MIN), Some(i64::MAX), u64::MAX));
    }

    #[test]
    fn test_stats_read_once_within_ttl() {
        let fs = MockFs::typical_sendmail();
        let clock = ManualClock::at(1000);
        let mut cache = cache_with(&fs, &clock);
        // Open reads the file once for detection.
        assert_eq!(fs.read_count(STATISTICS), 1);

        cache.get_stats(5).unwrap();
        cache.get_stats(5).unwrap();
        assert_eq!(fs.read_count(STATISTICS), 2);

        clock.advance(5);
        cache.get_stats(5).unwrap();
        assert_eq!(fs.read_count(STATISTICS), 2);

        clock.advance(1);
        cache.get_stats(5).unwrap();
        assert_eq!(fs.read_count(STATISTICS), 3);
    }

    #[test]
    fn test_queue_scanned_once_within_ttl() {
        let fs = MockFs::typical_sendmail();
        let clock = ManualClock::at(1000);
        let mut cache = cache_with(&fs, &clock);
        let opened = fs.scan_count(MAIL_QUEUE);

        assert_eq!(cache.get_queue(10).unwrap().message_count, 3);
        cache.get_queue(10).unwrap();
        assert_eq!(fs.scan_count(MAIL_QUEUE), opened + 1);

        clock.advance(11);
        cache.get_queue(10).unwrap();
        assert_eq!(fs.scan_count(MAIL_QUEUE), opened + 2);
    }

    #[test]
    fn test_unavailable_clock_always_refreshes() {
        let fs = MockFs::typical_sendmail();
        let clock = ManualClock::unavailable();
        let mut cache = cache_with(&fs, &clock);

        cache.get_stats(5).unwrap();
        cache.get_stats(5).unwrap();
        assert_eq!(fs.read_count(STATISTICS), 3);
        assert_eq!(cache.get_stats(5).unwrap().captured_at, None);
    }

    #[test]
    fn test_failed_refresh_keeps_previous_snapshot() {
        let mut fs = MockFs::typical_sendmail();
        let clock = ManualClock::at(1000);
        let mut cache = cache_with(&fs, &clock);
        assert_eq!(cache.get_stats(5).unwrap().received_messages[4], 100);

        fs.add_file(STATISTICS, vec![0u8; 8]);
        clock.advance(6);
        assert!(matches!(
            cache.get_stats(5).unwrap_err(),
            CacheError::Stats(StatError::ShortRead { .. })
        ));

        // Marker was not moved: the next call retries the read.
        let mut updated = typical_stats();
        updated.received_messages[4] = 101;
        fs.add_file(
            STATISTICS,
            encode_stat_record(&updated, StatGeometry::default()),
        );
        assert_eq!(cache.get_stats(5).unwrap().received_messages[4], 101);
    }

    #[test]
    fn test_failed_scan_keeps_previous_queue_snapshot() {
        let mut fs = MockFs::typical_sendmail();
        let clock = ManualClock::at(1000);
        let mut cache = cache_with(&fs, &clock);
        assert_eq!(cache.get_queue(10).unwrap().message_count, 3);

        let data_file = format!("{}/dfq9ABC0002", MAIL_QUEUE);
        fs.fail_metadata(&data_file);
        clock.advance(11);
        assert!(matches!(
            cache.get_queue(10).unwrap_err(),
            CacheError::Queue(ScanError::Stat { .. })
        ));
        assert_eq!(cache.queue.value.map(|q| q.message_count), Some(3));
        assert_eq!(cache.queue.refreshed_at, Some(1000));

        // Marker was not moved: the next call rescans.
        fs.remove(&data_file);
        let scans = fs.scan_count(MAIL_QUEUE);
        let queue = cache.get_queue(10).unwrap();
        assert_eq!(queue.message_count, 2);
        assert_eq!(queue.size_kb, 4);
        assert_eq!(queue.captured_at, Some(1011));
        assert_eq!(fs.scan_count(MAIL_QUEUE), scans + 1);
    }

    #[test]
    fn test_failed_refresh_within_ttl_serves_cache() {
        let mut fs = MockFs::typical_sendmail();
        let clock = ManualClock::at(1000);
        let mut cache = cache_with(&fs, &clock);
        cache.get_stats(5).unwrap();

        fs.remove(STATISTICS);
        assert_eq!(cache.get_stats(5).unwrap().received_messages[4], 100);
        clock.advance(6);
        assert!(cache.get_stats(5).is_err());
    }

    #[test]
    fn test_missing_sources_are_unavailable() {
        let fs = MockFs::new();
        let clock = ManualClock::at(0);
        let mut cache = cache_with(&fs, &clock);
        assert!(matches!(
            cache.get_stats(5).unwrap_err(),
            CacheError::StatsUnavailable
        ));
        assert!(matches!(
            cache.get_queue(10).unwrap_err(),
            CacheError::QueueUnavailable
        ));
    }

    #[test]
    fn test_replacing_source_drops_snapshot() {
        let fs = MockFs::typical_sendmail();
        let clock = ManualClock::at(1000);
        let mut cache = cache_with(&fs, &clock);
        cache.get_queue(10).unwrap();

        cache.set_queue(None);
        assert!(cache.get_queue(10).is_err());
        assert!(cache.queue_source().is_none());
    }
}
