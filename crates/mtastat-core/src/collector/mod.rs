//! Collectors for sendmail's statistics file, configuration and mail queue.
//!
//! This module reads everything the MTA tables are built from, with support
//! for mocking so the whole pipeline runs without sendmail installed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RefreshCache                         │
//! │  ┌─────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  StatFileReader     │   │     QueueScanner            │  │
//! │  │  - layout detection │   │  - df* data files           │  │
//! │  │  - stats TTL        │   │  - queue TTL                │  │
//! │  └──────────┬──────────┘   └──────────────┬──────────────┘  │
//! │             └──────────────┬──────────────┘                 │
//! │                            │      ┌──────────────────┐      │
//! │                     ┌──────▼────┐ │ read_sendmail_cf │      │
//! │                     │ FileSystem│◄┤ (channels, paths)│      │
//! │                     └──────┬────┘ └──────────────────┘      │
//! └────────────────────────────┼────────────────────────────────┘
//!                              │
//!              ┌───────────────┼───────────────┐
//!              │               │               │
//!       ┌──────▼──────┐ ┌──────▼──────┐ ┌──────▼──────┐
//!       │   RealFs    │ │   MockFs    │ │  Scenarios  │
//!       │ (std::fs)   │ │ (Testing)   │ │ (Fixtures)  │
//!       └─────────────┘ └─────────────┘ └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use mtastat_core::collector::{MockFs, RefreshCache, StatFileReader, SystemClock};
//! use mtastat_core::collector::mock::STATISTICS;
//! use mtastat_core::collector::statfile::StatGeometry;
//!
//! let fs = MockFs::typical_sendmail();
//! let mut cache = RefreshCache::<MockFs>::new(SystemClock);
//! cache.set_stats(StatFileReader::open(&fs, STATISTICS, StatGeometry::default()).ok());
//! let stats = cache.get_stats(5).unwrap();
//! assert_eq!(stats.received_messages[4], 100);
//! ```

pub mod cache;
pub mod mock;
pub mod queue;
pub mod sendmail_cf;
pub mod statfile;
pub mod traits;

pub use cache::{CacheError, Clock, RefreshCache, SystemClock, refresh_due};
pub use mock::{ManualClock, MockFs};
pub use queue::{QueueScanner, ScanError};
pub use sendmail_cf::{ConfigWarning, ParsedConfig, parse_sendmail_cf, read_sendmail_cf};
pub use statfile::{StatError, StatFileReader};
pub use traits::{FileSystem, OpenError, RealFs};
