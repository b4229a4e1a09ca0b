//! Snapshots of the sendmail statistics file and of the mail queue.
//!
//! Both are produced wholesale by a single read or scan and are never mutated
//! afterwards; the refresh cache swaps them out as a unit.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::channel::MAX_CHANNELS;

/// One counter per mailer slot, indexed by `ordinal - 1`.
pub type CounterArray = [i64; MAX_CHANNELS];

/// Known layouts of the sendmail statistics file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StatLayout {
    /// sendmail 8.8: no magic header, four counter arrays.
    Sendmail88,
    /// sendmail 8.9: magic header, version 2.
    Sendmail89,
    /// sendmail 8.10 and newer: magic header, version 3, connection counters
    /// and reject/discard arrays.
    Sendmail810,
}

impl StatLayout {
    /// All layouts, newest first (detection order).
    pub const ALL: [StatLayout; 3] = [
        StatLayout::Sendmail810,
        StatLayout::Sendmail89,
        StatLayout::Sendmail88,
    ];

    /// Value of the version field, for layouts that carry one.
    pub fn version(&self) -> Option<i32> {
        match self {
            Self::Sendmail88 => None,
            Self::Sendmail89 => Some(2),
            Self::Sendmail810 => Some(3),
        }
    }

    /// Whether reject and discard counters are reported for this layout.
    pub fn has_rejects(&self) -> bool {
        matches!(self, Self::Sendmail810)
    }

    /// Human-readable sendmail release family.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Sendmail88 => "sendmail V8.8.x",
            Self::Sendmail89 => "sendmail V8.9.x",
            Self::Sendmail810 => "sendmail V8.10.0 or newer",
        }
    }
}

/// Connection counters present only in the 8.10+ layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConnectionCounters {
    /// Connections received from other hosts.
    pub from: i64,
    /// Connections made to other hosts.
    pub to: i64,
    /// Connections rejected.
    pub rejected: i64,
}

/// Decoded contents of the statistics file at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticsSnapshot {
    pub layout: StatLayout,
    /// Unix time this snapshot was read; `None` if the clock was unavailable.
    pub captured_at: Option<i64>,
    /// File initialization time recorded by sendmail (`stat_itime`).
    pub init_time: i64,
    /// Messages received from each mailer.
    pub received_messages: CounterArray,
    /// Kilobytes received from each mailer.
    pub received_volume: CounterArray,
    /// Messages sent to each mailer.
    pub transmitted_messages: CounterArray,
    /// Kilobytes sent to each mailer.
    pub transmitted_volume: CounterArray,
    /// Messages rejected per mailer (8.10+ only).
    pub rejected_messages: Option<CounterArray>,
    /// Messages discarded per mailer (8.10+ only).
    pub discarded_messages: Option<CounterArray>,
    pub connections: Option<ConnectionCounters>,
}

impl StatisticsSnapshot {
    /// Creates an all-zero snapshot for the given layout.
    pub fn empty(layout: StatLayout) -> Self {
        let rejects = layout.has_rejects().then_some([0; MAX_CHANNELS]);
        Self {
            layout,
            captured_at: None,
            init_time: 0,
            received_messages: [0; MAX_CHANNELS],
            received_volume: [0; MAX_CHANNELS],
            transmitted_messages: [0; MAX_CHANNELS],
            transmitted_volume: [0; MAX_CHANNELS],
            rejected_messages: rejects,
            discarded_messages: rejects,
            connections: layout.has_rejects().then(ConnectionCounters::default),
        }
    }

    /// File initialization time as a UTC timestamp.
    pub fn init_time_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.init_time, 0)
    }

    /// Rejected plus discarded messages for one mailer slot.
    ///
    /// `None` when the layout does not carry those arrays or the slot is out
    /// of range.
    pub fn rejected_for(&self, slot: usize) -> Option<i64> {
        let rejected = self.rejected_messages.as_ref()?.get(slot)?;
        let discarded = self.discarded_messages.as_ref()?.get(slot)?;
        Some(rejected.wrapping_add(*discarded))
    }
}

/// Sums all slots of a counter array, wrapped to 32 bits.
pub(crate) fn sum32(values: &CounterArray) -> u32 {
    values.iter().fold(0i64, |acc, v| acc.wrapping_add(*v)) as u32
}

/// Size of one sendmail queue size unit in bytes.
pub const QUEUE_SIZE_UNIT: u64 = 1000;

/// Count and aggregate size of queued message data files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    /// Number of `df*` files in the queue directory.
    pub message_count: u64,
    /// Sum of file sizes, each rounded up to whole kilobytes (1000 bytes).
    pub size_kb: u64,
    /// Unix time of the scan; `None` if the clock was unavailable.
    pub captured_at: Option<i64>,
}

impl QueueSnapshot {
    /// Accounts for one data file of `bytes` length, rounding up the way
    /// sendmail computes its own statistics.
    pub fn add_file(&mut self, bytes: u64) {
        self.message_count += 1;
        self.size_kb += bytes.div_ceil(QUEUE_SIZE_UNIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_rounding() {
        let mut q = QueueSnapshot::default();
        q.add_file(500);
        q.add_file(1500);
        q.add_file(2600);
        assert_eq!(q.message_count, 3);
        assert_eq!(q.size_kb, 6);
    }

    #[test]
    fn test_queue_rounding_exact_and_empty_files() {
        let mut q = QueueSnapshot::default();
        q.add_file(0);
        q.add_file(1000);
        q.add_file(1001);
        assert_eq!(q.message_count, 3);
        assert_eq!(q.size_kb, 3);
    }

    #[test]
    fn test_rejected_for_requires_both_arrays() {
        let mut snap = StatisticsSnapshot::empty(StatLayout::Sendmail810);
        if let Some(r) = snap.rejected_messages.as_mut() {
            r[4] = 3;
        }
        if let Some(d) = snap.discarded_messages.as_mut() {
            d[4] = 2;
        }
        assert_eq!(snap.rejected_for(4), Some(5));
        assert_eq!(snap.rejected_for(MAX_CHANNELS), None);

        let old = StatisticsSnapshot::empty(StatLayout::Sendmail88);
        assert_eq!(old.rejected_for(0), None);
        assert!(old.connections.is_none());
    }

    #[test]
    fn test_sum32_wraps() {
        let mut values = [0i64; MAX_CHANNELS];
        values[0] = u32::MAX as i64;
        values[1] = 2;
        assert_eq!(sum32(&values), 1);
    }

    #[test]
    fn test_init_time_utc() {
        let mut snap = StatisticsSnapshot::empty(StatLayout::Sendmail89);
        snap.init_time = 1_700_000_000;
        let dt = snap.init_time_utc().unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
    }
}
