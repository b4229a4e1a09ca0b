//! Columns of the two tables and how their values are computed.

use serde::Serialize;

use crate::models::{ChannelList, QueueSnapshot, StatisticsSnapshot, sum32};

/// Typed value of one table cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldValue {
    /// Monotonic 32-bit counter; wraps.
    Counter(u32),
    /// 32-bit gauge.
    Gauge(u32),
    OctetString(String),
    /// Value that is never known. Transports encode it as -1.
    Unknown,
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Counter(v) | FieldValue::Gauge(v) => write!(f, "{}", v),
            FieldValue::OctetString(s) => write!(f, "\"{}\"", s),
            FieldValue::Unknown => write!(f, "-1"),
        }
    }
}

/// Which cached source a column is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Statistics,
    Queue,
}

/// Columns of the summary table, numbered by their MIB sub-id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SummaryColumn {
    ReceivedMessages = 1,
    StoredMessages = 2,
    TransmittedMessages = 3,
    ReceivedVolume = 4,
    StoredVolume = 5,
    TransmittedVolume = 6,
}

impl SummaryColumn {
    pub const ALL: [SummaryColumn; 6] = [
        SummaryColumn::ReceivedMessages,
        SummaryColumn::StoredMessages,
        SummaryColumn::TransmittedMessages,
        SummaryColumn::ReceivedVolume,
        SummaryColumn::StoredVolume,
        SummaryColumn::TransmittedVolume,
    ];

    pub fn sub_id(&self) -> u32 {
        *self as u32
    }

    pub fn from_sub_id(sub_id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.sub_id() == sub_id)
    }

    pub fn name(&self) -> &'static str {
        match self {
            SummaryColumn::ReceivedMessages => "mtaReceivedMessages",
            SummaryColumn::StoredMessages => "mtaStoredMessages",
            SummaryColumn::TransmittedMessages => "mtaTransmittedMessages",
            SummaryColumn::ReceivedVolume => "mtaReceivedVolume",
            SummaryColumn::StoredVolume => "mtaStoredVolume",
            SummaryColumn::TransmittedVolume => "mtaTransmittedVolume",
        }
    }

    pub fn source(&self) -> DataSource {
        match self {
            SummaryColumn::StoredMessages | SummaryColumn::StoredVolume => DataSource::Queue,
            _ => DataSource::Statistics,
        }
    }
}

/// Columns of the mailer table, numbered by their MIB sub-id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChannelColumn {
    ReceivedMessages = 2,
    RejectedMessages = 3,
    TransmittedMessages = 5,
    ReceivedVolume = 6,
    TransmittedVolume = 8,
    Name = 25,
    Hierarchy = 31,
}

impl ChannelColumn {
    pub const ALL: [ChannelColumn; 7] = [
        ChannelColumn::ReceivedMessages,
        ChannelColumn::RejectedMessages,
        ChannelColumn::TransmittedMessages,
        ChannelColumn::ReceivedVolume,
        ChannelColumn::TransmittedVolume,
        ChannelColumn::Name,
        ChannelColumn::Hierarchy,
    ];

    pub fn sub_id(&self) -> u32 {
        *self as u32
    }

    pub fn from_sub_id(sub_id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.sub_id() == sub_id)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChannelColumn::ReceivedMessages => "mtaGroupReceivedMessages",
            ChannelColumn::RejectedMessages => "mtaGroupRejectedMessages",
            ChannelColumn::TransmittedMessages => "mtaGroupTransmittedMessages",
            ChannelColumn::ReceivedVolume => "mtaGroupReceivedVolume",
            ChannelColumn::TransmittedVolume => "mtaGroupTransmittedVolume",
            ChannelColumn::Name => "mtaGroupName",
            ChannelColumn::Hierarchy => "mtaGroupHierarchy",
        }
    }

    /// `None` for columns that need no cached data.
    pub fn source(&self) -> Option<DataSource> {
        match self {
            ChannelColumn::Name | ChannelColumn::Hierarchy => None,
            _ => Some(DataSource::Statistics),
        }
    }
}

/// A column of either table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum Column {
    Summary(SummaryColumn),
    Channel(ChannelColumn),
}

impl Column {
    pub fn sub_id(&self) -> u32 {
        match self {
            Column::Summary(c) => c.sub_id(),
            Column::Channel(c) => c.sub_id(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Column::Summary(c) => c.name(),
            Column::Channel(c) => c.name(),
        }
    }
}

/// One column value of a row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub column: Column,
    pub value: FieldValue,
}

/// A resolved row with every column that has a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub key: super::RowKey,
    pub fields: Vec<Field>,
}

impl Row {
    /// Value of the column with the given sub-id, if present.
    pub fn get(&self, sub_id: u32) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|f| f.column.sub_id() == sub_id)
            .map(|f| &f.value)
    }
}

/// Computes a summary column.
///
/// `None` when the source the column needs is not supplied.
pub fn summary_value(
    column: SummaryColumn,
    stats: Option<&StatisticsSnapshot>,
    queue: Option<&QueueSnapshot>,
) -> Option<FieldValue> {
    let value = match column {
        SummaryColumn::ReceivedMessages => FieldValue::Counter(sum32(&stats?.received_messages)),
        SummaryColumn::TransmittedMessages => {
            FieldValue::Counter(sum32(&stats?.transmitted_messages))
        }
        SummaryColumn::ReceivedVolume => FieldValue::Counter(sum32(&stats?.received_volume)),
        SummaryColumn::TransmittedVolume => FieldValue::Counter(sum32(&stats?.transmitted_volume)),
        SummaryColumn::StoredMessages => FieldValue::Gauge(gauge32(queue?.message_count)),
        SummaryColumn::StoredVolume => FieldValue::Gauge(gauge32(queue?.size_kb)),
    };
    Some(value)
}

/// Gauges stick at their maximum instead of wrapping.
fn gauge32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Computes a mailer column for the 1-based `ordinal`.
///
/// Counter columns read slot `ordinal - 1` and need `stats`. An empty name
/// and a missing reject array both yield `None`.
pub fn channel_value(
    column: ChannelColumn,
    ordinal: u32,
    channels: &ChannelList,
    stats: Option<&StatisticsSnapshot>,
) -> Option<FieldValue> {
    let slot = (ordinal as usize).checked_sub(1)?;
    let counter = |v: i64| FieldValue::Counter(v as u32);

    match column {
        ChannelColumn::ReceivedMessages => stats?.received_messages.get(slot).map(|v| counter(*v)),
        ChannelColumn::RejectedMessages => stats?.rejected_for(slot).map(counter),
        ChannelColumn::TransmittedMessages => {
            stats?.transmitted_messages.get(slot).map(|v| counter(*v))
        }
        ChannelColumn::ReceivedVolume => stats?.received_volume.get(slot).map(|v| counter(*v)),
        ChannelColumn::TransmittedVolume => {
            stats?.transmitted_volume.get(slot).map(|v| counter(*v))
        }
        ChannelColumn::Name => channels
            .name(ordinal)
            .filter(|name| !name.is_empty())
            .map(|name| FieldValue::OctetString(name.to_string())),
        ChannelColumn::Hierarchy => Some(FieldValue::Unknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::typical_stats;
    use crate::models::StatLayout;

    #[test]
    fn test_sub_ids_roundtrip() {
        for column in SummaryColumn::ALL {
            assert_eq!(SummaryColumn::from_sub_id(column.sub_id()), Some(column));
        }
        for column in ChannelColumn::ALL {
            assert_eq!(ChannelColumn::from_sub_id(column.sub_id()), Some(column));
        }
        assert_eq!(SummaryColumn::from_sub_id(7), None);
        assert_eq!(ChannelColumn::from_sub_id(4), None);
        assert_eq!(ChannelColumn::Name.sub_id(), 25);
        assert_eq!(ChannelColumn::Hierarchy.sub_id(), 31);
    }

    #[test]
    fn test_summary_sums_all_slots() {
        let stats = typical_stats();
        let queue = QueueSnapshot {
            message_count: 3,
            size_kb: 6,
            captured_at: None,
        };
        let value = |c| summary_value(c, Some(&stats), Some(&queue));
        assert_eq!(
            value(SummaryColumn::ReceivedMessages),
            Some(FieldValue::Counter(142))
        );
        assert_eq!(
            value(SummaryColumn::TransmittedMessages),
            Some(FieldValue::Counter(125))
        );
        assert_eq!(
            value(SummaryColumn::ReceivedVolume),
            Some(FieldValue::Counter(1150))
        );
        assert_eq!(
            value(SummaryColumn::TransmittedVolume),
            Some(FieldValue::Counter(1000))
        );
        assert_eq!(value(SummaryColumn::StoredMessages), Some(FieldValue::Gauge(3)));
        assert_eq!(value(SummaryColumn::StoredVolume), Some(FieldValue::Gauge(6)));
    }

    #[test]
    fn test_summary_missing_source() {
        let stats = typical_stats();
        assert_eq!(
            summary_value(SummaryColumn::StoredMessages, Some(&stats), None),
            None
        );
        assert_eq!(summary_value(SummaryColumn::ReceivedMessages, None, None), None);
    }

    #[test]
    fn test_channel_values() {
        let stats = typical_stats();
        let mut channels = ChannelList::with_builtins();
        channels.declare("local");
        channels.declare("smtp");
        channels.declare("");

        let value = |c, ordinal| channel_value(c, ordinal, &channels, Some(&stats));
        assert_eq!(
            value(ChannelColumn::ReceivedMessages, 5),
            Some(FieldValue::Counter(100))
        );
        assert_eq!(
            value(ChannelColumn::RejectedMessages, 5),
            Some(FieldValue::Counter(8))
        );
        assert_eq!(
            value(ChannelColumn::TransmittedVolume, 4),
            Some(FieldValue::Counter(880))
        );
        assert_eq!(
            value(ChannelColumn::Name, 4),
            Some(FieldValue::OctetString("local".to_string()))
        );
        assert_eq!(value(ChannelColumn::Name, 6), None);
        assert_eq!(value(ChannelColumn::Hierarchy, 1), Some(FieldValue::Unknown));
        assert_eq!(value(ChannelColumn::ReceivedMessages, 0), None);
    }

    #[test]
    fn test_rejected_absent_for_older_layouts() {
        let stats = StatisticsSnapshot::empty(StatLayout::Sendmail89);
        let channels = ChannelList::with_builtins();
        assert_eq!(
            channel_value(ChannelColumn::RejectedMessages, 1, &channels, Some(&stats)),
            None
        );
        assert_eq!(
            channel_value(ChannelColumn::ReceivedMessages, 1, &channels, Some(&stats)),
            Some(FieldValue::Counter(0))
        );
    }

    #[test]
    fn test_counter_truncates_to_32_bits() {
        let mut stats = typical_stats();
        stats.received_messages[0] = (1i64 << 32) + 5;
        let channels = ChannelList::with_builtins();
        assert_eq!(
            channel_value(ChannelColumn::ReceivedMessages, 1, &channels, Some(&stats)),
            Some(FieldValue::Counter(5))
        );
    }

    #[test]
    fn test_gauge_saturates_at_32_bits() {
        let queue = QueueSnapshot {
            message_count: (1u64 << 32) + 5,
            size_kb: u64::MAX,
            captured_at: None,
        };
        assert_eq!(
            summary_value(SummaryColumn::StoredMessages, None, Some(&queue)),
            Some(FieldValue::Gauge(u32::MAX))
        );
        assert_eq!(
            summary_value(SummaryColumn::StoredVolume, None, Some(&queue)),
            Some(FieldValue::Gauge(u32::MAX))
        );
    }
}
