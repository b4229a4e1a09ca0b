//! Ordered-table lookup over the MTA summary and per-mailer tables.
//!
//! Rows are addressed by OID-style keys: `[index]` for the single summary
//! row and `[index, ordinal]` for mailer rows. A lookup either asks for the
//! row with exactly the given key or for the first row ordered after it.

mod fields;

pub use fields::{
    ChannelColumn, Column, DataSource, Field, FieldValue, Row, SummaryColumn, channel_value,
    summary_value,
};

use serde::Serialize;

/// The two logical tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TableId {
    /// Single-row MTA summary (`mtaTable`).
    Summary,
    /// One row per mailer (`mtaGroupTable`).
    Channel,
}

impl TableId {
    pub const ALL: [TableId; 2] = [TableId::Summary, TableId::Channel];

    pub fn name(&self) -> &'static str {
        match self {
            TableId::Summary => "mtaTable",
            TableId::Channel => "mtaGroupTable",
        }
    }
}

/// Lookup semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Only the row with exactly the requested key.
    Exact,
    /// The first row whose key is ordered after the requested key.
    Next,
}

/// Resolved key of an existing row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RowKey {
    pub table: TableId,
    pub index: u32,
    /// 1-based mailer ordinal; `None` for the summary row.
    pub ordinal: Option<u32>,
}

impl RowKey {
    pub fn summary(index: u32) -> Self {
        Self {
            table: TableId::Summary,
            index,
            ordinal: None,
        }
    }

    pub fn channel(index: u32, ordinal: u32) -> Self {
        Self {
            table: TableId::Channel,
            index,
            ordinal: Some(ordinal),
        }
    }

    /// Key components as they follow the column in an OID.
    pub fn as_oid_suffix(&self) -> Vec<u32> {
        let mut suffix = vec![self.index];
        suffix.extend(self.ordinal);
        suffix
    }
}

impl std::fmt::Display for RowKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.ordinal {
            Some(ordinal) => write!(f, "{}.{}", self.index, ordinal),
            None => write!(f, "{}", self.index),
        }
    }
}

/// Resolves a key in the summary table.
pub fn resolve_summary(index: u32, key: &[u32], mode: FetchMode) -> Option<RowKey> {
    let row = RowKey::summary(index);
    match mode {
        FetchMode::Exact => (key == [index]).then_some(row),
        FetchMode::Next => match key.first() {
            None => Some(row),
            Some(prefix) if *prefix < index => Some(row),
            Some(_) => None,
        },
    }
}

/// Resolves a key in the mailer table with `channel_count` rows.
pub fn resolve_channel(
    index: u32,
    channel_count: u32,
    key: &[u32],
    mode: FetchMode,
) -> Option<RowKey> {
    let ordinal = match mode {
        FetchMode::Exact => match key {
            [prefix, ordinal] if *prefix == index => Some(*ordinal),
            _ => None,
        },
        FetchMode::Next => match key.first() {
            None => Some(1),
            Some(prefix) if *prefix < index => Some(1),
            Some(prefix) if *prefix == index => match key.get(1) {
                Some(requested) if *requested >= 1 => requested.checked_add(1),
                _ => Some(1),
            },
            Some(_) => None,
        },
    }?;

    (1..=channel_count)
        .contains(&ordinal)
        .then(|| RowKey::channel(index, ordinal))
}
