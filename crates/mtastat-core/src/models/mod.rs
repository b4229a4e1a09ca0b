//! Shared data models: channel list and statistics/queue snapshots.

mod channel;
mod snapshot;

pub use channel::{BUILTIN_CHANNELS, ChannelList, Declaration, MAX_CHANNEL_NAME_LEN, MAX_CHANNELS};
pub(crate) use snapshot::sum32;
pub use snapshot::{
    ConnectionCounters, CounterArray, QUEUE_SIZE_UNIT, QueueSnapshot, StatLayout,
    StatisticsSnapshot,
};
