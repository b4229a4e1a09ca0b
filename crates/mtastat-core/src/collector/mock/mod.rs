//! Test doubles: in-memory filesystem, settable clock and fixtures.

mod clock;
mod filesystem;
mod records;
mod scenarios;

pub use clock::ManualClock;
pub use filesystem::{MockFile, MockFs};
pub use records::encode_stat_record;
pub use scenarios::{MAIL_QUEUE, SENDMAIL_CF, STATISTICS, typical_stats};
