//! Pre-built mock filesystem scenarios for testing.
//!
//! These scenarios provide realistic sendmail installations: a configuration
//! file, a statistics file and a queue directory at the default locations.

use super::filesystem::MockFs;
use super::records::encode_stat_record;
use crate::collector::statfile::StatGeometry;
use crate::models::{ConnectionCounters, StatLayout, StatisticsSnapshot};

/// Configuration file location used by the scenarios.
pub const SENDMAIL_CF: &str = "/etc/mail/sendmail.cf";
/// Statistics file location used by the scenarios.
pub const STATISTICS: &str = "/etc/mail/statistics";
/// Queue directory used by the scenarios.
pub const MAIL_QUEUE: &str = "/var/spool/mqueue";

const TYPICAL_CF: &str = "\
# sendmail.cf generated from sendmail.mc
V10/Berkeley
Cwlocalhost
O QueueDirectory=/var/spool/mqueue
O StatusFile=/etc/mail/statistics
O Timeout.queuereturn=5d
Mlocal,		P=/usr/bin/procmail, F=lsDFMAw5:/|@qSPfhn9, S=EnvFromL/HdrFromL, R=EnvToL/HdrToL,
		T=DNS/RFC822/X-Unix,
		A=procmail -Y -a $h -d $u
Mprog,		P=/bin/sh, F=lsDFMoqeu9, S=EnvFromL/HdrFromL, R=EnvToL/HdrToL, D=$z:/,
		T=X-Unix/X-Unix/X-Unix,
		A=sh -c $u
Msmtp,		P=[IPC], F=mDFMuX, S=EnvFromSMTP/HdrFromSMTP, R=EnvToSMTP, E=\\r\\n, L=990,
		T=DNS/RFC822/SMTP,
		A=TCP $h
Mesmtp,		P=[IPC], F=mDFMuXa, S=EnvFromSMTP/HdrFromSMTP, R=EnvToSMTP, E=\\r\\n, L=990,
		T=DNS/RFC822/SMTP,
		A=TCP $h
Mrelay,		P=[IPC], F=mDFMuXa8, S=EnvFromSMTP/HdrFromSMTP, R=MasqSMTP, E=\\r\\n, L=2040,
		T=DNS/RFC822/SMTP,
		A=TCP $h
";

#[allow(dead_code)]
impl MockFs {
    /// Creates a sendmail 8.10+ installation with traffic on a few mailers.
    ///
    /// Channels: prog, *file*, *include*, local, smtp, esmtp, relay. The
    /// queue holds three data files of 500, 1500 and 2600 bytes.
    pub fn typical_sendmail() -> Self {
        Self::typical_sendmail_with(StatGeometry::default())
    }

    /// Same as [`typical_sendmail`](Self::typical_sendmail) with the
    /// statistics record encoded for `geometry`.
    pub fn typical_sendmail_with(geometry: StatGeometry) -> Self {
        let mut fs = Self::new();
        fs.add_file(SENDMAIL_CF, TYPICAL_CF);
        fs.add_file(STATISTICS, encode_stat_record(&typical_stats(), geometry));

        fs.add_dir(MAIL_QUEUE);
        fs.add_file(format!("{}/dfq9ABC0001", MAIL_QUEUE), vec![b'x'; 500]);
        fs.add_file(format!("{}/qfq9ABC0001", MAIL_QUEUE), vec![b'H'; 300]);
        fs.add_file(format!("{}/dfq9ABC0002", MAIL_QUEUE), vec![b'x'; 1500]);
        fs.add_file(format!("{}/qfq9ABC0002", MAIL_QUEUE), vec![b'H'; 310]);
        fs.add_file(format!("{}/dfq9ABC0003", MAIL_QUEUE), vec![b'x'; 2600]);
        fs.add_file(format!("{}/xfq9ABC0003", MAIL_QUEUE), vec![b'T'; 40]);
        fs
    }

    /// Creates an installation still running sendmail 8.8 (no reject
    /// counters) with an empty queue.
    pub fn legacy_sendmail() -> Self {
        let mut fs = Self::new();
        fs.add_file(
            SENDMAIL_CF,
            "OS/etc/mail/statistics\nOQ/var/spool/mqueue\nMlocal, P=/bin/mail\nMsmtp, P=[IPC]\n",
        );
        let mut stats = StatisticsSnapshot::empty(StatLayout::Sendmail88);
        stats.received_messages[3] = 12;
        stats.transmitted_messages[4] = 8;
        fs.add_file(
            STATISTICS,
            encode_stat_record(&stats, StatGeometry::default()),
        );
        fs.add_dir(MAIL_QUEUE);
        fs
    }
}

/// Counters stored in [`MockFs::typical_sendmail`]'s statistics file.
///
/// Slots follow the channel order: 0 prog, 3 local, 4 smtp, 5 esmtp.
pub fn typical_stats() -> StatisticsSnapshot {
    let mut stats = StatisticsSnapshot::empty(StatLayout::Sendmail810);
    stats.init_time = 1_700_000_000;
    stats.received_messages[0] = 2;
    stats.received_messages[3] = 40;
    stats.received_messages[4] = 100;
    stats.received_volume[3] = 250;
    stats.received_volume[4] = 900;
    stats.transmitted_messages[3] = 95;
    stats.transmitted_messages[5] = 30;
    stats.transmitted_volume[3] = 880;
    stats.transmitted_volume[5] = 120;
    if let Some(rejected) = stats.rejected_messages.as_mut() {
        rejected[4] = 7;
    }
    if let Some(discarded) = stats.discarded_messages.as_mut() {
        discarded[4] = 1;
    }
    stats.connections = Some(ConnectionCounters {
        from: 140,
        to: 35,
        rejected: 7,
    });
    stats
}
