use crate::collector::statfile::{RecordLayout, STAT_MAGIC, StatGeometry};
use crate::models::{CounterArray, StatLayout, StatisticsSnapshot};

/// Encodes a snapshot the way sendmail writes its statistics file.
///
/// The 8.9 layout's reject and discard arrays are written as zeros; only the
/// 8.10+ layout takes them (and the connection counters) from the snapshot.
pub fn encode_stat_record(snapshot: &StatisticsSnapshot, geometry: StatGeometry) -> Vec<u8> {
    let record = RecordLayout::new(snapshot.layout, geometry);
    let word = geometry.word.bytes();
    let mut out = vec![0u8; record.size];

    let write_array = |out: &mut [u8], at: usize, values: &CounterArray| {
        for (i, v) in values.iter().enumerate() {
            geometry.write_word(out, at + i * word, *v);
        }
    };

    if let (Some(magic_at), Some(version_at), Some(version)) =
        (record.magic_at, record.version_at, snapshot.layout.version())
    {
        geometry.write_int(&mut out, magic_at, STAT_MAGIC);
        geometry.write_int(&mut out, version_at, version);
    }
    geometry.write_word(&mut out, record.itime_at, snapshot.init_time);
    geometry.write_short(&mut out, record.size_at, record.size as i16);

    if let (Some(at), Some(conn)) = (record.connections_at, snapshot.connections) {
        geometry.write_word(&mut out, at, conn.from);
        geometry.write_word(&mut out, at + word, conn.to);
        geometry.write_word(&mut out, at + 2 * word, conn.rejected);
    }

    let arrays = [
        &snapshot.received_messages,
        &snapshot.received_volume,
        &snapshot.transmitted_messages,
        &snapshot.transmitted_volume,
    ];
    for (at, values) in record.counters_at.iter().zip(arrays) {
        write_array(&mut out, *at, values);
    }

    if snapshot.layout == StatLayout::Sendmail810 {
        if let (Some(at), Some(values)) = (record.rejects_at, &snapshot.rejected_messages) {
            write_array(&mut out, at, values);
        }
        if let (Some(at), Some(values)) = (record.discards_at, &snapshot.discarded_messages) {
            write_array(&mut out, at, values);
        }
    }

    out
}
