//! Binary layouts of the sendmail statistics file (`sendmail.st`).
//!
//! sendmail writes its `struct statistics` to disk verbatim, so the on-disk
//! layout follows C struct rules for the platform that produced it. Offsets
//! are computed here from the configured word size instead of
//! reinterpreting the buffer as a native struct:
//!
//! ```text
//! 8.10+  (version 3)        8.9  (version 2)        8.8  (no header)
//! ┌──────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ int   magic      │     │ int   magic      │     │ time_t itime     │
//! │ int   version    │     │ int   version    │     │ short  size      │
//! │ time_t itime     │     │ time_t itime     │     │ long   nf[25]    │
//! │ short size       │     │ short size       │     │ long   bf[25]    │
//! │ long  cf, ct, cr │     │ long  nf[25]     │     │ long   nt[25]    │
//! │ long  nf[25]     │     │ long  bf[25]     │     │ long   bt[25]    │
//! │ long  bf[25]     │     │ long  nt[25]     │     └──────────────────┘
//! │ long  nt[25]     │     │ long  bt[25]     │
//! │ long  bt[25]     │     │ long  nr[25] (*) │
//! │ long  nr[25]     │     │ long  nd[25] (*) │
//! │ long  nd[25]     │     └──────────────────┘
//! └──────────────────┘
//! ```
//!
//! (*) counted in the record size but not reported.

use crate::models::{ConnectionCounters, CounterArray, MAX_CHANNELS, StatLayout, StatisticsSnapshot};

/// Magic value identifying statistics files from sendmail 8.9 or newer.
pub const STAT_MAGIC: i32 = 0x1B1DE;

const INT_SIZE: usize = 4;
const SHORT_SIZE: usize = 2;

/// Width of C `long` and `time_t` on the platform that wrote the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordSize {
    Four,
    Eight,
}

impl WordSize {
    pub fn bytes(self) -> usize {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    pub fn from_bytes(bytes: u64) -> Option<Self> {
        match bytes {
            4 => Some(Self::Four),
            8 => Some(Self::Eight),
            _ => None,
        }
    }

    /// Width of `long` on the running platform.
    pub fn native() -> Self {
        if std::mem::size_of::<std::ffi::c_long>() == 8 {
            Self::Eight
        } else {
            Self::Four
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }
}

/// Integer widths and byte order used to decode the statistics file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatGeometry {
    pub word: WordSize,
    pub byte_order: ByteOrder,
}

impl Default for StatGeometry {
    fn default() -> Self {
        Self {
            word: WordSize::native(),
            byte_order: ByteOrder::native(),
        }
    }
}

impl StatGeometry {
    pub fn new(word: WordSize, byte_order: ByteOrder) -> Self {
        Self { word, byte_order }
    }

    /// Size of the read buffer: the largest layout plus one word, so that a
    /// file longer than any known layout is seen as a size mismatch.
    pub fn buffer_len(&self) -> usize {
        StatLayout::ALL
            .iter()
            .map(|l| RecordLayout::new(*l, *self).size)
            .max()
            .unwrap_or(0)
            + self.word.bytes()
    }

    fn read_int(&self, buf: &[u8], at: usize) -> Option<i32> {
        let bytes: [u8; 4] = buf.get(at..at + INT_SIZE)?.try_into().ok()?;
        Some(match self.byte_order {
            ByteOrder::Little => i32::from_le_bytes(bytes),
            ByteOrder::Big => i32::from_be_bytes(bytes),
        })
    }

    fn read_short(&self, buf: &[u8], at: usize) -> Option<i16> {
        let bytes: [u8; 2] = buf.get(at..at + SHORT_SIZE)?.try_into().ok()?;
        Some(match self.byte_order {
            ByteOrder::Little => i16::from_le_bytes(bytes),
            ByteOrder::Big => i16::from_be_bytes(bytes),
        })
    }

    fn read_word(&self, buf: &[u8], at: usize) -> Option<i64> {
        match self.word {
            WordSize::Four => self.read_int(buf, at).map(i64::from),
            WordSize::Eight => {
                let bytes: [u8; 8] = buf.get(at..at + 8)?.try_into().ok()?;
                Some(match self.byte_order {
                    ByteOrder::Little => i64::from_le_bytes(bytes),
                    ByteOrder::Big => i64::from_be_bytes(bytes),
                })
            }
        }
    }

    fn write_bytes(&self, out: &mut [u8], at: usize, le: &[u8]) {
        let dst = &mut out[at..at + le.len()];
        dst.copy_from_slice(le);
        if self.byte_order == ByteOrder::Big {
            dst.reverse();
        }
    }

    pub(crate) fn write_int(&self, out: &mut [u8], at: usize, value: i32) {
        self.write_bytes(out, at, &value.to_le_bytes());
    }

    pub(crate) fn write_short(&self, out: &mut [u8], at: usize, value: i16) {
        self.write_bytes(out, at, &value.to_le_bytes());
    }

    pub(crate) fn write_word(&self, out: &mut [u8], at: usize, value: i64) {
        match self.word {
            WordSize::Four => self.write_bytes(out, at, &(value as i32).to_le_bytes()),
            WordSize::Eight => self.write_bytes(out, at, &value.to_le_bytes()),
        }
    }
}

/// Lays out fields the way a C compiler does: each field aligned to its own
/// size, total padded to the largest alignment.
struct FieldCursor {
    offset: usize,
    max_align: usize,
}

impl FieldCursor {
    fn new() -> Self {
        Self {
            offset: 0,
            max_align: 1,
        }
    }

    fn field(&mut self, size: usize) -> usize {
        self.offset = self.offset.next_multiple_of(size);
        self.max_align = self.max_align.max(size);
        let at = self.offset;
        self.offset += size;
        at
    }

    fn array(&mut self, elem: usize, count: usize) -> usize {
        let at = self.field(elem);
        self.offset += elem * (count - 1);
        at
    }

    fn finish(self) -> usize {
        self.offset.next_multiple_of(self.max_align)
    }
}

/// Byte offsets of every field of one layout under one geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub layout: StatLayout,
    /// Total record size, which sendmail stores in the `size` field.
    pub size: usize,
    pub magic_at: Option<usize>,
    pub version_at: Option<usize>,
    pub itime_at: usize,
    pub size_at: usize,
    pub connections_at: Option<usize>,
    /// Received messages, received volume, transmitted messages, transmitted
    /// volume.
    pub counters_at: [usize; 4],
    pub rejects_at: Option<usize>,
    pub discards_at: Option<usize>,
}

impl RecordLayout {
    pub fn new(layout: StatLayout, geometry: StatGeometry) -> Self {
        let word = geometry.word.bytes();
        let mut cursor = FieldCursor::new();

        let (magic_at, version_at) = match layout {
            StatLayout::Sendmail88 => (None, None),
            _ => (Some(cursor.field(INT_SIZE)), Some(cursor.field(INT_SIZE))),
        };
        let itime_at = cursor.field(word);
        let size_at = cursor.field(SHORT_SIZE);

        let connections_at = match layout {
            StatLayout::Sendmail810 => {
                let at = cursor.field(word);
                cursor.field(word);
                cursor.field(word);
                Some(at)
            }
            _ => None,
        };

        let counters_at = [
            cursor.array(word, MAX_CHANNELS),
            cursor.array(word, MAX_CHANNELS),
            cursor.array(word, MAX_CHANNELS),
            cursor.array(word, MAX_CHANNELS),
        ];

        let (rejects_at, discards_at) = match layout {
            StatLayout::Sendmail88 => (None, None),
            StatLayout::Sendmail89 => {
                // Present on disk; reported as not available.
                cursor.array(word, MAX_CHANNELS);
                cursor.array(word, MAX_CHANNELS);
                (None, None)
            }
            StatLayout::Sendmail810 => (
                Some(cursor.array(word, MAX_CHANNELS)),
                Some(cursor.array(word, MAX_CHANNELS)),
            ),
        };

        Self {
            layout,
            size: cursor.finish(),
            magic_at,
            version_at,
            itime_at,
            size_at,
            connections_at,
            counters_at,
            rejects_at,
            discards_at,
        }
    }

    /// Value of the record's `size` field, if the buffer reaches it.
    fn recorded_size(&self, buf: &[u8], geometry: StatGeometry) -> Option<usize> {
        let size = geometry.read_short(buf, self.size_at)?;
        usize::try_from(size).ok()
    }

    /// Whether `buf` (exactly the bytes read from the file) is this layout.
    fn matches(&self, buf: &[u8], geometry: StatGeometry) -> bool {
        if let Some(at) = self.version_at {
            let expected = self.layout.version();
            if geometry.read_int(buf, at) != expected {
                return false;
            }
        }
        self.recorded_size(buf, geometry) == Some(self.size) && buf.len() == self.size
    }

    /// Decodes a record. `buf` must hold at least `self.size` bytes.
    pub fn decode(
        &self,
        buf: &[u8],
        geometry: StatGeometry,
        captured_at: Option<i64>,
    ) -> Option<StatisticsSnapshot> {
        if buf.len() < self.size {
            return None;
        }
        let array = |at: usize| -> Option<CounterArray> {
            let word = geometry.word.bytes();
            let mut values = [0i64; MAX_CHANNELS];
            for (i, v) in values.iter_mut().enumerate() {
                *v = geometry.read_word(buf, at + i * word)?;
            }
            Some(values)
        };

        let connections = match self.connections_at {
            Some(at) => {
                let word = geometry.word.bytes();
                Some(ConnectionCounters {
                    from: geometry.read_word(buf, at)?,
                    to: geometry.read_word(buf, at + word)?,
                    rejected: geometry.read_word(buf, at + 2 * word)?,
                })
            }
            None => None,
        };

        Some(StatisticsSnapshot {
            layout: self.layout,
            captured_at,
            init_time: geometry.read_word(buf, self.itime_at)?,
            received_messages: array(self.counters_at[0])?,
            received_volume: array(self.counters_at[1])?,
            transmitted_messages: array(self.counters_at[2])?,
            transmitted_volume: array(self.counters_at[3])?,
            rejected_messages: match self.rejects_at {
                Some(at) => Some(array(at)?),
                None => None,
            },
            discarded_messages: match self.discards_at {
                Some(at) => Some(array(at)?),
                None => None,
            },
            connections,
        })
    }
}

/// Detects the layout of a statistics file from the bytes read at open time.
///
/// A magic header selects between the 8.10 and 8.9 layouts by version;
/// without it the buffer can only be the 8.8 layout. In every case the
/// recorded structure size and the number of bytes read must both equal the
/// layout's size exactly.
pub fn detect_layout(buf: &[u8], geometry: StatGeometry) -> Option<StatLayout> {
    if geometry.read_int(buf, 0) == Some(STAT_MAGIC) {
        [StatLayout::Sendmail810, StatLayout::Sendmail89]
            .into_iter()
            .find(|l| RecordLayout::new(*l, geometry).matches(buf, geometry))
    } else {
        let legacy = RecordLayout::new(StatLayout::Sendmail88, geometry);
        legacy
            .matches(buf, geometry)
            .then_some(StatLayout::Sendmail88)
    }
}
