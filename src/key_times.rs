//!
//! Key-time indexing: maps a query time to bracketing keys and a fraction.
//!
//! Three storage families share one contract: uniform sequences storing
//! every key time, start/stop pairs storing only two endpoints for keys one
//! unit apart, and a bitset storing one bit per discrete time unit.
//!

use std::cell::Cell;
use std::fmt::Debug;
use std::io::Read;
use std::mem;

use crate::archive::{Archive, ArchiveRead};
use crate::base::{KeyTimesFormat, TrackError};
use crate::endian::SwapEndian;

/// Resolution of a query time against a key-time sequence.
///
/// Replaces the classic "key count as out-of-range sentinel" convention
/// with an explicit tagged result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyLookup {
    /// Query time lies before the first key. Clamp to key 0.
    Before,
    /// Query time lies at or after the last key. Clamp to the last key.
    After,
    /// Query time lands exactly on a stored key.
    At(u32),
    /// Query time lies strictly between keys `key - 1` and `key`,
    /// `0 < fraction < 1` measured from the left key.
    Between { key: u32, fraction: f32 },
}

/// Storage unit of one key time inside a uniform or start/stop sequence.
pub trait TimeUnit
where
    Self: Debug + Default + Copy + PartialEq + SwapEndian + ArchiveRead<Self>,
{
    fn to_f32(self) -> f32;
    fn from_f32(v: f32) -> Self;
}

impl TimeUnit for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> f32 {
        v
    }
}

impl TimeUnit for u16 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> u16 {
        v as u16
    }
}

impl TimeUnit for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> u8 {
        v as u8
    }
}

/// One-entry lookup cache shared by the uniform and bitset families.
/// Read-then-written non-atomically, so indexes are single-threaded by
/// design (make it per-query-context before sharing across threads).
type LookupCache = Cell<Option<(f32, KeyLookup)>>;

//
// Uniform
//

/// Stores every key's absolute time value in a non-decreasing sequence.
#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UniformKeys<T: TimeUnit> {
    times: Vec<T>,
    #[cfg_attr(feature = "serde", serde(skip))]
    cache: LookupCache,
}

impl<T: TimeUnit> UniformKeys<T> {
    pub fn new() -> UniformKeys<T> {
        UniformKeys {
            times: Vec::new(),
            cache: Cell::new(None),
        }
    }

    /// Reads `key_count` key times from an `Archive`.
    pub fn from_archive(key_count: usize, archive: &mut Archive<impl Read>) -> Result<UniformKeys<T>, TrackError> {
        Ok(UniformKeys {
            times: archive.read_vec(key_count)?,
            cache: Cell::new(None),
        })
    }

    #[inline]
    pub fn key_count(&self) -> usize {
        self.times.len()
    }

    #[inline]
    pub fn value_at(&self, key: usize) -> Option<f32> {
        self.times.get(key).map(|t| t.to_f32())
    }

    pub fn append(&mut self, time: f32) {
        self.times.push(T::from_f32(time));
        self.cache.set(None);
    }

    pub fn reserve(&mut self, additional: usize) {
        self.times.reserve(additional);
    }

    pub fn raw_byte_size(&self) -> usize {
        self.times.len() * mem::size_of::<T>()
    }

    pub fn swap_endian(&mut self) {
        self.times.iter_mut().for_each(|t| *t = t.swap_endian());
        self.cache.set(None);
    }

    pub fn lookup(&self, time: f32) -> Result<KeyLookup, TrackError> {
        let count = self.times.len();
        if count == 0 {
            return Err(TrackError::EmptyTrack);
        }
        if let Some((cached_time, cached)) = self.cache.get() {
            if cached_time == time {
                return Ok(cached);
            }
        }
        let result = self.search(time, count);
        self.cache.set(Some((time, result)));
        Ok(result)
    }

    fn search(&self, time: f32, count: usize) -> KeyLookup {
        if time < self.times[0].to_f32() {
            return KeyLookup::Before;
        }
        if time >= self.times[count - 1].to_f32() {
            return KeyLookup::After;
        }

        // Binary search seeded at the midpoint with halving step size.
        let mut pos = count >> 1;
        let mut step = count >> 2;
        while step > 0 {
            let t = self.times[pos].to_f32();
            if time < t {
                pos = pos.saturating_sub(step);
            } else if time > t {
                pos = (pos + step).min(count - 1);
            } else {
                break;
            }
            step >>= 1;
        }

        // The halving walk is not guaranteed exact, fine-tune linearly
        // until times[pos - 1] <= time <= times[pos].
        while time > self.times[pos].to_f32() {
            pos += 1;
        }
        while pos > 0 && time < self.times[pos - 1].to_f32() {
            pos -= 1;
        }

        let t0 = self.times[pos - 1].to_f32();
        let t1 = self.times[pos].to_f32();
        if time == t0 {
            return KeyLookup::At(pos as u32 - 1);
        }
        if time == t1 || t1 <= t0 {
            return KeyLookup::At(pos as u32);
        }
        KeyLookup::Between {
            key: pos as u32,
            fraction: (time - t0) / (t1 - t0),
        }
    }
}

//
// Start/stop
//

/// Stores only two endpoint times for keys known to be exactly one time
/// unit apart. The key count is derived arithmetically, so it is allowed
/// to differ from the physical sample count of degenerate tracks.
#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StartStopKeys<T: TimeUnit> {
    start: T,
    end: T,
    empty: bool,
}

impl<T: TimeUnit> StartStopKeys<T> {
    pub fn new() -> StartStopKeys<T> {
        StartStopKeys {
            start: T::default(),
            end: T::default(),
            empty: true,
        }
    }

    /// Reads the two endpoint times from an `Archive`.
    pub fn from_archive(archive: &mut Archive<impl Read>) -> Result<StartStopKeys<T>, TrackError> {
        Ok(StartStopKeys {
            start: archive.read()?,
            end: archive.read()?,
            empty: false,
        })
    }

    #[inline]
    pub fn key_count(&self) -> usize {
        if self.empty {
            return 0;
        }
        (self.end.to_f32() - self.start.to_f32()) as usize + 1
    }

    #[inline]
    pub fn value_at(&self, key: usize) -> Option<f32> {
        if key >= self.key_count() {
            return None;
        }
        Some(self.start.to_f32() + key as f32)
    }

    /// Widens the stored [start, end] envelope instead of inserting.
    pub fn append(&mut self, time: f32) {
        if self.empty {
            self.start = T::from_f32(time);
            self.end = T::from_f32(time);
            self.empty = false;
            return;
        }
        if time < self.start.to_f32() {
            self.start = T::from_f32(time);
        }
        if time > self.end.to_f32() {
            self.end = T::from_f32(time);
        }
    }

    pub fn raw_byte_size(&self) -> usize {
        2 * mem::size_of::<T>()
    }

    pub fn swap_endian(&mut self) {
        self.start = self.start.swap_endian();
        self.end = self.end.swap_endian();
    }

    pub fn lookup(&self, time: f32) -> Result<KeyLookup, TrackError> {
        if self.empty {
            return Err(TrackError::EmptyTrack);
        }
        let start = self.start.to_f32();
        let end = self.end.to_f32();
        if time < start {
            return Ok(KeyLookup::Before);
        }
        if time >= end {
            return Ok(KeyLookup::After);
        }
        let offset = time - start;
        let key = offset as u32;
        let fraction = offset - key as f32;
        if fraction == 0.0 {
            return Ok(KeyLookup::At(key));
        }
        Ok(KeyLookup::Between { key: key + 1, fraction })
    }
}

//
// Bitset
//

// Index of the lowest/highest set bit per byte value, combined pairwise to
// scan 16-bit words. Entry 0 holds the "no bit" sentinel 8.
const BYTE_LOW_BIT: [u8; 256] = build_byte_low_bit();
const BYTE_HIGH_BIT: [u8; 256] = build_byte_high_bit();

const fn build_byte_low_bit() -> [u8; 256] {
    let mut table = [8u8; 256];
    let mut i = 1usize;
    while i < 256 {
        let mut bit = 0u8;
        while (i >> bit) & 1 == 0 {
            bit += 1;
        }
        table[i] = bit;
        i += 1;
    }
    table
}

const fn build_byte_high_bit() -> [u8; 256] {
    let mut table = [8u8; 256];
    let mut i = 1usize;
    while i < 256 {
        let mut bit = 7u8;
        while (i >> bit) & 1 == 0 {
            bit -= 1;
        }
        table[i] = bit;
        i += 1;
    }
    table
}

/// Index of the lowest set bit of a non-zero word.
#[inline]
fn word_low_bit(word: u16) -> u32 {
    debug_assert!(word != 0);
    let low = (word & 0xff) as usize;
    if low != 0 {
        BYTE_LOW_BIT[low] as u32
    } else {
        8 + BYTE_LOW_BIT[(word >> 8) as usize] as u32
    }
}

/// Index of the highest set bit of a non-zero word.
#[inline]
fn word_high_bit(word: u16) -> u32 {
    debug_assert!(word != 0);
    let high = (word >> 8) as usize;
    if high != 0 {
        8 + BYTE_HIGH_BIT[high] as u32
    } else {
        BYTE_HIGH_BIT[(word & 0xff) as usize] as u32
    }
}

/// Stores one bit per discrete time unit inside [start, end], set when that
/// unit is a real key. Trades lookup cost for an 8-16x reduction in stored
/// key-time data versus a uniform sequence.
#[derive(Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BitsetKeys {
    start: u16,
    end: u16,
    size: u16,
    words: Vec<u16>,
    #[cfg_attr(feature = "serde", serde(skip))]
    cache: LookupCache,
}

impl BitsetKeys {
    pub fn new() -> BitsetKeys {
        BitsetKeys::default()
    }

    /// Reads the `{start, end, size}` header and the bit words from an
    /// `Archive`.
    pub fn from_archive(archive: &mut Archive<impl Read>) -> Result<BitsetKeys, TrackError> {
        let start: u16 = archive.read()?;
        let end: u16 = archive.read()?;
        let size: u16 = archive.read()?;
        let words = if size == 0 {
            Vec::new()
        } else {
            archive.read_vec(end.saturating_sub(start) as usize / 16 + 1)?
        };
        Ok(BitsetKeys {
            start,
            end,
            size,
            words,
            cache: Cell::new(None),
        })
    }

    /// The sparse key count: the number of set bits, not `end - start + 1`.
    #[inline]
    pub fn key_count(&self) -> usize {
        self.size as usize
    }

    pub fn value_at(&self, key: usize) -> Option<f32> {
        if key >= self.size as usize {
            return None;
        }
        let mut remaining = key as u32;
        for (w, &word) in self.words.iter().enumerate() {
            let ones = word.count_ones();
            if remaining < ones {
                let mut word = word;
                for _ in 0..remaining {
                    word &= word - 1; // strip lowest set bit
                }
                return Some((self.start as u32 + w as u32 * 16 + word_low_bit(word)) as f32);
            }
            remaining -= ones;
        }
        None
    }

    /// Appends a key at the (non-decreasing) time unit `time`.
    pub fn append(&mut self, time: f32) {
        let unit = time as u16;
        if self.size == 0 {
            self.start = unit;
            self.end = unit;
        } else if unit > self.end {
            self.end = unit;
        }
        let word_count = (self.end - self.start) as usize / 16 + 1;
        if self.words.len() < word_count {
            self.words.resize(word_count, 0);
        }
        let pos = (unit - self.start) as usize;
        let mask = 1u16 << (pos % 16);
        if self.words[pos / 16] & mask == 0 {
            self.words[pos / 16] |= mask;
            self.size += 1;
        }
        self.cache.set(None);
    }

    pub fn raw_byte_size(&self) -> usize {
        3 * mem::size_of::<u16>() + self.words.len() * mem::size_of::<u16>()
    }

    pub fn swap_endian(&mut self) {
        self.start = self.start.swap_endian();
        self.end = self.end.swap_endian();
        self.size = self.size.swap_endian();
        self.words.iter_mut().for_each(|w| *w = w.swap_endian());
        self.cache.set(None);
    }

    pub fn lookup(&self, time: f32) -> Result<KeyLookup, TrackError> {
        if self.size == 0 {
            return Err(TrackError::EmptyTrack);
        }
        if let Some((cached_time, cached)) = self.cache.get() {
            if cached_time == time {
                return Ok(cached);
            }
        }
        let result = self.search(time);
        self.cache.set(Some((time, result)));
        Ok(result)
    }

    fn search(&self, time: f32) -> KeyLookup {
        if time < self.start as f32 {
            return KeyLookup::Before;
        }
        if time >= self.end as f32 {
            return KeyLookup::After;
        }

        // time < end, so a set bit strictly to the right always exists and
        // the start bit bounds the left scan.
        let pos = (time as u16 - self.start) as u32;
        let left = self.prev_set_bit(pos);
        let left_time = (self.start as u32 + left) as f32;
        if left_time == time {
            return KeyLookup::At(self.key_index_of(left));
        }

        let right = self.next_set_bit(pos);
        let right_time = (self.start as u32 + right) as f32;
        KeyLookup::Between {
            key: self.key_index_of(right),
            fraction: (time - left_time) / (right_time - left_time),
        }
    }

    /// Nearest set bit at a position `<= pos`.
    fn prev_set_bit(&self, pos: u32) -> u32 {
        let mut w = (pos / 16) as usize;
        let masked = self.words[w] & low_bits_through(pos % 16);
        if masked != 0 {
            return w as u32 * 16 + word_high_bit(masked);
        }
        loop {
            w -= 1;
            if self.words[w] != 0 {
                return w as u32 * 16 + word_high_bit(self.words[w]);
            }
        }
    }

    /// Nearest set bit at a position `> pos`.
    fn next_set_bit(&self, pos: u32) -> u32 {
        let mut w = (pos / 16) as usize;
        let masked = self.words[w] & !low_bits_through(pos % 16);
        if masked != 0 {
            return w as u32 * 16 + word_low_bit(masked);
        }
        loop {
            w += 1;
            if self.words[w] != 0 {
                return w as u32 * 16 + word_low_bit(self.words[w]);
            }
        }
    }

    /// Number of set bits strictly before `pos`, i.e. the key index of the
    /// key whose bit sits at `pos`.
    fn key_index_of(&self, pos: u32) -> u32 {
        let word = (pos / 16) as usize;
        let mut count = 0;
        for w in 0..word {
            count += self.words[w].count_ones();
        }
        count + (self.words[word] & (low_bits_through(pos % 16) >> 1)).count_ones()
    }
}

/// Mask of bits 0..=bit.
#[inline]
fn low_bits_through(bit: u32) -> u16 {
    if bit >= 15 {
        u16::MAX
    } else {
        (1u16 << (bit + 1)) - 1
    }
}

//
// Closed set of serialized variants
//

/// A track's key-time sequence, one of the seven serialized variants.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyTimes {
    F32(UniformKeys<f32>),
    U16(UniformKeys<u16>),
    U8(UniformKeys<u8>),
    F32StartStop(StartStopKeys<f32>),
    U16StartStop(StartStopKeys<u16>),
    U8StartStop(StartStopKeys<u8>),
    Bitset(BitsetKeys),
}

impl KeyTimes {
    /// Creates an empty key-time sequence of the given serialized format.
    pub fn new(format: KeyTimesFormat) -> KeyTimes {
        match format {
            KeyTimesFormat::F32 => KeyTimes::F32(UniformKeys::new()),
            KeyTimesFormat::U16 => KeyTimes::U16(UniformKeys::new()),
            KeyTimesFormat::U8 => KeyTimes::U8(UniformKeys::new()),
            KeyTimesFormat::F32StartStop => KeyTimes::F32StartStop(StartStopKeys::new()),
            KeyTimesFormat::U16StartStop => KeyTimes::U16StartStop(StartStopKeys::new()),
            KeyTimesFormat::U8StartStop => KeyTimes::U8StartStop(StartStopKeys::new()),
            KeyTimesFormat::Bitset => KeyTimes::Bitset(BitsetKeys::new()),
        }
    }

    /// Reads a key-time sequence of the given serialized format from an
    /// `Archive`. `key_count` is only meaningful for the uniform formats.
    pub fn from_archive(
        format: KeyTimesFormat,
        key_count: usize,
        archive: &mut Archive<impl Read>,
    ) -> Result<KeyTimes, TrackError> {
        Ok(match format {
            KeyTimesFormat::F32 => KeyTimes::F32(UniformKeys::from_archive(key_count, archive)?),
            KeyTimesFormat::U16 => KeyTimes::U16(UniformKeys::from_archive(key_count, archive)?),
            KeyTimesFormat::U8 => KeyTimes::U8(UniformKeys::from_archive(key_count, archive)?),
            KeyTimesFormat::F32StartStop => KeyTimes::F32StartStop(StartStopKeys::from_archive(archive)?),
            KeyTimesFormat::U16StartStop => KeyTimes::U16StartStop(StartStopKeys::from_archive(archive)?),
            KeyTimesFormat::U8StartStop => KeyTimes::U8StartStop(StartStopKeys::from_archive(archive)?),
            KeyTimesFormat::Bitset => KeyTimes::Bitset(BitsetKeys::from_archive(archive)?),
        })
    }

    pub fn format(&self) -> KeyTimesFormat {
        match self {
            KeyTimes::F32(_) => KeyTimesFormat::F32,
            KeyTimes::U16(_) => KeyTimesFormat::U16,
            KeyTimes::U8(_) => KeyTimesFormat::U8,
            KeyTimes::F32StartStop(_) => KeyTimesFormat::F32StartStop,
            KeyTimes::U16StartStop(_) => KeyTimesFormat::U16StartStop,
            KeyTimes::U8StartStop(_) => KeyTimesFormat::U8StartStop,
            KeyTimes::Bitset(_) => KeyTimesFormat::Bitset,
        }
    }

    pub fn key_count(&self) -> usize {
        match self {
            KeyTimes::F32(keys) => keys.key_count(),
            KeyTimes::U16(keys) => keys.key_count(),
            KeyTimes::U8(keys) => keys.key_count(),
            KeyTimes::F32StartStop(keys) => keys.key_count(),
            KeyTimes::U16StartStop(keys) => keys.key_count(),
            KeyTimes::U8StartStop(keys) => keys.key_count(),
            KeyTimes::Bitset(keys) => keys.key_count(),
        }
    }

    pub fn value_at(&self, key: usize) -> Option<f32> {
        match self {
            KeyTimes::F32(keys) => keys.value_at(key),
            KeyTimes::U16(keys) => keys.value_at(key),
            KeyTimes::U8(keys) => keys.value_at(key),
            KeyTimes::F32StartStop(keys) => keys.value_at(key),
            KeyTimes::U16StartStop(keys) => keys.value_at(key),
            KeyTimes::U8StartStop(keys) => keys.value_at(key),
            KeyTimes::Bitset(keys) => keys.value_at(key),
        }
    }

    pub fn lookup(&self, time: f32) -> Result<KeyLookup, TrackError> {
        match self {
            KeyTimes::F32(keys) => keys.lookup(time),
            KeyTimes::U16(keys) => keys.lookup(time),
            KeyTimes::U8(keys) => keys.lookup(time),
            KeyTimes::F32StartStop(keys) => keys.lookup(time),
            KeyTimes::U16StartStop(keys) => keys.lookup(time),
            KeyTimes::U8StartStop(keys) => keys.lookup(time),
            KeyTimes::Bitset(keys) => keys.lookup(time),
        }
    }

    pub fn append(&mut self, time: f32) {
        match self {
            KeyTimes::F32(keys) => keys.append(time),
            KeyTimes::U16(keys) => keys.append(time),
            KeyTimes::U8(keys) => keys.append(time),
            KeyTimes::F32StartStop(keys) => keys.append(time),
            KeyTimes::U16StartStop(keys) => keys.append(time),
            KeyTimes::U8StartStop(keys) => keys.append(time),
            KeyTimes::Bitset(keys) => keys.append(time),
        }
    }

    pub fn reserve(&mut self, additional: usize) {
        match self {
            KeyTimes::F32(keys) => keys.reserve(additional),
            KeyTimes::U16(keys) => keys.reserve(additional),
            KeyTimes::U8(keys) => keys.reserve(additional),
            _ => {}
        }
    }

    pub fn raw_byte_size(&self) -> usize {
        match self {
            KeyTimes::F32(keys) => keys.raw_byte_size(),
            KeyTimes::U16(keys) => keys.raw_byte_size(),
            KeyTimes::U8(keys) => keys.raw_byte_size(),
            KeyTimes::F32StartStop(keys) => keys.raw_byte_size(),
            KeyTimes::U16StartStop(keys) => keys.raw_byte_size(),
            KeyTimes::U8StartStop(keys) => keys.raw_byte_size(),
            KeyTimes::Bitset(keys) => keys.raw_byte_size(),
        }
    }

    pub fn swap_endian(&mut self) {
        match self {
            KeyTimes::F32(keys) => keys.swap_endian(),
            KeyTimes::U16(keys) => keys.swap_endian(),
            KeyTimes::U8(keys) => keys.swap_endian(),
            KeyTimes::F32StartStop(keys) => keys.swap_endian(),
            KeyTimes::U16StartStop(keys) => keys.swap_endian(),
            KeyTimes::U8StartStop(keys) => keys.swap_endian(),
            KeyTimes::Bitset(keys) => keys.swap_endian(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(times: &[f32]) -> UniformKeys<f32> {
        let mut keys = UniformKeys::new();
        for &t in times {
            keys.append(t);
        }
        keys
    }

    #[test]
    fn test_bit_scan_tables() {
        for word in 1..=u16::MAX {
            assert_eq!(word_low_bit(word), word.trailing_zeros(), "low {word:#x}");
            assert_eq!(word_high_bit(word), 15 - word.leading_zeros(), "high {word:#x}");
        }
    }

    #[test]
    fn test_uniform_empty() {
        let keys: UniformKeys<f32> = UniformKeys::new();
        assert_eq!(keys.key_count(), 0);
        assert_eq!(keys.lookup(0.0), Err(TrackError::EmptyTrack));
    }

    #[test]
    fn test_uniform_lookup() {
        let keys = uniform(&[1.0, 2.0, 4.0, 8.0, 9.0]);
        assert_eq!(keys.key_count(), 5);
        assert_eq!(keys.value_at(2), Some(4.0));
        assert_eq!(keys.value_at(5), None);

        assert_eq!(keys.lookup(0.5), Ok(KeyLookup::Before));
        assert_eq!(keys.lookup(1.0), Ok(KeyLookup::At(0)));
        assert_eq!(keys.lookup(2.0), Ok(KeyLookup::At(1)));
        assert_eq!(keys.lookup(3.0), Ok(KeyLookup::Between { key: 2, fraction: 0.5 }));
        assert_eq!(keys.lookup(4.0), Ok(KeyLookup::At(2)));
        assert_eq!(keys.lookup(5.0), Ok(KeyLookup::Between { key: 3, fraction: 0.25 }));
        assert_eq!(keys.lookup(8.5), Ok(KeyLookup::Between { key: 4, fraction: 0.5 }));
        assert_eq!(keys.lookup(9.0), Ok(KeyLookup::After));
        assert_eq!(keys.lookup(10.0), Ok(KeyLookup::After));
    }

    #[test]
    fn test_uniform_lookup_u16() {
        let mut keys: UniformKeys<u16> = UniformKeys::new();
        for t in [0.0, 10.0, 20.0, 30.0] {
            keys.append(t);
        }
        assert_eq!(keys.lookup(10.0), Ok(KeyLookup::At(1)));
        assert_eq!(keys.lookup(25.0), Ok(KeyLookup::Between { key: 3, fraction: 0.5 }));
    }

    #[test]
    fn test_uniform_two_keys() {
        let keys = uniform(&[0.0, 1.0]);
        assert_eq!(keys.lookup(0.0), Ok(KeyLookup::At(0)));
        assert_eq!(keys.lookup(0.25), Ok(KeyLookup::Between { key: 1, fraction: 0.25 }));
        assert_eq!(keys.lookup(1.0), Ok(KeyLookup::After));
    }

    #[test]
    fn test_uniform_cache_repeat_query() {
        let keys = uniform(&[0.0, 1.0, 2.0]);
        let first = keys.lookup(0.5).unwrap();
        assert_eq!(keys.lookup(0.5).unwrap(), first);
        assert_eq!(keys.lookup(1.5).unwrap(), KeyLookup::Between { key: 2, fraction: 0.5 });
        assert_eq!(keys.lookup(0.5).unwrap(), first);
    }

    #[test]
    fn test_uniform_monotonic() {
        let keys = uniform(&[0.0, 0.5, 0.75, 2.0, 3.5, 7.0, 7.25, 11.0]);
        let index_of = |lookup: KeyLookup| -> u32 {
            match lookup {
                KeyLookup::Before => 0,
                KeyLookup::After => u32::MAX,
                KeyLookup::At(key) => key,
                KeyLookup::Between { key, .. } => key,
            }
        };
        let mut last = 0;
        let mut t = -1.0;
        while t < 12.0 {
            let key = index_of(keys.lookup(t).unwrap());
            assert!(key >= last, "lookup went backwards at {t}");
            last = key;
            t += 0.0625;
        }
    }

    #[test]
    fn test_start_stop() {
        let mut keys: StartStopKeys<u16> = StartStopKeys::new();
        assert_eq!(keys.lookup(0.0), Err(TrackError::EmptyTrack));
        keys.append(2.0);
        keys.append(9.0);
        assert_eq!(keys.key_count(), 8);
        assert_eq!(keys.value_at(0), Some(2.0));
        assert_eq!(keys.value_at(7), Some(9.0));
        assert_eq!(keys.value_at(8), None);

        assert_eq!(keys.lookup(1.0), Ok(KeyLookup::Before));
        assert_eq!(keys.lookup(2.0), Ok(KeyLookup::At(0)));
        assert_eq!(keys.lookup(5.0), Ok(KeyLookup::At(3)));
        assert_eq!(keys.lookup(5.5), Ok(KeyLookup::Between { key: 4, fraction: 0.5 }));
        assert_eq!(keys.lookup(9.0), Ok(KeyLookup::After));
        assert_eq!(keys.lookup(20.0), Ok(KeyLookup::After));
    }

    #[test]
    fn test_start_stop_matches_uniform() {
        let mut ss: StartStopKeys<f32> = StartStopKeys::new();
        ss.append(2.0);
        ss.append(9.0);
        let uni = uniform(&[2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        assert_eq!(ss.key_count(), uni.key_count());
        let mut t = 0.0;
        while t < 11.0 {
            assert_eq!(ss.lookup(t), uni.lookup(t), "diverged at {t}");
            t += 0.125;
        }
    }

    #[test]
    fn test_bitset_sparse_lookup() {
        let mut keys = BitsetKeys::new();
        for t in [0.0, 3.0, 7.0, 10.0] {
            keys.append(t);
        }
        assert_eq!(keys.key_count(), 4);
        assert_eq!(keys.value_at(0), Some(0.0));
        assert_eq!(keys.value_at(1), Some(3.0));
        assert_eq!(keys.value_at(2), Some(7.0));
        assert_eq!(keys.value_at(3), Some(10.0));
        assert_eq!(keys.value_at(4), None);

        assert_eq!(keys.lookup(3.0), Ok(KeyLookup::At(1)));
        assert_eq!(keys.lookup(5.0), Ok(KeyLookup::Between { key: 2, fraction: 0.5 }));
        assert_eq!(keys.lookup(-1.0), Ok(KeyLookup::Before));
        assert_eq!(keys.lookup(0.0), Ok(KeyLookup::At(0)));
        assert_eq!(keys.lookup(1.0), Ok(KeyLookup::Between { key: 1, fraction: 1.0 / 3.0 }));
        assert_eq!(keys.lookup(10.0), Ok(KeyLookup::After));
        assert_eq!(keys.lookup(11.0), Ok(KeyLookup::After));
    }

    #[test]
    fn test_bitset_across_words() {
        let times = [0.0, 15.0, 16.0, 40.0, 77.0];
        let mut keys = BitsetKeys::new();
        for &t in &times {
            keys.append(t);
        }
        assert_eq!(keys.key_count(), 5);
        for (i, &t) in times.iter().enumerate() {
            assert_eq!(keys.value_at(i), Some(t));
        }
        assert_eq!(keys.lookup(15.0), Ok(KeyLookup::At(1)));
        assert_eq!(keys.lookup(15.5), Ok(KeyLookup::Between { key: 2, fraction: 0.5 }));
        assert_eq!(keys.lookup(16.0), Ok(KeyLookup::At(2)));
        assert_eq!(keys.lookup(28.0), Ok(KeyLookup::Between { key: 3, fraction: 0.5 }));
        // 40 -> 77 spans two empty words
        assert_eq!(keys.lookup(40.0), Ok(KeyLookup::At(3)));
        match keys.lookup(58.5).unwrap() {
            KeyLookup::Between { key, fraction } => {
                assert_eq!(key, 4);
                assert!((fraction - 0.5).abs() < 1e-6);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_bitset_matches_uniform() {
        let times = [3.0, 4.0, 9.0, 17.0, 18.0, 33.0, 64.0];
        let mut bits = BitsetKeys::new();
        let mut uni = UniformKeys::<f32>::new();
        for &t in &times {
            bits.append(t);
            uni.append(t);
        }
        let mut t = 0.0;
        while t < 70.0 {
            assert_eq!(bits.lookup(t), uni.lookup(t), "diverged at {t}");
            t += 0.25;
        }
    }

    #[test]
    fn test_key_times_variants() {
        for format in [
            KeyTimesFormat::F32,
            KeyTimesFormat::U16,
            KeyTimesFormat::U8,
            KeyTimesFormat::F32StartStop,
            KeyTimesFormat::U16StartStop,
            KeyTimesFormat::U8StartStop,
            KeyTimesFormat::Bitset,
        ] {
            let mut keys = KeyTimes::new(format);
            assert_eq!(keys.format(), format);
            assert_eq!(keys.lookup(0.0), Err(TrackError::EmptyTrack), "{format:?}");
            for t in [2.0, 3.0, 4.0, 5.0] {
                keys.append(t);
            }
            assert_eq!(keys.key_count(), 4, "{format:?}");
            assert_eq!(keys.value_at(1), Some(3.0), "{format:?}");
            assert_eq!(keys.lookup(3.0), Ok(KeyLookup::At(1)), "{format:?}");
            assert_eq!(
                keys.lookup(3.5),
                Ok(KeyLookup::Between { key: 2, fraction: 0.5 }),
                "{format:?}"
            );
            assert_eq!(keys.lookup(1.0), Ok(KeyLookup::Before), "{format:?}");
            assert_eq!(keys.lookup(5.0), Ok(KeyLookup::After), "{format:?}");
        }
    }

    #[test]
    fn test_swap_endian_round_trip() {
        let mut uni = uniform(&[0.0, 1.0, 2.5]);
        uni.swap_endian();
        uni.swap_endian();
        assert_eq!(uni.lookup(1.0), Ok(KeyLookup::At(1)));

        let mut bits = BitsetKeys::new();
        for t in [0.0, 3.0, 7.0] {
            bits.append(t);
        }
        bits.swap_endian();
        bits.swap_endian();
        assert_eq!(bits.lookup(3.0), Ok(KeyLookup::At(1)));
    }
}
