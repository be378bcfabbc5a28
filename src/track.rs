//!
//! Track data structures and interpolated sampling.
//!
//! A track owns one codec-encoded key sequence plus one key-time index.
//! Sampling decodes the two bracketing keys and blends them: linear for
//! vectors, normalized-linear for quaternions (deliberately not spherical,
//! a cost/quality tradeoff that must be preserved for compatible playback).
//!

use glam::{Quat, Vec3};
use std::fmt::Debug;
use std::io::Read;

use crate::archive::Archive;
use crate::base::{KeyTimesFormat, RotationFormat, TrackError, VectorFormat};
use crate::key_times::{KeyLookup, KeyTimes};
use crate::rotation::RotationKeys;
use crate::vector::VectorKeys;

/// Value type that can be sampled from a track.
pub trait TrackValue
where
    Self: Debug + Default + Copy + Clone + PartialEq,
{
    /// Blends two bracketing values at fraction `t`.
    fn blend(a: Self, b: Self, t: f32) -> Self;

    // Compare two values with a maximum difference.
    fn abs_diff_eq(a: Self, b: Self, diff: f32) -> bool;
}

impl TrackValue for Vec3 {
    #[inline]
    fn blend(a: Vec3, b: Vec3, t: f32) -> Vec3 {
        Vec3::lerp(a, b, t)
    }

    #[inline]
    fn abs_diff_eq(a: Vec3, b: Vec3, diff: f32) -> bool {
        Vec3::abs_diff_eq(a, b, diff)
    }
}

impl TrackValue for Quat {
    /// Normalized linear blend, taking the shorter arc.
    #[inline]
    fn blend(a: Quat, b: Quat, t: f32) -> Quat {
        Quat::lerp(a, b, t)
    }

    #[inline]
    fn abs_diff_eq(a: Quat, b: Quat, diff: f32) -> bool {
        Quat::abs_diff_eq(a, b, diff)
    }
}

/// Resolves a lookup against decoded keys, clamping out-of-range indices
/// to the physical sample range (start/stop indexes of degenerate tracks
/// may count more keys than are physically stored).
fn blend_lookup<V, G>(lookup: KeyLookup, last: usize, get: G) -> Result<V, TrackError>
where
    V: TrackValue,
    G: Fn(usize) -> Option<V>,
{
    let clamped = |key: usize| get(key.min(last)).ok_or(TrackError::EmptyTrack);
    match lookup {
        KeyLookup::Before => clamped(0),
        KeyLookup::After => clamped(last),
        KeyLookup::At(key) => clamped(key as usize),
        KeyLookup::Between { key, fraction } => {
            let a = clamped((key as usize).saturating_sub(1))?;
            let b = clamped(key as usize)?;
            Ok(V::blend(a, b, fraction))
        }
    }
}

/// A rotation track: compressed quaternion keys plus their time index.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RotationTrack {
    keys: RotationKeys,
    times: KeyTimes,
}

impl RotationTrack {
    /// Creates an empty track for the authoring path.
    pub fn new(format: RotationFormat, times_format: KeyTimesFormat) -> RotationTrack {
        RotationTrack {
            keys: RotationKeys::new(format),
            times: KeyTimes::new(times_format),
        }
    }

    /// Reads a track from a container-supplied buffer: the key-time data
    /// first, then `key_count` encoded keys. Both format tags must have
    /// been read from the container beforehand.
    pub fn from_archive(
        format: RotationFormat,
        times_format: KeyTimesFormat,
        key_count: usize,
        archive: &mut Archive<impl Read>,
    ) -> Result<RotationTrack, TrackError> {
        let times = KeyTimes::from_archive(times_format, key_count, archive)?;
        let keys = RotationKeys::from_archive(format, key_count, archive)?;
        Ok(RotationTrack { keys, times })
    }

    #[inline]
    pub fn format(&self) -> RotationFormat {
        self.keys.format()
    }

    #[inline]
    pub fn times_format(&self) -> KeyTimesFormat {
        self.times.format()
    }

    #[inline]
    pub fn times(&self) -> &KeyTimes {
        &self.times
    }

    /// The logical key count, defined by the time index.
    #[inline]
    pub fn key_count(&self) -> usize {
        self.times.key_count()
    }

    /// Appends a key at a (non-decreasing) time.
    pub fn push(&mut self, time: f32, value: Quat) {
        self.times.append(time);
        self.keys.push(value);
    }

    /// Strict-quantization append, see `QuatKey::try_compress`.
    pub fn try_push(&mut self, time: f32, value: Quat) -> Result<(), TrackError> {
        self.keys.try_push(value)?;
        self.times.append(time);
        Ok(())
    }

    pub fn reserve(&mut self, additional: usize) {
        self.keys.reserve(additional);
        self.times.reserve(additional);
    }

    /// Resizes the key storage without touching the time index.
    pub fn resize(&mut self, len: usize) {
        self.keys.resize(len);
    }

    /// Decodes the key at `key`, or `None` past the end.
    #[inline]
    pub fn get(&self, key: usize) -> Option<Quat> {
        self.keys.get(key)
    }

    /// Re-encodes the key at `key`. Silently ignored out of range; call
    /// sites rely on the lenient behavior, but treat it as a latent-bug
    /// risk rather than a sanctioned contract.
    #[inline]
    pub fn set(&mut self, key: usize, value: Quat) {
        self.keys.set(key, value);
    }

    pub fn raw_byte_size(&self) -> usize {
        self.keys.raw_byte_size() + self.times.raw_byte_size()
    }

    pub fn swap_endian(&mut self) {
        self.keys.swap_endian();
        self.times.swap_endian();
    }

    /// The interpolated value at `time`, clamped to the first/last key
    /// outside the track's time range.
    pub fn sample(&self, time: f32) -> Result<Quat, TrackError> {
        if self.keys.is_empty() {
            return Err(TrackError::EmptyTrack);
        }
        let lookup = self.times.lookup(time)?;
        blend_lookup(lookup, self.keys.len() - 1, |key| self.keys.get(key))
    }
}

/// A position or scale track: vector keys plus their time index.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VectorTrack {
    keys: VectorKeys,
    times: KeyTimes,
}

impl VectorTrack {
    /// Creates an empty track for the authoring path.
    pub fn new(format: VectorFormat, times_format: KeyTimesFormat) -> VectorTrack {
        VectorTrack {
            keys: VectorKeys::new(format),
            times: KeyTimes::new(times_format),
        }
    }

    /// Reads a track from a container-supplied buffer: the key-time data
    /// first, then `key_count` encoded keys.
    pub fn from_archive(
        format: VectorFormat,
        times_format: KeyTimesFormat,
        key_count: usize,
        archive: &mut Archive<impl Read>,
    ) -> Result<VectorTrack, TrackError> {
        let times = KeyTimes::from_archive(times_format, key_count, archive)?;
        let keys = VectorKeys::from_archive(format, key_count, archive)?;
        Ok(VectorTrack { keys, times })
    }

    #[inline]
    pub fn format(&self) -> VectorFormat {
        self.keys.format()
    }

    #[inline]
    pub fn times_format(&self) -> KeyTimesFormat {
        self.times.format()
    }

    #[inline]
    pub fn times(&self) -> &KeyTimes {
        &self.times
    }

    /// The logical key count, defined by the time index.
    #[inline]
    pub fn key_count(&self) -> usize {
        self.times.key_count()
    }

    /// Appends a key at a (non-decreasing) time.
    pub fn push(&mut self, time: f32, value: Vec3) {
        self.times.append(time);
        self.keys.push(value);
    }

    pub fn reserve(&mut self, additional: usize) {
        self.keys.reserve(additional);
        self.times.reserve(additional);
    }

    /// Resizes the key storage without touching the time index.
    pub fn resize(&mut self, len: usize) {
        self.keys.resize(len);
    }

    /// Decodes the key at `key`, or `None` past the end.
    #[inline]
    pub fn get(&self, key: usize) -> Option<Vec3> {
        self.keys.get(key)
    }

    /// Re-encodes the key at `key`. Silently ignored out of range.
    #[inline]
    pub fn set(&mut self, key: usize, value: Vec3) {
        self.keys.set(key, value);
    }

    pub fn raw_byte_size(&self) -> usize {
        self.keys.raw_byte_size() + self.times.raw_byte_size()
    }

    pub fn swap_endian(&mut self) {
        self.keys.swap_endian();
        self.times.swap_endian();
    }

    /// The interpolated value at `time`, clamped to the first/last key
    /// outside the track's time range.
    pub fn sample(&self, time: f32) -> Result<Vec3, TrackError> {
        if self.keys.is_empty() {
            return Err(TrackError::EmptyTrack);
        }
        let lookup = self.times.lookup(time)?;
        blend_lookup(lookup, self.keys.len() - 1, |key| self.keys.get(key))
    }
}
