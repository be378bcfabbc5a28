//!
//! Orientation codec: fixed-width bit-packed unit quaternion keys.
//!
//! Every compressed format drops the largest-magnitude component, negates
//! the quaternion when that component is negative (unit quaternions are
//! sign-ambiguous) and stores the other three plus a 2 bit index of the
//! dropped one. Decode reconstructs the dropped component from the unit
//! norm constraint, so the decoded norm is 1 by construction while the
//! stored components only round-trip within the format's bit width.
//!

use glam::{Quat, Vec4};
use static_assertions::const_assert_eq;
use std::io::Read;
use std::mem;

use crate::archive::{Archive, ArchiveRead};
use crate::base::{RotationFormat, TrackError};
use crate::endian::SwapEndian;

/// The maximum magnitude any non-largest component of a unit quaternion
/// can have, 1/sqrt(2).
pub const QUAT_COMPONENT_RANGE: f32 = 0.707106781186;

const MAX_10BIT: f32 = 723.0;
const MAX_15BIT: f32 = 23170.0;
const MAX_16BIT: f32 = 32767.0;
const MAX_20BIT: f32 = 741454.0;
const MAX_21BIT: f32 = 1482909.0;

const ANGLE_SCALE: f32 = 32767.0 / core::f32::consts::PI;

/// Offset-binary fixed-point quantization, clamped to the field range.
#[inline]
fn quantize(value: f32, max: f32, field: u64) -> u64 {
    let packed = ((value + QUAT_COMPONENT_RANGE) * max + 0.5).floor() as i64;
    packed.clamp(0, field as i64) as u64
}

/// Strict quantization: reports a component outside the packed field range
/// instead of clamping.
#[inline]
fn try_quantize(value: f32, max: f32, field: u64) -> Result<u64, TrackError> {
    let packed = ((value + QUAT_COMPONENT_RANGE) * max + 0.5).floor() as i64;
    if packed < 0 || packed > field as i64 {
        return Err(TrackError::PrecisionOverflow);
    }
    Ok(packed as u64)
}

#[inline]
fn dequantize(packed: u64, max: f32) -> f32 {
    packed as f32 / max - QUAT_COMPONENT_RANGE
}

// Component indices kept when index i is dropped.
const STORED: [[usize; 3]; 4] = [[1, 2, 3], [0, 2, 3], [0, 1, 3], [0, 1, 2]];

/// Splits a quaternion into the index of its largest-magnitude component
/// and the other three, sign-normalized so the dropped one is positive.
#[inline]
fn drop_largest(q: Quat) -> (usize, [f32; 3]) {
    let c = [q.x, q.y, q.z, q.w];
    let mut largest = 0;
    for i in 1..4 {
        if c[i].abs() > c[largest].abs() {
            largest = i;
        }
    }
    let sign = if c[largest] < 0.0 { -1.0 } else { 1.0 };
    let m = &STORED[largest];
    (largest, [c[m[0]] * sign, c[m[1]] * sign, c[m[2]] * sign])
}

/// Re-places three stored components and reconstructs the dropped one as
/// `sqrt(max(0, 1 - sum of squares))`.
#[inline]
fn restore_largest(largest: usize, stored: [f32; 3]) -> Quat {
    let mut c = [0.0f32; 4];
    let m = &STORED[largest];
    c[m[0]] = stored[0];
    c[m[1]] = stored[1];
    c[m[2]] = stored[2];
    let sum = stored[0] * stored[0] + stored[1] * stored[1] + stored[2] * stored[2];
    c[largest] = (1.0 - sum).max(0.0).sqrt();
    Quat::from_xyzw(c[0], c[1], c[2], c[3])
}

/// One rotation key in some fixed-width storage format.
pub trait QuatKey
where
    Self: Copy + Clone + PartialEq + std::fmt::Debug + SwapEndian + ArchiveRead<Self>,
{
    const FORMAT: RotationFormat;

    /// Lenient encode: components outside the packed range clamp.
    fn compress(q: Quat) -> Self;

    /// Strict encode: components outside the packed range report
    /// `PrecisionOverflow`.
    fn try_compress(q: Quat) -> Result<Self, TrackError>;

    fn decompress(&self) -> Quat;
}

//
// Raw
//

/// Four raw f32 components, 128 bits.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawQuatKey([f32; 4]);

impl QuatKey for RawQuatKey {
    const FORMAT: RotationFormat = RotationFormat::Raw;

    #[inline]
    fn compress(q: Quat) -> RawQuatKey {
        RawQuatKey([q.x, q.y, q.z, q.w])
    }

    #[inline]
    fn try_compress(q: Quat) -> Result<RawQuatKey, TrackError> {
        Ok(Self::compress(q))
    }

    #[inline]
    fn decompress(&self) -> Quat {
        Quat::from_xyzw(self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

impl SwapEndian for RawQuatKey {
    #[inline]
    fn swap_endian(self) -> RawQuatKey {
        RawQuatKey(self.0.swap_endian())
    }
}

impl ArchiveRead<RawQuatKey> for RawQuatKey {
    #[inline]
    fn read<R: Read>(archive: &mut Archive<R>) -> Result<RawQuatKey, TrackError> {
        Ok(RawQuatKey([
            archive.read()?,
            archive.read()?,
            archive.read()?,
            archive.read()?,
        ]))
    }
}

//
// ShortInt3
//

/// x,y,z as i16, w dropped with its sign normalized away, 48 bits.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShortInt3Key([i16; 3]);

impl ShortInt3Key {
    #[inline]
    fn pack(q: Quat) -> [f32; 3] {
        let sign = if q.w < 0.0 { -1.0 } else { 1.0 };
        [q.x * sign * MAX_16BIT, q.y * sign * MAX_16BIT, q.z * sign * MAX_16BIT]
    }
}

impl QuatKey for ShortInt3Key {
    const FORMAT: RotationFormat = RotationFormat::ShortInt3;

    fn compress(q: Quat) -> ShortInt3Key {
        let v = Self::pack(q);
        ShortInt3Key([
            v[0].round().clamp(-MAX_16BIT, MAX_16BIT) as i16,
            v[1].round().clamp(-MAX_16BIT, MAX_16BIT) as i16,
            v[2].round().clamp(-MAX_16BIT, MAX_16BIT) as i16,
        ])
    }

    fn try_compress(q: Quat) -> Result<ShortInt3Key, TrackError> {
        let v = Self::pack(q);
        if v.iter().any(|c| c.round().abs() > MAX_16BIT) {
            return Err(TrackError::PrecisionOverflow);
        }
        Ok(Self::compress(q))
    }

    fn decompress(&self) -> Quat {
        let x = self.0[0] as f32 / MAX_16BIT;
        let y = self.0[1] as f32 / MAX_16BIT;
        let z = self.0[2] as f32 / MAX_16BIT;
        let w = (1.0 - (x * x + y * y + z * z)).max(0.0).sqrt();
        Quat::from_xyzw(x, y, z, w)
    }
}

impl SwapEndian for ShortInt3Key {
    #[inline]
    fn swap_endian(self) -> ShortInt3Key {
        ShortInt3Key(self.0.swap_endian())
    }
}

impl ArchiveRead<ShortInt3Key> for ShortInt3Key {
    #[inline]
    fn read<R: Read>(archive: &mut Archive<R>) -> Result<ShortInt3Key, TrackError> {
        Ok(ShortInt3Key([archive.read()?, archive.read()?, archive.read()?]))
    }
}

//
// SmallTreeDword
//

/// Three 10 bit components at bits 0/10/20 plus the dropped-component
/// index at bit 30, 32 bits total.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmallTreeDwordKey(u32);

impl QuatKey for SmallTreeDwordKey {
    const FORMAT: RotationFormat = RotationFormat::SmallTreeDword;

    fn compress(q: Quat) -> SmallTreeDwordKey {
        let (largest, stored) = drop_largest(q);
        let a = quantize(stored[0], MAX_10BIT, 0x3ff) as u32;
        let b = quantize(stored[1], MAX_10BIT, 0x3ff) as u32;
        let c = quantize(stored[2], MAX_10BIT, 0x3ff) as u32;
        SmallTreeDwordKey(a | (b << 10) | (c << 20) | ((largest as u32) << 30))
    }

    fn try_compress(q: Quat) -> Result<SmallTreeDwordKey, TrackError> {
        let (largest, stored) = drop_largest(q);
        let a = try_quantize(stored[0], MAX_10BIT, 0x3ff)? as u32;
        let b = try_quantize(stored[1], MAX_10BIT, 0x3ff)? as u32;
        let c = try_quantize(stored[2], MAX_10BIT, 0x3ff)? as u32;
        Ok(SmallTreeDwordKey(a | (b << 10) | (c << 20) | ((largest as u32) << 30)))
    }

    fn decompress(&self) -> Quat {
        let largest = (self.0 >> 30) as usize;
        restore_largest(
            largest,
            [
                dequantize((self.0 & 0x3ff) as u64, MAX_10BIT),
                dequantize(((self.0 >> 10) & 0x3ff) as u64, MAX_10BIT),
                dequantize(((self.0 >> 20) & 0x3ff) as u64, MAX_10BIT),
            ],
        )
    }
}

impl SwapEndian for SmallTreeDwordKey {
    #[inline]
    fn swap_endian(self) -> SmallTreeDwordKey {
        SmallTreeDwordKey(self.0.swap_endian())
    }
}

impl ArchiveRead<SmallTreeDwordKey> for SmallTreeDwordKey {
    #[inline]
    fn read<R: Read>(archive: &mut Archive<R>) -> Result<SmallTreeDwordKey, TrackError> {
        Ok(SmallTreeDwordKey(archive.read()?))
    }
}

//
// SmallTree48
//

/// Three 15 bit components at bits 0/15/30 plus the dropped-component
/// index at bit 46, stored as three 16 bit words, 48 bits total.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmallTree48Key([u16; 3]);

impl SmallTree48Key {
    #[inline]
    fn from_bits(bits: u64) -> SmallTree48Key {
        SmallTree48Key([bits as u16, (bits >> 16) as u16, (bits >> 32) as u16])
    }

    #[inline]
    fn bits(&self) -> u64 {
        self.0[0] as u64 | ((self.0[1] as u64) << 16) | ((self.0[2] as u64) << 32)
    }
}

impl QuatKey for SmallTree48Key {
    const FORMAT: RotationFormat = RotationFormat::SmallTree48;

    fn compress(q: Quat) -> SmallTree48Key {
        let (largest, stored) = drop_largest(q);
        let a = quantize(stored[0], MAX_15BIT, 0x7fff);
        let b = quantize(stored[1], MAX_15BIT, 0x7fff);
        let c = quantize(stored[2], MAX_15BIT, 0x7fff);
        SmallTree48Key::from_bits(a | (b << 15) | (c << 30) | ((largest as u64) << 46))
    }

    fn try_compress(q: Quat) -> Result<SmallTree48Key, TrackError> {
        let (largest, stored) = drop_largest(q);
        let a = try_quantize(stored[0], MAX_15BIT, 0x7fff)?;
        let b = try_quantize(stored[1], MAX_15BIT, 0x7fff)?;
        let c = try_quantize(stored[2], MAX_15BIT, 0x7fff)?;
        Ok(SmallTree48Key::from_bits(
            a | (b << 15) | (c << 30) | ((largest as u64) << 46),
        ))
    }

    fn decompress(&self) -> Quat {
        let bits = self.bits();
        let largest = ((bits >> 46) & 0x3) as usize;
        restore_largest(
            largest,
            [
                dequantize(bits & 0x7fff, MAX_15BIT),
                dequantize((bits >> 15) & 0x7fff, MAX_15BIT),
                dequantize((bits >> 30) & 0x7fff, MAX_15BIT),
            ],
        )
    }
}

impl SwapEndian for SmallTree48Key {
    #[inline]
    fn swap_endian(self) -> SmallTree48Key {
        SmallTree48Key(self.0.swap_endian())
    }
}

impl ArchiveRead<SmallTree48Key> for SmallTree48Key {
    #[inline]
    fn read<R: Read>(archive: &mut Archive<R>) -> Result<SmallTree48Key, TrackError> {
        Ok(SmallTree48Key([archive.read()?, archive.read()?, archive.read()?]))
    }
}

//
// SmallTree64
//

/// Three 20 bit components at bits 0/20/40 plus the dropped-component
/// index at bit 62, 64 bits total. Highest practical precision.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmallTree64Key(u64);

impl QuatKey for SmallTree64Key {
    const FORMAT: RotationFormat = RotationFormat::SmallTree64;

    fn compress(q: Quat) -> SmallTree64Key {
        let (largest, stored) = drop_largest(q);
        let a = quantize(stored[0], MAX_20BIT, 0xfffff);
        let b = quantize(stored[1], MAX_20BIT, 0xfffff);
        let c = quantize(stored[2], MAX_20BIT, 0xfffff);
        SmallTree64Key(a | (b << 20) | (c << 40) | ((largest as u64) << 62))
    }

    fn try_compress(q: Quat) -> Result<SmallTree64Key, TrackError> {
        let (largest, stored) = drop_largest(q);
        let a = try_quantize(stored[0], MAX_20BIT, 0xfffff)?;
        let b = try_quantize(stored[1], MAX_20BIT, 0xfffff)?;
        let c = try_quantize(stored[2], MAX_20BIT, 0xfffff)?;
        Ok(SmallTree64Key(a | (b << 20) | (c << 40) | ((largest as u64) << 62)))
    }

    fn decompress(&self) -> Quat {
        let largest = (self.0 >> 62) as usize;
        restore_largest(
            largest,
            [
                dequantize(self.0 & 0xfffff, MAX_20BIT),
                dequantize((self.0 >> 20) & 0xfffff, MAX_20BIT),
                dequantize((self.0 >> 40) & 0xfffff, MAX_20BIT),
            ],
        )
    }
}

impl SwapEndian for SmallTree64Key {
    #[inline]
    fn swap_endian(self) -> SmallTree64Key {
        SmallTree64Key(self.0.swap_endian())
    }
}

impl ArchiveRead<SmallTree64Key> for SmallTree64Key {
    #[inline]
    fn read<R: Read>(archive: &mut Archive<R>) -> Result<SmallTree64Key, TrackError> {
        Ok(SmallTree64Key(archive.read()?))
    }
}

//
// SmallTree64Ext
//

/// Asymmetric 21+21+20 bit components at bits 0/21/42 plus the
/// dropped-component index at bit 62. The first two stored components get
/// one extra bit of precision.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SmallTree64ExtKey(u64);

impl SmallTree64ExtKey {
    #[inline]
    fn unpack(&self) -> (usize, u64, u64, u64) {
        (
            (self.0 >> 62) as usize,
            self.0 & 0x1fffff,
            (self.0 >> 21) & 0x1fffff,
            (self.0 >> 42) & 0xfffff,
        )
    }

    /// Lane-parallel decode of all stored components at once. Produces the
    /// same result as `decompress`.
    pub fn decompress_fast(&self) -> Quat {
        let (largest, a, b, c) = self.unpack();
        let packed = Vec4::new(a as f32, b as f32, c as f32, 0.0);
        let max = Vec4::new(MAX_21BIT, MAX_21BIT, MAX_20BIT, 1.0);
        let range = Vec4::new(
            QUAT_COMPONENT_RANGE,
            QUAT_COMPONENT_RANGE,
            QUAT_COMPONENT_RANGE,
            0.0,
        );
        let stored = packed / max - range;
        restore_largest(largest, [stored.x, stored.y, stored.z])
    }
}

impl QuatKey for SmallTree64ExtKey {
    const FORMAT: RotationFormat = RotationFormat::SmallTree64Ext;

    fn compress(q: Quat) -> SmallTree64ExtKey {
        let (largest, stored) = drop_largest(q);
        let a = quantize(stored[0], MAX_21BIT, 0x1fffff);
        let b = quantize(stored[1], MAX_21BIT, 0x1fffff);
        let c = quantize(stored[2], MAX_20BIT, 0xfffff);
        SmallTree64ExtKey(a | (b << 21) | (c << 42) | ((largest as u64) << 62))
    }

    fn try_compress(q: Quat) -> Result<SmallTree64ExtKey, TrackError> {
        let (largest, stored) = drop_largest(q);
        let a = try_quantize(stored[0], MAX_21BIT, 0x1fffff)?;
        let b = try_quantize(stored[1], MAX_21BIT, 0x1fffff)?;
        let c = try_quantize(stored[2], MAX_20BIT, 0xfffff)?;
        Ok(SmallTree64ExtKey(a | (b << 21) | (c << 42) | ((largest as u64) << 62)))
    }

    fn decompress(&self) -> Quat {
        let (largest, a, b, c) = self.unpack();
        restore_largest(
            largest,
            [
                dequantize(a, MAX_21BIT),
                dequantize(b, MAX_21BIT),
                dequantize(c, MAX_20BIT),
            ],
        )
    }
}

impl SwapEndian for SmallTree64ExtKey {
    #[inline]
    fn swap_endian(self) -> SmallTree64ExtKey {
        SmallTree64ExtKey(self.0.swap_endian())
    }
}

impl ArchiveRead<SmallTree64ExtKey> for SmallTree64ExtKey {
    #[inline]
    fn read<R: Read>(archive: &mut Archive<R>) -> Result<SmallTree64ExtKey, TrackError> {
        Ok(SmallTree64ExtKey(archive.read()?))
    }
}

//
// Polar
//

/// The non-w part converted to spherical yaw/pitch before quantizing,
/// stored with w as three i16, 48 bits total. Decode rebuilds the
/// Cartesian direction and rescales it by `sqrt(1 - w^2)`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PolarKey {
    yaw: i16,
    pitch: i16,
    w: i16,
}

impl PolarKey {
    #[inline]
    fn spherical(q: Quat) -> (f32, f32, f32) {
        let sign = if q.w < 0.0 { -1.0 } else { 1.0 };
        let (x, y, z, w) = (q.x * sign, q.y * sign, q.z * sign, q.w * sign);
        let r = (x * x + y * y + z * z).sqrt();
        if r < 1e-6 {
            return (0.0, 0.0, w);
        }
        (y.atan2(x), (z / r).clamp(-1.0, 1.0).asin(), w)
    }
}

impl QuatKey for PolarKey {
    const FORMAT: RotationFormat = RotationFormat::Polar;

    fn compress(q: Quat) -> PolarKey {
        let (yaw, pitch, w) = Self::spherical(q);
        PolarKey {
            yaw: (yaw * ANGLE_SCALE).round().clamp(-MAX_16BIT, MAX_16BIT) as i16,
            pitch: (pitch * ANGLE_SCALE).round().clamp(-MAX_16BIT, MAX_16BIT) as i16,
            w: (w * MAX_16BIT).round().clamp(-MAX_16BIT, MAX_16BIT) as i16,
        }
    }

    fn try_compress(q: Quat) -> Result<PolarKey, TrackError> {
        let (_, _, w) = Self::spherical(q);
        if (w * MAX_16BIT).round().abs() > MAX_16BIT {
            return Err(TrackError::PrecisionOverflow);
        }
        Ok(Self::compress(q))
    }

    fn decompress(&self) -> Quat {
        let w = self.w as f32 / MAX_16BIT;
        let r = (1.0 - w * w).max(0.0).sqrt();
        let yaw = self.yaw as f32 / ANGLE_SCALE;
        let pitch = self.pitch as f32 / ANGLE_SCALE;
        let (sin_yaw, cos_yaw) = yaw.sin_cos();
        let (sin_pitch, cos_pitch) = pitch.sin_cos();
        Quat::from_xyzw(
            r * cos_pitch * cos_yaw,
            r * cos_pitch * sin_yaw,
            r * sin_pitch,
            w,
        )
    }
}

impl SwapEndian for PolarKey {
    #[inline]
    fn swap_endian(self) -> PolarKey {
        PolarKey {
            yaw: self.yaw.swap_endian(),
            pitch: self.pitch.swap_endian(),
            w: self.w.swap_endian(),
        }
    }
}

impl ArchiveRead<PolarKey> for PolarKey {
    #[inline]
    fn read<R: Read>(archive: &mut Archive<R>) -> Result<PolarKey, TrackError> {
        Ok(PolarKey {
            yaw: archive.read()?,
            pitch: archive.read()?,
            w: archive.read()?,
        })
    }
}

// Wire sizes.
const_assert_eq!(mem::size_of::<RawQuatKey>(), 16);
const_assert_eq!(mem::size_of::<ShortInt3Key>(), 6);
const_assert_eq!(mem::size_of::<SmallTreeDwordKey>(), 4);
const_assert_eq!(mem::size_of::<SmallTree48Key>(), 6);
const_assert_eq!(mem::size_of::<SmallTree64Key>(), 8);
const_assert_eq!(mem::size_of::<SmallTree64ExtKey>(), 8);
const_assert_eq!(mem::size_of::<PolarKey>(), 6);

//
// Closed set of serialized formats
//

/// Rotation key storage, one homogeneous sequence per serialized format.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RotationKeys {
    Raw(Vec<RawQuatKey>),
    ShortInt3(Vec<ShortInt3Key>),
    SmallTreeDword(Vec<SmallTreeDwordKey>),
    SmallTree48(Vec<SmallTree48Key>),
    SmallTree64(Vec<SmallTree64Key>),
    SmallTree64Ext(Vec<SmallTree64ExtKey>),
    Polar(Vec<PolarKey>),
}

macro_rules! each_rotation_keys {
    ($self:expr, $keys:ident => $expr:expr) => {
        match $self {
            RotationKeys::Raw($keys) => $expr,
            RotationKeys::ShortInt3($keys) => $expr,
            RotationKeys::SmallTreeDword($keys) => $expr,
            RotationKeys::SmallTree48($keys) => $expr,
            RotationKeys::SmallTree64($keys) => $expr,
            RotationKeys::SmallTree64Ext($keys) => $expr,
            RotationKeys::Polar($keys) => $expr,
        }
    };
}

fn read_keys<K: QuatKey>(count: usize, archive: &mut Archive<impl Read>) -> Result<Vec<K>, TrackError> {
    archive.read_vec(count)
}

impl RotationKeys {
    /// Creates empty key storage of the given serialized format.
    pub fn new(format: RotationFormat) -> RotationKeys {
        match format {
            RotationFormat::Raw => RotationKeys::Raw(Vec::new()),
            RotationFormat::ShortInt3 => RotationKeys::ShortInt3(Vec::new()),
            RotationFormat::SmallTreeDword => RotationKeys::SmallTreeDword(Vec::new()),
            RotationFormat::SmallTree48 => RotationKeys::SmallTree48(Vec::new()),
            RotationFormat::SmallTree64 => RotationKeys::SmallTree64(Vec::new()),
            RotationFormat::SmallTree64Ext => RotationKeys::SmallTree64Ext(Vec::new()),
            RotationFormat::Polar => RotationKeys::Polar(Vec::new()),
        }
    }

    /// Reads `count` keys of the given serialized format from an `Archive`.
    pub fn from_archive(
        format: RotationFormat,
        count: usize,
        archive: &mut Archive<impl Read>,
    ) -> Result<RotationKeys, TrackError> {
        Ok(match format {
            RotationFormat::Raw => RotationKeys::Raw(read_keys(count, archive)?),
            RotationFormat::ShortInt3 => RotationKeys::ShortInt3(read_keys(count, archive)?),
            RotationFormat::SmallTreeDword => RotationKeys::SmallTreeDword(read_keys(count, archive)?),
            RotationFormat::SmallTree48 => RotationKeys::SmallTree48(read_keys(count, archive)?),
            RotationFormat::SmallTree64 => RotationKeys::SmallTree64(read_keys(count, archive)?),
            RotationFormat::SmallTree64Ext => RotationKeys::SmallTree64Ext(read_keys(count, archive)?),
            RotationFormat::Polar => RotationKeys::Polar(read_keys(count, archive)?),
        })
    }

    pub fn format(&self) -> RotationFormat {
        match self {
            RotationKeys::Raw(_) => RotationFormat::Raw,
            RotationKeys::ShortInt3(_) => RotationFormat::ShortInt3,
            RotationKeys::SmallTreeDword(_) => RotationFormat::SmallTreeDword,
            RotationKeys::SmallTree48(_) => RotationFormat::SmallTree48,
            RotationKeys::SmallTree64(_) => RotationFormat::SmallTree64,
            RotationKeys::SmallTree64Ext(_) => RotationFormat::SmallTree64Ext,
            RotationKeys::Polar(_) => RotationFormat::Polar,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        each_rotation_keys!(self, keys => keys.len())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes the key at `key`, or `None` past the end.
    pub fn get(&self, key: usize) -> Option<Quat> {
        each_rotation_keys!(self, keys => keys.get(key).map(|k| k.decompress()))
    }

    /// Encodes `value` at `key`. Silently ignored out of range.
    pub fn set(&mut self, key: usize, value: Quat) {
        each_rotation_keys!(self, keys => {
            if key < keys.len() {
                keys[key] = QuatKey::compress(value);
            }
        })
    }

    pub fn push(&mut self, value: Quat) {
        each_rotation_keys!(self, keys => keys.push(QuatKey::compress(value)))
    }

    pub fn try_push(&mut self, value: Quat) -> Result<(), TrackError> {
        each_rotation_keys!(self, keys => {
            keys.push(QuatKey::try_compress(value)?);
            Ok(())
        })
    }

    pub fn reserve(&mut self, additional: usize) {
        each_rotation_keys!(self, keys => keys.reserve(additional))
    }

    /// Grows with identity keys or truncates.
    pub fn resize(&mut self, len: usize) {
        each_rotation_keys!(self, keys => keys.resize(len, QuatKey::compress(Quat::IDENTITY)))
    }

    pub fn raw_byte_size(&self) -> usize {
        each_rotation_keys!(self, keys => mem::size_of_val(keys.as_slice()))
    }

    pub fn swap_endian(&mut self) {
        each_rotation_keys!(self, keys => keys.iter_mut().for_each(|k| *k = k.swap_endian()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn angle_between(a: Quat, b: Quat) -> f32 {
        // f32 acos is too ill-conditioned near 1 to resolve the tighter
        // format bounds, so measure in f64 on renormalized inputs
        let a = glam::DQuat::from_xyzw(a.x as f64, a.y as f64, a.z as f64, a.w as f64).normalize();
        let b = glam::DQuat::from_xyzw(b.x as f64, b.y as f64, b.z as f64, b.w as f64).normalize();
        (2.0 * a.dot(b).abs().clamp(0.0, 1.0).acos()) as f32
    }

    fn random_unit_quat(rng: &mut StdRng) -> Quat {
        loop {
            let q = Quat::from_xyzw(
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(-1.0f32..1.0),
                rng.gen_range(-1.0f32..1.0),
            );
            if q.length() > 1e-3 {
                return q.normalize();
            }
        }
    }

    fn round_trip_bound<K: QuatKey>(bound: f32) {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..1000 {
            let q = random_unit_quat(&mut rng);
            let out = K::compress(q).decompress();
            let angle = angle_between(q, out);
            assert!(angle <= bound, "{:?}: {q} -> {out}, angle {angle}", K::FORMAT);
            assert!((out.length() - 1.0).abs() <= 1e-6, "{:?}: |{out}| != 1", K::FORMAT);
        }
    }

    #[test]
    fn test_round_trip_raw() {
        round_trip_bound::<RawQuatKey>(1e-6);
    }

    #[test]
    fn test_round_trip_short_int3() {
        // reconstructing w from x,y,z is ill-conditioned near w == 0, so
        // only well-conditioned samples get the tight bound
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..1000 {
            let q = random_unit_quat(&mut rng);
            if q.w.abs() < 0.1 {
                continue;
            }
            let out = ShortInt3Key::compress(q).decompress();
            assert!(angle_between(q, out) <= 1e-3, "{q} -> {out}");
        }
    }

    #[test]
    fn test_round_trip_small_tree_dword() {
        round_trip_bound::<SmallTreeDwordKey>(1e-2);
    }

    #[test]
    fn test_round_trip_small_tree_48() {
        round_trip_bound::<SmallTree48Key>(3e-4);
    }

    #[test]
    fn test_round_trip_small_tree_64() {
        round_trip_bound::<SmallTree64Key>(1e-5);
    }

    #[test]
    fn test_round_trip_small_tree_64_ext() {
        round_trip_bound::<SmallTree64ExtKey>(1e-5);
    }

    #[test]
    fn test_round_trip_polar() {
        // the radial part sqrt(1 - w^2) is ill-conditioned near identity
        round_trip_bound::<PolarKey>(2e-2);
    }

    #[test]
    fn test_identity_small_tree_64() {
        let out = SmallTree64Key::compress(Quat::IDENTITY).decompress();
        assert_eq!(out.w, 1.0);
        assert!(out.x.abs() <= 1e-5 && out.y.abs() <= 1e-5 && out.z.abs() <= 1e-5);
        assert!(angle_between(out, Quat::IDENTITY) <= 1e-4);
    }

    #[test]
    fn test_sign_ambiguity() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let q = random_unit_quat(&mut rng);
            let a = SmallTree64Key::compress(q);
            let b = SmallTree64Key::compress(-q);
            assert_eq!(a, b, "sign normalization must make q and -q identical");
        }
    }

    #[test]
    fn test_largest_component_axes() {
        // each axis in turn forces a different dropped-component index
        let axes = [
            Quat::from_xyzw(1.0, 0.0, 0.0, 0.0),
            Quat::from_xyzw(0.0, 1.0, 0.0, 0.0),
            Quat::from_xyzw(0.0, 0.0, 1.0, 0.0),
            Quat::from_xyzw(0.0, 0.0, 0.0, 1.0),
            Quat::from_xyzw(0.0, 0.0, 0.0, -1.0),
        ];
        for q in axes {
            let out = SmallTree48Key::compress(q).decompress();
            assert!(angle_between(q, out) <= 3e-4, "{q} -> {out}");
        }
    }

    #[test]
    fn test_ext_fast_path_matches_scalar() {
        let mut rng = StdRng::seed_from_u64(0xfa57);
        for _ in 0..1000 {
            let key = SmallTree64ExtKey::compress(random_unit_quat(&mut rng));
            assert_eq!(key.decompress(), key.decompress_fast());
        }
    }

    #[test]
    fn test_strict_mode_overflow() {
        // not a unit quaternion: the second-largest component exceeds
        // 1/sqrt(2), outside every packed field range
        let bad = Quat::from_xyzw(1.0, 1.0, 0.0, 0.0);
        assert_eq!(
            SmallTreeDwordKey::try_compress(bad),
            Err(TrackError::PrecisionOverflow)
        );
        assert_eq!(SmallTree48Key::try_compress(bad), Err(TrackError::PrecisionOverflow));
        assert_eq!(SmallTree64Key::try_compress(bad), Err(TrackError::PrecisionOverflow));
        assert_eq!(
            SmallTree64ExtKey::try_compress(bad),
            Err(TrackError::PrecisionOverflow)
        );
        // lenient mode clamps and stays decodable
        let out = SmallTree64Key::compress(bad).decompress();
        assert!((out.length() - 1.0).abs() <= 1e-6);

        let good = Quat::from_xyzw(0.5, 0.5, 0.5, 0.5);
        assert!(SmallTree64Key::try_compress(good).is_ok());
        assert!(PolarKey::try_compress(good).is_ok());
        assert!(ShortInt3Key::try_compress(good).is_ok());
    }

    #[test]
    fn test_swap_endian_involution() {
        let q = Quat::from_xyzw(0.1, -0.2, 0.3, 0.927).normalize();
        let a = SmallTree48Key::compress(q);
        assert_ne!(a, a.swap_endian());
        assert_eq!(a, a.swap_endian().swap_endian());
        let b = PolarKey::compress(q);
        assert_eq!(b, b.swap_endian().swap_endian());
        let c = RawQuatKey::compress(q);
        assert_eq!(c, c.swap_endian().swap_endian());
    }

    #[test]
    fn test_rotation_keys_dispatch() {
        let q = Quat::from_xyzw(0.2, 0.4, 0.1, 0.884).normalize();
        for format in [
            RotationFormat::Raw,
            RotationFormat::ShortInt3,
            RotationFormat::SmallTreeDword,
            RotationFormat::SmallTree48,
            RotationFormat::SmallTree64,
            RotationFormat::SmallTree64Ext,
            RotationFormat::Polar,
        ] {
            let mut keys = RotationKeys::new(format);
            assert_eq!(keys.format(), format);
            assert!(keys.is_empty());
            keys.reserve(2);
            keys.push(q);
            keys.try_push(Quat::IDENTITY).unwrap();
            assert_eq!(keys.len(), 2);
            assert!(angle_between(keys.get(0).unwrap(), q) <= 8e-3, "{format:?}");
            assert_eq!(keys.get(2), None);

            // out-of-range set is silently ignored
            keys.set(5, Quat::IDENTITY);
            assert_eq!(keys.len(), 2);
            keys.set(0, Quat::IDENTITY);
            assert!(angle_between(keys.get(0).unwrap(), Quat::IDENTITY) <= 8e-3);

            keys.resize(4);
            assert_eq!(keys.len(), 4);
            keys.resize(1);
            assert_eq!(keys.len(), 1);

            keys.swap_endian();
            keys.swap_endian();
            assert!(angle_between(keys.get(0).unwrap(), Quat::IDENTITY) <= 8e-3);
        }
    }
}
