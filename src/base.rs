//!
//! Base types: errors, serialized format tags, controller flags.
//!

use thiserror::Error;

/// Track codec error type.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackError {
    /// A time index with zero keys was queried.
    #[error("Empty track")]
    EmptyTrack,
    /// A quantized component magnitude exceeds the packed field range.
    #[error("Precision overflow")]
    PrecisionOverflow,
    /// A serialized format tag has no known mapping.
    #[error("Invalid format tag {0}")]
    InvalidFormat(u8),
    /// A key index is outside the track.
    #[error("Invalid key index")]
    InvalidKey,

    /// Std io errors while reading raw buffers.
    #[error("IO error: {0}")]
    IO(std::io::ErrorKind),
}

impl From<std::io::Error> for TrackError {
    fn from(err: std::io::Error) -> Self {
        TrackError::IO(err.kind())
    }
}

impl TrackError {
    pub fn is_empty_track(&self) -> bool {
        matches!(self, TrackError::EmptyTrack)
    }

    pub fn is_precision_overflow(&self) -> bool {
        matches!(self, TrackError::PrecisionOverflow)
    }

    pub fn is_invalid_format(&self) -> bool {
        matches!(self, TrackError::InvalidFormat(_))
    }

    pub fn is_invalid_key(&self) -> bool {
        matches!(self, TrackError::InvalidKey)
    }

    pub fn is_io(&self) -> bool {
        matches!(self, TrackError::IO(_))
    }
}

/// Serialized storage format of one rotation key.
///
/// Tag values appear in serialized streams and must never be renumbered.
/// The gap at 0/2 belongs to the non-quaternion formats of the same stream
/// enum (see `VectorFormat`).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RotationFormat {
    /// Four raw f32 components, 128 bits.
    Raw = 1,
    /// x,y,z as i16, w dropped with sign normalization, 48 bits.
    ShortInt3 = 3,
    /// Three 10 bit components plus 2 bit largest index, 32 bits.
    SmallTreeDword = 4,
    /// Three 15 bit components plus index at bit 46, 48 bits.
    SmallTree48 = 5,
    /// Three 20 bit components plus index at bit 62, 64 bits.
    SmallTree64 = 6,
    /// Yaw/pitch/w as i16, 48 bits.
    Polar = 7,
    /// 21+21+20 bit components plus index at bit 62, 64 bits.
    SmallTree64Ext = 8,
}

impl RotationFormat {
    pub fn from_tag(tag: u8) -> Result<RotationFormat, TrackError> {
        match tag {
            1 => Ok(RotationFormat::Raw),
            3 => Ok(RotationFormat::ShortInt3),
            4 => Ok(RotationFormat::SmallTreeDword),
            5 => Ok(RotationFormat::SmallTree48),
            6 => Ok(RotationFormat::SmallTree64),
            7 => Ok(RotationFormat::Polar),
            8 => Ok(RotationFormat::SmallTree64Ext),
            _ => Err(TrackError::InvalidFormat(tag)),
        }
    }

    pub fn tag(&self) -> u8 {
        *self as u8
    }
}

/// Serialized storage format of one position/scale key.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VectorFormat {
    /// Three raw f32 components, 96 bits.
    Raw = 2,
}

impl VectorFormat {
    pub fn from_tag(tag: u8) -> Result<VectorFormat, TrackError> {
        match tag {
            2 => Ok(VectorFormat::Raw),
            _ => Err(TrackError::InvalidFormat(tag)),
        }
    }

    pub fn tag(&self) -> u8 {
        *self as u8
    }
}

/// Serialized storage format of a track's key-time sequence.
///
/// Tag values appear in serialized streams and must never be renumbered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum KeyTimesFormat {
    /// Every key time as f32.
    F32 = 0,
    /// Every key time as u16.
    U16 = 1,
    /// Every key time as u8.
    U8 = 2,
    /// Two f32 endpoints, keys one unit apart.
    F32StartStop = 3,
    /// Two u16 endpoints, keys one unit apart.
    U16StartStop = 4,
    /// Two u8 endpoints, keys one unit apart.
    U8StartStop = 5,
    /// One bit per time unit inside a [start, end] range.
    Bitset = 6,
}

impl KeyTimesFormat {
    pub fn from_tag(tag: u8) -> Result<KeyTimesFormat, TrackError> {
        match tag {
            0 => Ok(KeyTimesFormat::F32),
            1 => Ok(KeyTimesFormat::U16),
            2 => Ok(KeyTimesFormat::U8),
            3 => Ok(KeyTimesFormat::F32StartStop),
            4 => Ok(KeyTimesFormat::U16StartStop),
            5 => Ok(KeyTimesFormat::U8StartStop),
            6 => Ok(KeyTimesFormat::Bitset),
            _ => Err(TrackError::InvalidFormat(tag)),
        }
    }

    pub fn tag(&self) -> u8 {
        *self as u8
    }
}

/// Controller flag: the controlled joint's geometry changes at runtime,
/// not just its transform.
pub const CONTROLLER_DYNAMIC: u32 = 0x1;

/// Status bit: the sample carries a rotation.
pub const CHANNEL_ROTATION: u8 = 0x1;
/// Status bit: the sample carries a position.
pub const CHANNEL_POSITION: u8 = 0x2;
/// Status bit: the sample carries a scale.
pub const CHANNEL_SCALE: u8 = 0x4;
