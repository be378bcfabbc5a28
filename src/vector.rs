//!
//! Vector codec: position and scale keys.
//!
//! Only direct float storage is exercised in practice; the enum seam
//! exists so a compressed vector format can be added without touching the
//! track types.
//!

use glam::Vec3;
use static_assertions::const_assert_eq;
use std::io::Read;
use std::mem;

use crate::archive::{Archive, ArchiveRead};
use crate::base::{TrackError, VectorFormat};
use crate::endian::SwapEndian;

/// Three raw f32 components, 96 bits.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Vec3Key([f32; 3]);

impl Vec3Key {
    #[inline]
    pub fn compress(v: Vec3) -> Vec3Key {
        Vec3Key([v.x, v.y, v.z])
    }

    #[inline]
    pub fn decompress(&self) -> Vec3 {
        Vec3::new(self.0[0], self.0[1], self.0[2])
    }
}

impl SwapEndian for Vec3Key {
    #[inline]
    fn swap_endian(self) -> Vec3Key {
        Vec3Key(self.0.swap_endian())
    }
}

impl ArchiveRead<Vec3Key> for Vec3Key {
    #[inline]
    fn read<R: Read>(archive: &mut Archive<R>) -> Result<Vec3Key, TrackError> {
        Ok(Vec3Key([archive.read()?, archive.read()?, archive.read()?]))
    }
}

const_assert_eq!(mem::size_of::<Vec3Key>(), 12);

/// Position/scale key storage, one homogeneous sequence per serialized
/// format.
#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VectorKeys {
    Raw(Vec<Vec3Key>),
}

impl VectorKeys {
    /// Creates empty key storage of the given serialized format.
    pub fn new(format: VectorFormat) -> VectorKeys {
        match format {
            VectorFormat::Raw => VectorKeys::Raw(Vec::new()),
        }
    }

    /// Reads `count` keys of the given serialized format from an `Archive`.
    pub fn from_archive(
        format: VectorFormat,
        count: usize,
        archive: &mut Archive<impl Read>,
    ) -> Result<VectorKeys, TrackError> {
        Ok(match format {
            VectorFormat::Raw => VectorKeys::Raw(archive.read_vec(count)?),
        })
    }

    pub fn format(&self) -> VectorFormat {
        match self {
            VectorKeys::Raw(_) => VectorFormat::Raw,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match self {
            VectorKeys::Raw(keys) => keys.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decodes the key at `key`, or `None` past the end.
    pub fn get(&self, key: usize) -> Option<Vec3> {
        match self {
            VectorKeys::Raw(keys) => keys.get(key).map(|k| k.decompress()),
        }
    }

    /// Encodes `value` at `key`. Silently ignored out of range.
    pub fn set(&mut self, key: usize, value: Vec3) {
        match self {
            VectorKeys::Raw(keys) => {
                if key < keys.len() {
                    keys[key] = Vec3Key::compress(value);
                }
            }
        }
    }

    pub fn push(&mut self, value: Vec3) {
        match self {
            VectorKeys::Raw(keys) => keys.push(Vec3Key::compress(value)),
        }
    }

    pub fn reserve(&mut self, additional: usize) {
        match self {
            VectorKeys::Raw(keys) => keys.reserve(additional),
        }
    }

    /// Grows with zero keys or truncates.
    pub fn resize(&mut self, len: usize) {
        match self {
            VectorKeys::Raw(keys) => keys.resize(len, Vec3Key::default()),
        }
    }

    pub fn raw_byte_size(&self) -> usize {
        match self {
            VectorKeys::Raw(keys) => mem::size_of_val(keys.as_slice()),
        }
    }

    pub fn swap_endian(&mut self) {
        match self {
            VectorKeys::Raw(keys) => keys.iter_mut().for_each(|k| *k = k.swap_endian()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let v = Vec3::new(1.5, -2.25, 0.125);
        assert_eq!(Vec3Key::compress(v).decompress(), v);
    }

    #[test]
    fn test_vector_keys() {
        let mut keys = VectorKeys::new(VectorFormat::Raw);
        assert_eq!(keys.format(), VectorFormat::Raw);
        assert!(keys.is_empty());
        keys.push(Vec3::new(1.0, 2.0, 3.0));
        keys.push(Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(keys.len(), 2);
        assert_eq!(keys.raw_byte_size(), 24);
        assert_eq!(keys.get(1), Some(Vec3::new(4.0, 5.0, 6.0)));
        assert_eq!(keys.get(2), None);

        keys.set(9, Vec3::ZERO);
        assert_eq!(keys.len(), 2);
        keys.set(1, Vec3::ONE);
        assert_eq!(keys.get(1), Some(Vec3::ONE));

        keys.swap_endian();
        keys.swap_endian();
        assert_eq!(keys.get(0), Some(Vec3::new(1.0, 2.0, 3.0)));
    }
}
