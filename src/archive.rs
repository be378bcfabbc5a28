//!
//! Binary reader over container-supplied raw buffers.
//!
//! The external chunk container owns all framing (format tags, counts,
//! endianness flag) and hands this reader a raw byte region plus the
//! source endianness. Values are swapped to host order while reading.
//!

use glam::{Quat, Vec3};
use std::io::{Cursor, Read};
use std::mem;

use crate::base::TrackError;
use crate::endian::{Endian, SwapEndian};

pub struct Archive<R: Read> {
    read: R,
    endian_swap: bool,
}

impl<R: Read> Archive<R> {
    /// Creates an `Archive` over a reader holding data in `endian` byte order.
    pub fn new(read: R, endian: Endian) -> Archive<R> {
        Archive {
            read,
            endian_swap: endian != Endian::native(),
        }
    }

    /// Reads `T` from the archive.
    pub fn read<T: ArchiveRead<T>>(&mut self) -> Result<T, TrackError> {
        T::read(self)
    }

    /// Reads `Vec<T>` from the archive.
    /// * `count` - The number of elements to read.
    pub fn read_vec<T: ArchiveRead<T>>(&mut self, count: usize) -> Result<Vec<T>, TrackError> {
        T::read_vec(self, count)
    }

    /// Does the endian need to be swapped.
    pub fn endian_swap(&self) -> bool {
        self.endian_swap
    }
}

impl<'t> Archive<Cursor<&'t [u8]>> {
    /// Creates an `Archive` over a raw byte buffer in `endian` byte order.
    pub fn from_slice(buf: &'t [u8], endian: Endian) -> Archive<Cursor<&'t [u8]>> {
        Archive::new(Cursor::new(buf), endian)
    }
}

/// Implements `ArchiveRead` to read `T` from an `Archive`.
pub trait ArchiveRead<T> {
    /// Reads `T` from the archive.
    fn read<R: Read>(archive: &mut Archive<R>) -> Result<T, TrackError>;

    /// Reads `Vec<T>` from the archive.
    /// * `count` - The number of elements to read.
    #[inline]
    fn read_vec<R: Read>(archive: &mut Archive<R>, count: usize) -> Result<Vec<T>, TrackError> {
        let mut buffer = Vec::with_capacity(count);
        for _ in 0..count {
            buffer.push(Self::read(archive)?);
        }
        Ok(buffer)
    }
}

macro_rules! primitive_reader {
    ($type:ty) => {
        impl ArchiveRead<$type> for $type {
            #[inline]
            fn read<R: Read>(archive: &mut Archive<R>) -> Result<$type, TrackError> {
                let mut buf = [0u8; mem::size_of::<$type>()];
                archive.read.read_exact(&mut buf)?;
                let val = <$type>::from_ne_bytes(buf);
                match archive.endian_swap {
                    true => Ok(val.swap_endian()),
                    false => Ok(val),
                }
            }
        }
    };
}

primitive_reader!(u8);
primitive_reader!(i8);
primitive_reader!(u16);
primitive_reader!(i16);
primitive_reader!(u32);
primitive_reader!(i32);
primitive_reader!(u64);
primitive_reader!(i64);
primitive_reader!(f32);
primitive_reader!(f64);

impl ArchiveRead<Vec3> for Vec3 {
    #[inline]
    fn read<R: Read>(archive: &mut Archive<R>) -> Result<Vec3, TrackError> {
        let x = f32::read(archive)?;
        let y = f32::read(archive)?;
        let z = f32::read(archive)?;
        Ok(Vec3::new(x, y, z))
    }
}

impl ArchiveRead<Quat> for Quat {
    #[inline]
    fn read<R: Read>(archive: &mut Archive<R>) -> Result<Quat, TrackError> {
        let x = f32::read(archive)?;
        let y = f32::read(archive)?;
        let z = f32::read(archive)?;
        let w = f32::read(archive)?;
        Ok(Quat::from_xyzw(x, y, z, w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_native() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x1234u16.to_ne_bytes());
        buf.extend_from_slice(&2.5f32.to_ne_bytes());
        let mut archive = Archive::from_slice(&buf, Endian::native());
        assert!(!archive.endian_swap());
        assert_eq!(archive.read::<u16>().unwrap(), 0x1234);
        assert_eq!(archive.read::<f32>().unwrap(), 2.5);
        assert!(archive.read::<u8>().unwrap_err().is_io());
    }

    #[test]
    fn test_read_swapped() {
        let foreign = match Endian::native() {
            Endian::Little => Endian::Big,
            Endian::Big => Endian::Little,
        };
        let mut buf = Vec::new();
        buf.extend_from_slice(&0x1234u16.swap_endian().to_ne_bytes());
        buf.extend_from_slice(&(-7i32).swap_endian().to_ne_bytes());
        buf.extend_from_slice(&2.5f32.swap_endian().to_ne_bytes());
        let mut archive = Archive::from_slice(&buf, foreign);
        assert!(archive.endian_swap());
        assert_eq!(archive.read::<u16>().unwrap(), 0x1234);
        assert_eq!(archive.read::<i32>().unwrap(), -7);
        assert_eq!(archive.read::<f32>().unwrap(), 2.5);
    }

    #[test]
    fn test_read_vec() {
        let mut buf = Vec::new();
        for v in [1.0f32, 2.0, 3.0] {
            buf.extend_from_slice(&v.to_ne_bytes());
        }
        let mut archive = Archive::from_slice(&buf, Endian::native());
        assert_eq!(archive.read_vec::<f32>(3).unwrap(), vec![1.0, 2.0, 3.0]);
    }
}
