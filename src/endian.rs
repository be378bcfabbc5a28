//!
//! Endianness tagging and in-place byte swapping for wire types.
//!

pub trait SwapEndian {
    fn swap_endian(self) -> Self;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

impl Endian {
    pub fn native() -> Endian {
        if cfg!(target_endian = "big") {
            Endian::Big
        } else {
            Endian::Little
        }
    }

    /// Maps the container's "is big-endian" flag.
    pub fn from_big_flag(big_endian: bool) -> Endian {
        if big_endian {
            Endian::Big
        } else {
            Endian::Little
        }
    }
}

macro_rules! int_swap_endian {
    ($type:ty) => {
        impl SwapEndian for $type {
            #[inline]
            fn swap_endian(self) -> $type {
                self.swap_bytes()
            }
        }
    };
}

int_swap_endian!(u8);
int_swap_endian!(i8);
int_swap_endian!(u16);
int_swap_endian!(i16);
int_swap_endian!(u32);
int_swap_endian!(i32);
int_swap_endian!(u64);
int_swap_endian!(i64);

impl SwapEndian for f32 {
    #[inline]
    fn swap_endian(self) -> f32 {
        f32::from_bits(self.to_bits().swap_bytes())
    }
}

impl SwapEndian for f64 {
    #[inline]
    fn swap_endian(self) -> f64 {
        f64::from_bits(self.to_bits().swap_bytes())
    }
}

impl<T: Copy + SwapEndian, const N: usize> SwapEndian for [T; N] {
    #[inline]
    fn swap_endian(mut self) -> [T; N] {
        self.iter_mut().for_each(|e| *e = e.swap_endian());
        self
    }
}

impl<'t, T: Copy + SwapEndian> SwapEndian for &'t mut [T] {
    fn swap_endian(self) -> &'t mut [T] {
        self.iter_mut().for_each(|e| *e = e.swap_endian());
        self
    }
}

impl<T: Copy + SwapEndian> SwapEndian for Vec<T> {
    fn swap_endian(mut self) -> Vec<T> {
        self.iter_mut().for_each(|e| *e = e.swap_endian());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_swap() {
        assert_eq!(0x1234u16.swap_endian(), 0x3412);
        assert_eq!(0x12345678u32.swap_endian(), 0x78563412);
        assert_eq!(1.0f32.swap_endian().to_bits(), 0x3f800000u32.swap_bytes());
        assert_eq!(1.0f32.swap_endian().swap_endian(), 1.0);
    }

    #[test]
    fn test_slice_swap() {
        let v = vec![0x0102u16, 0x0304];
        assert_eq!(v.swap_endian(), vec![0x0201, 0x0403]);
        let a = [0x01020304u32; 2];
        assert_eq!(a.swap_endian(), [0x04030201; 2]);
    }
}
