use thiserror::Error;

use super::Cpu;
use crate::error::Fault;

// ============================================================================
// Scalar Access
// ============================================================================

/// A value that can be loaded from or stored to guest memory.
///
/// Guest memory is little-endian and accesses need not be aligned.
pub trait Scalar: Copy {
    /// Width of the value in bytes.
    const WIDTH: usize;

    fn read_le(bytes: &[u8]) -> Self;

    fn write_le(self, bytes: &mut [u8]);
}

macro_rules! impl_scalar {
    ($($ty:ty),*) => {
        $(
            impl Scalar for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                #[inline(always)]
                fn read_le(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_le_bytes(buf)
                }

                #[inline(always)]
                fn write_le(self, bytes: &mut [u8]) {
                    bytes.copy_from_slice(&self.to_le_bytes());
                }
            }
        )*
    };
}

impl_scalar!(u8, i8, u16, i16, u32, i32);

/// An access that does not fit inside guest memory.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("access of {width} bytes at {addr:#010x} is out of bounds")]
pub struct OutOfBounds {
    pub addr: u32,
    pub width: usize,
}

// ============================================================================
// Guest Memory
// ============================================================================

/// Flat, byte-addressable guest memory of a fixed size.
pub struct Memory {
    data: Box<[u8]>,
}

impl Memory {
    /// Create a zero-filled memory of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0u8; size].into_boxed_slice(),
        }
    }

    /// Size in bytes.
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the memory has no bytes.
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The whole backing store.
    #[inline(always)]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Borrow `len` bytes starting at `addr`.
    #[inline(always)]
    pub fn bytes(&self, addr: u32, len: usize) -> Result<&[u8], OutOfBounds> {
        let start = addr as usize;
        start
            .checked_add(len)
            .and_then(|end| self.data.get(start..end))
            .ok_or(OutOfBounds { addr, width: len })
    }

    /// Mutably borrow `len` bytes starting at `addr`.
    #[inline(always)]
    pub fn bytes_mut(&mut self, addr: u32, len: usize) -> Result<&mut [u8], OutOfBounds> {
        let start = addr as usize;
        start
            .checked_add(len)
            .and_then(|end| self.data.get_mut(start..end))
            .ok_or(OutOfBounds { addr, width: len })
    }

    /// Load a little-endian value at `addr`.
    #[inline(always)]
    pub fn load<T: Scalar>(&self, addr: u32) -> Result<T, OutOfBounds> {
        self.bytes(addr, T::WIDTH).map(T::read_le)
    }

    /// Store a little-endian value at `addr`.
    #[inline(always)]
    pub fn store<T: Scalar>(&mut self, addr: u32, value: T) -> Result<(), OutOfBounds> {
        self.bytes_mut(addr, T::WIDTH).map(|bytes| value.write_le(bytes))
    }

    /// Copy `data` into memory at `addr`.
    pub fn write_bytes(&mut self, addr: u32, data: &[u8]) -> Result<(), OutOfBounds> {
        self.bytes_mut(addr, data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Store consecutive instruction words starting at `addr`.
    pub fn load_words(&mut self, addr: u32, words: &[u32]) -> Result<(), OutOfBounds> {
        for (i, word) in words.iter().enumerate() {
            let offset = addr.wrapping_add((i * 4) as u32);
            self.store(offset, *word)?;
        }
        Ok(())
    }
}

// ============================================================================
// Faulting Accessors
// ============================================================================

impl Cpu<'_> {
    /// Load from guest memory on behalf of the instruction at `pc`.
    ///
    /// An out-of-range access raises a fault and returns `None`.
    #[inline(always)]
    pub(crate) fn load<T: Scalar>(&mut self, pc: u32, addr: u32) -> Option<T> {
        match self.memory.load::<T>(addr) {
            Ok(value) => Some(value),
            Err(OutOfBounds { addr, width }) => {
                self.raise(Fault::Memory { pc, addr, width });
                None
            }
        }
    }

    /// Store to guest memory on behalf of the instruction at `pc`.
    #[inline(always)]
    pub(crate) fn store<T: Scalar>(&mut self, pc: u32, addr: u32, value: T) {
        if let Err(OutOfBounds { addr, width }) = self.memory.store(addr, value) {
            self.raise(Fault::Memory { pc, addr, width });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unaligned_round_trip() {
        let mut memory = Memory::new(64);
        memory.store::<u32>(3, 0xdead_beef).unwrap();
        assert_eq!(memory.load::<u32>(3), Ok(0xdead_beef));
        assert_eq!(memory.load::<u8>(3), Ok(0xef));
        assert_eq!(memory.load::<u16>(5), Ok(0xdead));
        assert_eq!(memory.load::<i8>(6), Ok(-34));
        assert_eq!(memory.load::<i16>(5), Ok(0xdeadu16 as i16));
    }

    #[test]
    fn test_bounds() {
        let mut memory = Memory::new(16);
        assert!(memory.store::<u32>(12, 1).is_ok());
        assert_eq!(
            memory.store::<u32>(13, 1),
            Err(OutOfBounds { addr: 13, width: 4 })
        );
        assert_eq!(
            memory.load::<u16>(u32::MAX),
            Err(OutOfBounds {
                addr: u32::MAX,
                width: 2
            })
        );
        assert!(memory.bytes(16, 0).is_ok());
        assert!(memory.bytes(17, 0).is_err());
    }

    #[test]
    fn test_load_words_little_endian() {
        let mut memory = Memory::new(16);
        memory.load_words(4, &[0x0403_0201, 0x0807_0605]).unwrap();
        assert_eq!(memory.bytes(4, 8).unwrap(), &[1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
