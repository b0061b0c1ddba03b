//! Owned byte arena backing emulated RAM and flash.
//!
//! All "pointer into RAM" patterns elsewhere in the emulator are
//! (region, offset) pairs resolved through the MMU; the arena is the only
//! place bytes actually live. Every operation is bounds-checked and fails
//! loudly — a copy that would overflow the arena aborts instead of
//! truncating.

use crate::common::error::MemFault;

/// A fixed-size, zero-initialized byte arena.
#[derive(Clone, Debug)]
pub struct MemoryArena {
    bytes: Vec<u8>,
}

impl MemoryArena {
    /// Allocates a zero-filled arena of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0; len],
        }
    }

    /// Creates an arena holding an initial image, padded with zeros to `len`.
    ///
    /// # Errors
    ///
    /// Fails if the image is larger than the arena.
    pub fn with_image(len: usize, image: &[u8]) -> Result<Self, MemFault> {
        let mut arena = Self::new(len);
        arena.write(0, image)?;
        Ok(arena)
    }

    /// Returns the arena length in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns whether the arena is zero-sized.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Copies bytes out of the arena.
    ///
    /// # Errors
    ///
    /// Fails with [`MemFault::CopyOverflow`] if the range exceeds the arena.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<(), MemFault> {
        let range = self.checked_range(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[range]);
        Ok(())
    }

    /// Copies bytes into the arena.
    ///
    /// # Errors
    ///
    /// Fails with [`MemFault::CopyOverflow`] if the range exceeds the arena.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), MemFault> {
        let range = self.checked_range(offset, data.len())?;
        self.bytes[range].copy_from_slice(data);
        Ok(())
    }

    fn checked_range(&self, offset: u64, len: usize) -> Result<std::ops::Range<usize>, MemFault> {
        let start = usize::try_from(offset).map_err(|_| MemFault::CopyOverflow { offset, len })?;
        let end = start
            .checked_add(len)
            .filter(|&e| e <= self.bytes.len())
            .ok_or(MemFault::CopyOverflow { offset, len })?;
        Ok(start..end)
    }
}
