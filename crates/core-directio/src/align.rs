//! Padding of sealed buffers to the device block size.

use std::fmt;
use std::ops::{Deref, DerefMut};

use crate::Error;

/// Unit of cache-bypassing transfers. Always a non-zero power of two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSize(usize);

impl BlockSize {
    pub const DEFAULT: BlockSize = BlockSize(4096);

    pub fn new(n: usize) -> Result<Self, Error> {
        if n == 0 || !n.is_power_of_two() {
            return Err(Error::InvalidBlockSize(n));
        }
        Ok(Self(n))
    }

    pub fn get(self) -> usize {
        self.0
    }

    /// Smallest multiple of the block size that is >= `len`.
    pub fn round_up(self, len: usize) -> usize {
        (len + self.0 - 1) / self.0 * self.0
    }
}

impl Default for BlockSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zero-initialised buffer whose start address and length are both block aligned.
pub struct AlignedBuffer {
    storage: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedBuffer {
    pub fn zeroed(len: usize, block: BlockSize) -> Self {
        let align = block.get();
        // Over-allocate by one block and start at the first aligned address.
        // The heap allocation does not move when the Vec does.
        let storage = vec![0u8; len + align];
        let addr = storage.as_ptr() as usize;
        let offset = (align - addr % align) % align;
        Self { storage, offset, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }
}

impl Deref for AlignedBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl DerefMut for AlignedBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.as_mut_slice()
    }
}

impl fmt::Debug for AlignedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AlignedBuffer({} bytes)", self.len)
    }
}

/// Copy `buf` into a zero-padded buffer whose length is a multiple of `block`.
pub fn align(buf: &[u8], block: BlockSize) -> AlignedBuffer {
    let mut out = AlignedBuffer::zeroed(block.round_up(buf.len()), block);
    out[..buf.len()].copy_from_slice(buf);
    out
}

/// Length up to and including the last non-zero byte; 0 when the buffer is all zero.
///
/// Under-reports when the payload itself ends in zero bytes, so callers that
/// decrypt the result need a fallback (see [`crate::unseal_aligned`]).
pub fn recover_length(buf: &[u8]) -> usize {
    buf.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1)
}
