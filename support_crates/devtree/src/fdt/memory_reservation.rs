//! Handling of the memory reservation block
//!
//! The block lists physical memory areas which the boot firmware has set
//! aside and which must not be handed to a general allocator.
//! See [Spec Section 5.3](https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html#memory-reservation-block).

use crate::fdt::cursor::Cursor;
use core::mem;
use thiserror_no_std::Error;

/// A single entry of the memory reservation block.
///
/// Each entry gives the physical address and size in bytes of a reserved
/// memory region. The list is terminated by an entry whose address and size
/// are both zero.
#[derive(Debug, Eq, PartialEq)]
pub struct MemoryReservationEntry {
    /// The address at which the memory reservation starts
    pub address: u64,
    /// The length in bytes of the memory reservation
    pub size: u64,
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum MemoryReservationFormatError {
    /// The memory reservation block is not aligned to an 8-byte boundary
    #[error("The memory reservation block is not aligned to an 8-byte boundary")]
    InvalidAlignment,
    /// The buffer ended before a terminator entry was found
    #[error("The memory reservation block does not contain a proper terminator")]
    NoTerminator,
}

/// An iterator over the reservation entries of a device tree blob.
///
/// Iteration stops at the all-zero terminator entry, never at a count.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct MemoryReservationBlock<'buf> {
    cursor: Option<Cursor<'buf>>,
}

impl<'buf> MemoryReservationBlock<'buf> {
    /// Parse a memory reservation block from an underlying buffer.
    ///
    /// The buffer must begin at the blocks first entry and extend at least up
    /// to its terminator.
    pub fn from_buffer(buf: &'buf [u8]) -> Result<Self, MemoryReservationFormatError> {
        if buf.as_ptr() as usize % mem::align_of::<u64>() != 0 {
            return Err(MemoryReservationFormatError::InvalidAlignment);
        }

        // walk the block once to verify that a terminator exists
        let mut probe = Cursor::new(buf);
        loop {
            let address = probe
                .read_u64()
                .map_err(|_| MemoryReservationFormatError::NoTerminator)?;
            let size = probe
                .read_u64()
                .map_err(|_| MemoryReservationFormatError::NoTerminator)?;
            if address == 0 && size == 0 {
                break;
            }
        }

        Ok(Self {
            cursor: Some(Cursor::new(buf)),
        })
    }
}

impl<'buf> Iterator for MemoryReservationBlock<'buf> {
    type Item = MemoryReservationEntry;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        let address = cursor.read_u64().ok()?;
        let size = cursor.read_u64().ok()?;

        if address == 0 && size == 0 {
            self.cursor = None;
            return None;
        }

        Some(MemoryReservationEntry { address, size })
    }
}
