//! The FDT header present at the start of every device tree blob
//!
//! Modelled according to [Spec Section 5.2](https://devicetree-specification.readthedocs.io/en/latest/chapter5-flattened-format.html#header).
//! All header fields are 32-bit integers stored in big-endian format.

use crate::fdt::cursor::{Cursor, CursorError};
use core::mem;
use thiserror_no_std::Error;

const HEADER_MAGIC: u32 = 0xd00dfeed;

/// The last-compatible-version a blob must declare for this parser to accept it
const SUPPORTED_COMP_VERSION: u32 = 16;

/// Errors that can occur when reading the FDT header
#[derive(Debug, Error, Eq, PartialEq)]
pub enum HeaderReadError {
    /// The provided buffer did not contain the required magic bytes at the start
    #[error("The provided buffer did not contain the required magic bytes at the start")]
    InvalidMagic,
    /// The provided buffer did not contain enough bytes to read a header from it
    #[error("The provided buffer did not contain enough bytes to read a header from it")]
    BufferTooSmall,
    /// The device tree blob is encoded using an unsupported version
    #[error("The device tree blob is encoded using version {0} (last compatible version {1}) which is not supported")]
    UnsupportedVersion(u32, u32),
    /// The device tree blob is not aligned to an 8-byte boundary
    #[error("The device tree blob is not aligned to an 8-byte boundary")]
    InvalidAlignment,
}

impl From<CursorError> for HeaderReadError {
    fn from(_: CursorError) -> Self {
        // the header is a fixed run of u32 fields so the only cursor failure
        // mode here is running out of bytes
        HeaderReadError::BufferTooSmall
    }
}

/// The decoded FDT header fields
#[derive(Debug, Eq, PartialEq)]
pub struct FdtHeader {
    /// Shall contain the value 0xd00dfeed
    pub magic: u32,
    /// Total size in bytes of the blob, covering all blocks and the gaps between them
    pub total_size: u32,
    /// Offset in bytes of the structure block from the beginning of the header
    pub off_dt_struct: u32,
    /// Offset in bytes of the strings block from the beginning of the header
    pub off_dt_strings: u32,
    /// Offset in bytes of the memory reservation block from the beginning of the header
    pub off_mem_rsvmap: u32,
    /// Version of the devicetree data structure
    pub version: u32,
    /// Lowest version with which the used version is backwards compatible.
    /// Boot programs are required to supply a structure backwards compatible with version 16.
    pub last_comp_version: u32,
    /// Physical ID of the system's boot CPU
    pub boot_cpuid_phys: u32,
    /// Length in bytes of the strings block
    pub size_dt_strings: u32,
    /// Length in bytes of the structure block
    pub size_dt_struct: u32,
}

impl FdtHeader {
    /// Try to read a header from a provided buffer
    pub fn read_from_buffer(buf: &[u8]) -> Result<Self, HeaderReadError> {
        if (buf.as_ptr() as usize) % 8 != 0 {
            return Err(HeaderReadError::InvalidAlignment);
        }

        let mut cursor = Cursor::new(buf);
        let magic = cursor.read_u32()?;
        if magic != HEADER_MAGIC {
            return Err(HeaderReadError::InvalidMagic);
        }

        let header = Self {
            magic,
            total_size: cursor.read_u32()?,
            off_dt_struct: cursor.read_u32()?,
            off_dt_strings: cursor.read_u32()?,
            off_mem_rsvmap: cursor.read_u32()?,
            version: cursor.read_u32()?,
            last_comp_version: cursor.read_u32()?,
            boot_cpuid_phys: cursor.read_u32()?,
            size_dt_strings: cursor.read_u32()?,
            size_dt_struct: cursor.read_u32()?,
        };

        if header.last_comp_version != SUPPORTED_COMP_VERSION {
            return Err(HeaderReadError::UnsupportedVersion(
                header.version,
                header.last_comp_version,
            ));
        }

        Ok(header)
    }

    /// Try to read a header from a provided memory location
    ///
    /// # Safety
    /// The given pointer must be valid and the backing memory must be readable
    /// for at least 40 bytes after it.
    pub unsafe fn from_ptr(ptr: *const u8) -> Result<Self, HeaderReadError> {
        let buf = core::slice::from_raw_parts::<u8>(ptr, mem::size_of::<FdtHeader>());
        Self::read_from_buffer(buf)
    }
}
