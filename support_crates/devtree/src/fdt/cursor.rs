//! A position-tracking reader for the big-endian token stream of a FDT
//!
//! All multi-byte scalars inside a device tree blob are stored big-endian
//! regardless of the host byte order, and the structure block requires the
//! read position to be realigned to a 4-byte boundary after variable-length
//! data (names and property values). The [`Cursor`] encapsulates both rules.

use core::ffi::CStr;
use core::mem;
use thiserror_no_std::Error;

/// The FDT_BEGIN_NODE token marks the beginning of a node's representation.
/// It is followed by the node's unit name as a null-terminated string plus
/// padding up to the next token boundary.
const FDT_BEGIN_NODE: u32 = 0x00000001;

/// The FDT_END_NODE token marks the end of a node's representation.
/// It carries no extra data.
const FDT_END_NODE: u32 = 0x00000002;

/// The FDT_PROP token marks one property record: value length, name offset
/// into the strings block, and the raw value bytes plus padding.
const FDT_PROP: u32 = 0x00000003;

/// The FDT_NOP token is ignored by parsers. It allows nodes and properties
/// to be overwritten in place without moving the rest of the blob.
const FDT_NOP: u32 = 0x00000004;

/// The FDT_END token marks the end of the structure block.
/// There shall be only one and it shall be the last token in the block.
const FDT_END: u32 = 0x00000009;

/// A structure block token, decoded from its on-disk big-endian value.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum Token {
    BeginNode,
    EndNode,
    Prop,
    Nop,
    End,
}

/// Errors that can occur while pulling data from the underlying buffer
#[derive(Debug, Error, Eq, PartialEq)]
pub enum CursorError {
    /// The buffer ended before the requested data could be read
    #[error("The buffer ended at position {pos} before {wanted} more bytes could be read")]
    UnexpectedEnd { pos: usize, wanted: usize },
    /// A token slot held a value that is not a known FDT token
    #[error("The value {token:#010x} at position {pos} is not a known structure token")]
    UnknownToken { pos: usize, token: u32 },
    /// A name string was not terminated before the buffer ended
    #[error("The string starting at position {pos} is not null-terminated")]
    UnterminatedString { pos: usize },
    /// A name string contained bytes outside the character set allowed for node names
    #[error("The string starting at position {pos} is not valid UTF-8")]
    InvalidString { pos: usize },
}

/// A reader over a byte buffer that honors the FDT byte-order and alignment rules
#[derive(Debug, Eq, PartialEq, Clone)]
pub struct Cursor<'buf> {
    buf: &'buf [u8],
    pos: usize,
}

impl<'buf> Cursor<'buf> {
    pub const fn new(buf: &'buf [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// The current read position in bytes from the start of the buffer
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Whether all bytes of the buffer have been consumed
    pub fn is_at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Take the next `count` raw bytes without any realignment
    fn take(&mut self, count: usize) -> Result<&'buf [u8], CursorError> {
        match self.buf.get(self.pos..self.pos + count) {
            Some(bytes) => {
                self.pos += count;
                Ok(bytes)
            }
            None => Err(CursorError::UnexpectedEnd {
                pos: self.pos,
                wanted: count,
            }),
        }
    }

    /// Advance the position to the next 4-byte token boundary
    fn realign(&mut self) {
        const ALIGNMENT: usize = mem::align_of::<u32>();
        self.pos = (self.pos + ALIGNMENT - 1) & !(ALIGNMENT - 1);
    }

    /// Read one big-endian `u32` and advance past it
    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        let bytes = self.take(mem::size_of::<u32>())?;
        Ok(u32::from_be_bytes(bytes.try_into().unwrap()))
    }

    /// Read one big-endian `u64` and advance past it
    pub fn read_u64(&mut self) -> Result<u64, CursorError> {
        let bytes = self.take(mem::size_of::<u64>())?;
        Ok(u64::from_be_bytes(bytes.try_into().unwrap()))
    }

    /// Read the next structure token.
    ///
    /// A word that is not one of the five defined tokens makes the blob
    /// malformed and is surfaced as [`CursorError::UnknownToken`].
    pub fn read_token(&mut self) -> Result<Token, CursorError> {
        let pos = self.pos;
        let word = self.read_u32()?;
        match word {
            FDT_BEGIN_NODE => Ok(Token::BeginNode),
            FDT_END_NODE => Ok(Token::EndNode),
            FDT_PROP => Ok(Token::Prop),
            FDT_NOP => Ok(Token::Nop),
            FDT_END => Ok(Token::End),
            token => Err(CursorError::UnknownToken { pos, token }),
        }
    }

    /// Read a null-terminated name string and realign to the next token boundary
    pub fn read_name(&mut self) -> Result<&'buf str, CursorError> {
        let pos = self.pos;
        let rest = self
            .buf
            .get(self.pos..)
            .ok_or(CursorError::UnexpectedEnd { pos, wanted: 1 })?;
        let name = CStr::from_bytes_until_nul(rest)
            .map_err(|_| CursorError::UnterminatedString { pos })?;
        self.pos += name.to_bytes_with_nul().len();
        self.realign();
        name.to_str().map_err(|_| CursorError::InvalidString { pos })
    }

    /// Read `len` raw value bytes and realign to the next token boundary
    pub fn read_bytes(&mut self, len: usize) -> Result<&'buf [u8], CursorError> {
        let bytes = self.take(len)?;
        self.realign();
        Ok(bytes)
    }
}
