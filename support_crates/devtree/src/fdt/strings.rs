//! Handling of the *strings* block
//!
//! Property names are not stored inline in the structure block; each property
//! record instead carries a byte offset into this block.
//! See [Spec Section 5.5](https://devicetree-specification.readthedocs.io/en/v0.3/flattened-format.html#strings-block).

use core::ffi::CStr;
use thiserror_no_std::Error;

#[derive(Debug, Error, Eq, PartialEq)]
pub enum StringsError {
    #[error("No string could be found at offset {0} in a strings block of size {1}")]
    OutOfBounds(usize, usize),
    #[error("There was data at offset {0} but it was not zero-terminated")]
    Unterminated(usize),
    #[error("The string at offset {0} is not valid UTF-8")]
    InvalidEncoding(usize),
}

/// A handle to the strings block of a device tree blob
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct Strings<'buf> {
    buf: &'buf [u8],
}

impl<'buf> Strings<'buf> {
    pub const fn from_buffer(buf: &'buf [u8]) -> Self {
        Self { buf }
    }

    /// A strings block with no content; every lookup fails
    pub const fn empty() -> Self {
        Self { buf: &[] }
    }

    /// Resolve the property name stored at `offset`
    pub fn get(&self, offset: usize) -> Result<&'buf str, StringsError> {
        let rest = self
            .buf
            .get(offset..)
            .ok_or(StringsError::OutOfBounds(offset, self.buf.len()))?;
        let name =
            CStr::from_bytes_until_nul(rest).map_err(|_| StringsError::Unterminated(offset))?;
        name.to_str()
            .map_err(|_| StringsError::InvalidEncoding(offset))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn get_resolves_offsets_into_the_block() {
        let strings = Strings::from_buffer(b"reg\0interrupts\0");
        assert_eq!(strings.get(0), Ok("reg"));
        assert_eq!(strings.get(4), Ok("interrupts"));
        // offsets may also point into the middle of a stored string
        assert_eq!(strings.get(10), Ok("upts"));
    }

    #[test]
    fn get_fails_outside_the_block() {
        let strings = Strings::from_buffer(b"reg\0");
        assert_eq!(strings.get(20), Err(StringsError::OutOfBounds(20, 4)));
    }

    #[test]
    fn get_fails_on_unterminated_data() {
        let strings = Strings::from_buffer(b"reg");
        assert_eq!(strings.get(0), Err(StringsError::Unterminated(0)));
    }
}
