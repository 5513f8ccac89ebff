//! Cursor-based reader for class file structures and instruction streams.
//!
//! [`crate::file::parser::Parser`] wraps a byte slice and a position. All reads are big-endian
//! and bounds-checked; a failed read leaves the position untouched.
//!
//! # Key Components
//!
//! - [`crate::file::parser::Parser`] - The cursor itself
//! - [`crate::file::parser::decode_modified_utf8`] - Decoder for `CONSTANT_Utf8` payloads
//! - [`crate::file::parser::encode_modified_utf8`] - The matching encoder
//!
//! # Usage Examples
//!
//! ```rust
//! use classweave::Parser;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x03];
//! let mut parser = Parser::new(&data);
//! assert_eq!(parser.read_be::<u32>()?, 0xCAFE_BABE);
//! assert_eq!(parser.read_be::<u16>()?, 3);
//! assert!(!parser.has_more_data());
//! # Ok::<(), classweave::Error>(())
//! ```

use crate::{
    file::io::{read_be_at, ClassIO},
    Result,
};

/// A simple big-endian parser over a byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true while unread bytes remain.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Number of bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Skip `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `step` bytes remain.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if step > self.remaining() {
            return Err(out_of_bounds_error!());
        }

        self.position += step;
        Ok(())
    }

    /// Current position.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Skip padding so the position becomes a multiple of `alignment`.
    ///
    /// Used for the operand padding of `tableswitch` and `lookupswitch`, which is aligned
    /// relative to the start of the code array.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the padding crosses the end of the data.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a big-endian value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the value crosses the end of the data.
    pub fn read_be<T: ClassIO>(&mut self) -> Result<T> {
        read_be_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `len` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(out_of_bounds_error!());
        }

        let bytes = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(bytes)
    }

    /// Read a `u16` length followed by that many bytes of modified UTF-8.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input and [`crate::Error::Malformed`]
    /// for byte sequences that are not valid modified UTF-8.
    pub fn read_utf8(&mut self) -> Result<String> {
        let len = self.read_be::<u16>()?;
        let bytes = self.read_bytes(usize::from(len))?;
        decode_modified_utf8(bytes)
    }
}

/// Decode the "modified UTF-8" used by `CONSTANT_Utf8` entries.
///
/// Differences from standard UTF-8: `U+0000` is encoded as `C0 80` and supplementary
/// characters are encoded as two three-byte surrogates. Unpaired surrogates are decoded to
/// `U+FFFD`.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for truncated or invalid sequences.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String> {
    if let Ok(plain) = std::str::from_utf8(bytes) {
        if !plain.contains('\0') {
            return Ok(plain.to_string());
        }
    }

    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        if b0 & 0x80 == 0 {
            units.push(u16::from(b0));
            i += 1;
        } else if b0 & 0xE0 == 0xC0 {
            let Some(&b1) = bytes.get(i + 1) else {
                return Err(malformed_error!("Truncated modified UTF-8 at {}", i));
            };
            units.push((u16::from(b0 & 0x1F) << 6) | u16::from(b1 & 0x3F));
            i += 2;
        } else if b0 & 0xF0 == 0xE0 {
            let (Some(&b1), Some(&b2)) = (bytes.get(i + 1), bytes.get(i + 2)) else {
                return Err(malformed_error!("Truncated modified UTF-8 at {}", i));
            };
            units.push(
                (u16::from(b0 & 0x0F) << 12) | (u16::from(b1 & 0x3F) << 6) | u16::from(b2 & 0x3F),
            );
            i += 3;
        } else {
            return Err(malformed_error!("Invalid modified UTF-8 lead byte {:#04x}", b0));
        }
    }

    Ok(String::from_utf16_lossy(&units))
}

/// Encode a string as modified UTF-8 (see [`decode_modified_utf8`]).
#[must_use]
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    if !value.contains('\0') && value.chars().all(|c| (c as u32) < 0x10000) {
        return value.as_bytes().to_vec();
    }

    let mut out = Vec::with_capacity(value.len() + 4);
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) as u8 & 0x1F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) as u8 & 0x0F));
                out.push(0x80 | ((unit >> 6) as u8 & 0x3F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
        }
    }
    out
}
