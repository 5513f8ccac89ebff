//! Growable big-endian output buffer used to re-materialize class files.
//!
//! Length-prefixed structures (attributes, the code array) are written by reserving the
//! length field first and patching it once the payload is complete, see
//! [`Writer::reserve_u32`] and [`Writer::patch_u32`].

use crate::{
    file::io::{write_be_at, ClassIO},
    file::parser::encode_modified_utf8,
    Result,
};

/// Big-endian byte sink.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Writer::default()
    }

    /// Create an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Writer {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    /// Append a big-endian value.
    pub fn write_be<T: ClassIO>(&mut self, value: T) {
        self.buf.extend_from_slice(value.to_be_bytes().as_ref());
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Append a count as `u16`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `count` does not fit in 16 bits.
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        let Ok(count) = u16::try_from(count) else {
            return Err(malformed_error!("Count {} does not fit in u16", count));
        };
        self.write_be(count);
        Ok(())
    }

    /// Append a `u16` length prefix followed by the modified UTF-8 encoding of `value`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the encoded string exceeds 65535 bytes.
    pub fn write_utf8(&mut self, value: &str) -> Result<()> {
        let encoded = encode_modified_utf8(value);
        self.write_count(encoded.len())?;
        self.write_bytes(&encoded);
        Ok(())
    }

    /// Append a placeholder `u32` and return its position for [`Writer::patch_u32`].
    pub fn reserve_u32(&mut self) -> usize {
        let at = self.buf.len();
        self.write_be(0_u32);
        at
    }

    /// Overwrite the `u32` at `at` with the number of bytes written after it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `at` was not produced by
    /// [`Writer::reserve_u32`], and [`crate::Error::Malformed`] if the payload is too long.
    pub fn patch_u32(&mut self, at: usize) -> Result<()> {
        let Some(len) = self.buf.len().checked_sub(at + 4) else {
            return Err(out_of_bounds_error!());
        };
        let Ok(len) = u32::try_from(len) else {
            return Err(malformed_error!("Attribute payload of {} bytes is too long", len));
        };
        let mut offset = at;
        write_be_at(&mut self.buf, &mut offset, len)
    }

    /// Consume the writer and return the bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

impl From<Writer> for Vec<u8> {
    fn from(writer: Writer) -> Self {
        writer.into_inner()
    }
}
