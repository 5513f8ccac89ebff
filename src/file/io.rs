//! Bounds-checked big-endian reading and writing of primitive values.
//!
//! Every multi-byte quantity in a class file is stored big-endian. This module provides the
//! small set of primitives the parser, the writer and the code splicer build on.
//!
//! # Key Components
//!
//! - [`crate::file::io::ClassIO`] - Trait describing how a primitive converts from and to bytes
//! - [`crate::file::io::read_be`] - Read a value from the start of a buffer
//! - [`crate::file::io::read_be_at`] - Read a value at an offset and advance the offset
//! - [`crate::file::io::write_be_at`] - Overwrite a value at an offset and advance the offset
//!
//! # Usage Examples
//!
//! ```rust,ignore
//! use classweave::file::io::{read_be_at, write_be_at};
//!
//! let mut code = [0xA7, 0x00, 0x05];
//! let mut offset = 1;
//! let branch: i16 = read_be_at(&code, &mut offset)?;
//! assert_eq!(branch, 5);
//!
//! let mut offset = 1;
//! write_be_at(&mut code, &mut offset, 9i16)?;
//! assert_eq!(code, [0xA7, 0x00, 0x09]);
//! # Ok::<(), classweave::Error>(())
//! ```
//!
//! # Thread Safety
//!
//! All functions are pure and operate only on the buffers passed in.

use crate::Result;

/// Trait for primitive values that can be read from and written to big-endian byte buffers.
///
/// The associated `Bytes` type is the fixed-size array backing the value (e.g. `[u8; 4]` for
/// `u32`), which keeps every conversion free of allocation.
pub trait ClassIO: Sized {
    /// Byte array representation of the value.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read the value from big-endian bytes
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Convert the value to big-endian bytes
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_class_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl ClassIO for $ty {
                type Bytes = [u8; $len];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_class_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
    f32 => 4,
    f64 => 8,
}

/// Read a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_be<T: ClassIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_be_at(data, &mut offset)
}

/// Read a value of type `T` at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would cross the end of `data`.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_be_bytes(read))
}

/// Write `value` at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the write would cross the end of `data`.
pub fn write_be_at<T: ClassIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    data[*offset..end].copy_from_slice(value.to_be_bytes().as_ref());
    *offset = end;
    Ok(())
}
