//! Big-endian reading and writing utilities for class file data.
//!
//! Every multi-byte quantity in a class file is stored big-endian. This module provides the
//! [`crate::file::io::ClassIO`] trait, which describes how a primitive converts to and from its
//! big-endian representation, plus bounds-checked helpers built on it.
//!
//! # Key Components
//!
//! - [`crate::file::io::ClassIO`] - Trait implemented for `u8`, `i8`, `u16`, `i16`, `u32`, `i32`, `u64`, `i64`
//! - [`crate::file::io::read_be_at`] - Read a value at an offset and advance the offset
//! - [`crate::file::io::ByteSink`] - Append big-endian values to a growable buffer
//!
//! # Usage Examples
//!
//! ```rust
//! use classmend::file::io::{read_be_at, ByteSink};
//!
//! let mut out = Vec::new();
//! out.put::<u16>(0xCAFE);
//! out.put::<i32>(-1);
//!
//! let mut offset = 0;
//! assert_eq!(read_be_at::<u16>(&out, &mut offset)?, 0xCAFE);
//! assert_eq!(read_be_at::<i32>(&out, &mut offset)?, -1);
//! # Ok::<(), classmend::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be read from and written to class file data.
///
/// Each implementation defines a `Bytes` associated type that represents the fixed-size byte
/// array required for that type (e.g., `[u8; 4]` for `u32`).
pub trait ClassIO: Sized + Copy {
    /// Associated type representing the byte array type for this numeric type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in big-endian
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in big-endian
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
}

/// Safely reads a value of type `T` in big-endian byte order from a data buffer at a specific
/// offset, advancing the offset past the value.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes remaining.
pub fn read_be_at<T: ClassIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_be_bytes(read))
}

/// Append-only big-endian output, implemented for `Vec<u8>`.
pub trait ByteSink {
    /// Appends `value` in big-endian byte order.
    fn put<T: ClassIO>(&mut self, value: T);

    /// Appends raw bytes unchanged.
    fn put_bytes(&mut self, bytes: &[u8]);
}

impl ByteSink for Vec<u8> {
    fn put<T: ClassIO>(&mut self, value: T) {
        self.extend_from_slice(value.to_be_bytes().as_ref());
    }

    fn put_bytes(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_be_u16() {
        let mut offset = 0;
        let result = read_be_at::<u16>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0102);
        assert_eq!(offset, 2);
    }

    #[test]
    fn read_be_i32_at_offset() {
        let mut offset = 4;
        let result = read_be_at::<i32>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0506_0708);
        assert_eq!(offset, 8);
    }

    #[test]
    fn read_be_u64() {
        let mut offset = 0;
        let result = read_be_at::<u64>(&TEST_BUFFER, &mut offset).unwrap();
        assert_eq!(result, 0x0102_0304_0506_0708);
    }

    #[test]
    fn read_be_out_of_bounds() {
        let mut offset = 6;
        assert!(matches!(
            read_be_at::<u32>(&TEST_BUFFER, &mut offset),
            Err(OutOfBounds)
        ));
        assert_eq!(offset, 6);
    }

    #[test]
    fn sink_appends() {
        let mut out = Vec::new();
        out.put::<u8>(0xCA);
        out.put::<u32>(0xFEBA_BE00);
        out.put_bytes(&[1, 2]);
        assert_eq!(out, vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 1, 2]);
    }
}
