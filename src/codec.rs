//! Fixed-layout binary packing: a compile-time macro that expands a field
//! list into pack/unpack functions, instead of a runtime format string.
//!
//! Byte order is a property of the call site, not a global: page-internal
//! structures are little-endian, the tuple nulls bitmap is big-endian.
//! These are intentionally different and must never be unified.

use crate::error::{Error, ErrorKind, Result};

/// Byte order for a single `pack`/`unpack` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

macro_rules! rw_prim {
    ($ty:ty, $read_le:ident, $read_be:ident, $write_le:ident, $write_be:ident) => {
        pub fn $read_le(buf: &[u8]) -> $ty {
            <$ty>::from_le_bytes(buf[..std::mem::size_of::<$ty>()].try_into().unwrap())
        }
        pub fn $read_be(buf: &[u8]) -> $ty {
            <$ty>::from_be_bytes(buf[..std::mem::size_of::<$ty>()].try_into().unwrap())
        }
        pub fn $write_le(v: $ty, out: &mut Vec<u8>) {
            out.extend_from_slice(&v.to_le_bytes());
        }
        pub fn $write_be(v: $ty, out: &mut Vec<u8>) {
            out.extend_from_slice(&v.to_be_bytes());
        }
    };
}

rw_prim!(u16, read_u16_le, read_u16_be, write_u16_le, write_u16_be);
rw_prim!(u32, read_u32_le, read_u32_be, write_u32_le, write_u32_be);
rw_prim!(u64, read_u64_le, read_u64_be, write_u64_le, write_u64_be);
rw_prim!(i32, read_i32_le, read_i32_be, write_i32_le, write_i32_be);
rw_prim!(i64, read_i64_le, read_i64_be, write_i64_le, write_i64_be);
rw_prim!(f32, read_f32_le, read_f32_be, write_f32_le, write_f32_be);
rw_prim!(f64, read_f64_le, read_f64_be, write_f64_le, write_f64_be);

/// Read a value of the given endianness, dispatching on `Endian` at the call site.
pub fn read_u32(buf: &[u8], endian: Endian) -> u32 {
    match endian {
        Endian::Little => read_u32_le(buf),
        Endian::Big => read_u32_be(buf),
    }
}

pub fn write_u32(v: u32, endian: Endian, out: &mut Vec<u8>) {
    match endian {
        Endian::Little => write_u32_le(v, out),
        Endian::Big => write_u32_be(v, out),
    }
}

pub fn read_u64(buf: &[u8], endian: Endian) -> u64 {
    match endian {
        Endian::Little => read_u64_le(buf),
        Endian::Big => read_u64_be(buf),
    }
}

pub fn write_u64(v: u64, endian: Endian, out: &mut Vec<u8>) {
    match endian {
        Endian::Little => write_u64_le(v, out),
        Endian::Big => write_u64_be(v, out),
    }
}

/// Checked slice fetch used throughout the decoders below: on-disk corruption
/// must surface as `ErrorKind::Corrupt`, never a panic.
pub fn take<'a>(buf: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8]> {
    buf.get(offset..offset + len).ok_or_else(|| {
        Error::with_message(
            ErrorKind::Corrupt,
            format!(
                "buffer of {} bytes too short to read {} bytes at offset {}",
                buf.len(),
                len,
                offset
            ),
        )
    })
}

/// Declares a fixed-layout little-endian struct with a generated `pack`
/// (`Vec<u8>`) and `unpack` (`&[u8] -> Result<Self>`) pair. Field order is
/// insertion order, exactly as laid out in the macro invocation.
macro_rules! define_struct {
    ($(#[$meta:meta])* $vis:vis struct $name:ident { $($field:ident : $ty:ty),+ $(,)? }) => {
        $(#[$meta])*
        $vis struct $name {
            $(pub $field: $ty),+
        }

        impl $name {
            pub const SIZE: usize = 0 $(+ std::mem::size_of::<$ty>())+;

            pub fn pack(&self) -> Vec<u8> {
                let mut out = Vec::with_capacity(Self::SIZE);
                $(out.extend_from_slice(&self.$field.to_le_bytes());)+
                out
            }

            pub fn unpack(buf: &[u8]) -> $crate::error::Result<Self> {
                if buf.len() < Self::SIZE {
                    return Err($crate::error::Error::with_message(
                        $crate::error::ErrorKind::Corrupt,
                        format!("{} needs {} bytes, got {}", stringify!($name), Self::SIZE, buf.len()),
                    ));
                }
                let mut offset = 0usize;
                $(
                    let width = std::mem::size_of::<$ty>();
                    let $field = <$ty>::from_le_bytes(buf[offset..offset + width].try_into().unwrap());
                    offset += width;
                )+
                Ok(Self { $($field),+ })
            }
        }
    };
}

pub(crate) use define_struct;

#[cfg(test)]
mod tests {
    use super::*;

    define_struct! {
        #[derive(Debug, Clone, PartialEq, Eq, Default)]
        pub struct Demo {
            a: u32,
            b: u64,
            c: i32,
        }
    }

    #[test]
    fn struct_round_trips() {
        let d = Demo { a: 7, b: 99, c: -3 };
        let bytes = d.pack();
        assert_eq!(bytes.len(), Demo::SIZE);
        let back = Demo::unpack(&bytes).unwrap();
        assert_eq!(d, back);
    }

    #[test]
    fn endian_helpers_round_trip() {
        let mut out = Vec::new();
        write_u32_le(0xdead_beef, &mut out);
        assert_eq!(read_u32_le(&out), 0xdead_beef);

        let mut out_be = Vec::new();
        write_u64_be(0x0102_0304_0506_0708, &mut out_be);
        assert_eq!(read_u64_be(&out_be), 0x0102_0304_0506_0708);
    }

    #[test]
    fn take_reports_corrupt_on_short_buffer() {
        let buf = [0u8; 4];
        let err = take(&buf, 0, 8).unwrap_err();
        assert_eq!(err.code, ErrorKind::Corrupt);
    }
}
