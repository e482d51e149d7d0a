// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read/write cursors for the binary format.
//!
//! `Writer` grows a `Vec<u8>` and supports patch-back at recorded positions
//! (total file length and per-type offsets are only known after body
//! encoding). `Reader` is a bounds-checked little-endian cursor over the
//! loaded input; every overrun is a typed error, never a panic.

use crate::error::{Error, Result};

/// Generate little-endian write methods for fixed-width integers.
macro_rules! impl_write_le {
    ($name:ident, $type:ty) => {
        pub fn $name(&mut self, value: $type) {
            self.buf.extend_from_slice(&value.to_le_bytes());
        }
    };
}

/// Generate little-endian read methods for fixed-width integers.
macro_rules! impl_read_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> Result<$type> {
            if self.offset + $size > self.buf.len() {
                return Err(Error::read_failed(self.offset, "unexpected end of input"));
            }
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(&self.buf[self.offset..self.offset + $size]);
            self.offset += $size;
            Ok(<$type>::from_le_bytes(bytes))
        }
    };
}

/// Growable write cursor.
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Writer {
        Writer { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Writer {
        Writer {
            buf: Vec::with_capacity(cap),
        }
    }

    /// Current write position (equals bytes written so far).
    pub fn pos(&self) -> usize {
        self.buf.len()
    }

    impl_write_le!(write_u8, u8);
    impl_write_le!(write_u16, u16);
    impl_write_le!(write_u32, u32);
    impl_write_le!(write_u64, u64);
    impl_write_le!(write_i32, i32);
    impl_write_le!(write_i64, i64);

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// u16-length-prefixed UTF-8 string (type and member names).
    pub fn write_str(&mut self, s: &str) -> Result<()> {
        let len = u16::try_from(s.len()).map_err(|_| Error::LimitExceeded { what: "name" })?;
        self.write_u16(len);
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Overwrite 8 bytes at `pos` with a little-endian u64. `pos` must have
    /// been produced by [`Writer::pos`] before a matching placeholder write.
    pub fn patch_u64(&mut self, pos: usize, value: u64) {
        debug_assert!(pos + 8 <= self.buf.len());
        self.buf[pos..pos + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn patch_i64(&mut self, pos: usize, value: i64) {
        self.patch_u64(pos, value as u64);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

impl Default for Writer {
    fn default() -> Writer {
        Writer::new()
    }
}

/// Bounds-checked read cursor.
pub struct Reader<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Reader<'a> {
        Reader { buf, offset: 0 }
    }

    /// Cursor positioned at `offset` into `buf`.
    pub fn at(buf: &'a [u8], offset: usize) -> Result<Reader<'a>> {
        if offset > buf.len() {
            return Err(Error::read_failed(offset, "offset beyond end of input"));
        }
        Ok(Reader { buf, offset })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.offset)
    }

    impl_read_le!(read_u8, u8, 1);
    impl_read_le!(read_u16, u16, 2);
    impl_read_le!(read_u32, u32, 4);
    impl_read_le!(read_u64, u64, 8);
    impl_read_le!(read_i32, i32, 4);
    impl_read_le!(read_i64, i64, 8);

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.offset + len > self.buf.len() {
            return Err(Error::read_failed(self.offset, "unexpected end of input"));
        }
        let slice = &self.buf[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// u16-length-prefixed UTF-8 string.
    pub fn read_str(&mut self) -> Result<String> {
        let len = self.read_u16()? as usize;
        let bytes = self.read_bytes(len)?;
        Ok(std::str::from_utf8(bytes)?.to_string())
    }
}

/// Wire flag of an object reference. `Base` omits the subtype index (the
/// declared type is exact: sealed, or a builtin); `Derived` carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefFlag {
    Null,
    Base,
    Derived,
}

impl RefFlag {
    pub fn wire_tag(self) -> u8 {
        match self {
            RefFlag::Null => 0,
            RefFlag::Base => 1,
            RefFlag::Derived => 2,
        }
    }

    pub fn read(r: &mut Reader<'_>) -> Result<RefFlag> {
        let offset = r.offset();
        let tag = r.read_u8()?;
        match tag {
            0 => Ok(RefFlag::Null),
            1 => Ok(RefFlag::Base),
            2 => Ok(RefFlag::Derived),
            _ => Err(Error::BadRefFlag { flag: tag, offset }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_roundtrip() {
        let mut w = Writer::new();
        w.write_u8(0xAB);
        w.write_u16(0x1234);
        w.write_u32(0xDEAD_BEEF);
        w.write_u64(u64::MAX - 1);
        w.write_i32(-5);
        w.write_i64(i64::MIN);
        w.write_str("person").unwrap();
        let buf = w.into_bytes();

        let mut r = Reader::new(&buf);
        assert_eq!(r.read_u8().unwrap(), 0xAB);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(r.read_u64().unwrap(), u64::MAX - 1);
        assert_eq!(r.read_i32().unwrap(), -5);
        assert_eq!(r.read_i64().unwrap(), i64::MIN);
        assert_eq!(r.read_str().unwrap(), "person");
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn truncated_read_is_typed_error() {
        let buf = [0x01, 0x02];
        let mut r = Reader::new(&buf);
        let err = r.read_u32().unwrap_err();
        assert!(matches!(err, Error::ReadFailed { offset: 0, .. }));
    }

    #[test]
    fn patch_back() {
        let mut w = Writer::new();
        w.write_u32(7);
        let pos = w.pos();
        w.write_u64(0); // placeholder
        w.write_u8(9);
        w.patch_u64(pos, 0x0102_0304_0506_0708);
        let buf = w.into_bytes();
        let mut r = Reader::new(&buf);
        assert_eq!(r.read_u32().unwrap(), 7);
        assert_eq!(r.read_u64().unwrap(), 0x0102_0304_0506_0708);
        assert_eq!(r.read_u8().unwrap(), 9);
    }

    #[test]
    fn oversized_name_is_rejected() {
        let mut w = Writer::new();
        let err = w.write_str(&"x".repeat(70_000)).unwrap_err();
        assert!(matches!(err, Error::LimitExceeded { what: "name" }));
    }

    #[test]
    fn bad_ref_flag() {
        let buf = [9u8];
        let mut r = Reader::new(&buf);
        assert!(matches!(
            RefFlag::read(&mut r),
            Err(Error::BadRefFlag { flag: 9, offset: 0 })
        ));
    }
}
