// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Read/write cursors for message buffers.
//!
//! Every field of an inbound message goes through [`Cursor`], which checks
//! the remaining length before each read and copies values out. Numeric
//! fields are little-endian on the wire except the PCI vendor id, which is
//! big-endian and gets its own accessor pair.

use super::{CodecError, CodecResult};

/// Generate little-endian read methods for primitive types.
///
/// Each generated method checks bounds (returns `CodecError::Length` on
/// underrun), copies the bytes out, converts via `from_le_bytes()` and
/// advances the offset.
macro_rules! impl_read_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> CodecResult<$type> {
            if self.offset + $size > self.buffer.len() {
                return Err(CodecError::Length {
                    offset: self.offset,
                    needed: self.offset + $size - self.buffer.len(),
                });
            }
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(&self.buffer[self.offset..self.offset + $size]);
            self.offset += $size;
            Ok(<$type>::from_le_bytes(bytes))
        }
    };
}

/// Generate little-endian write methods for primitive types.
macro_rules! impl_write_le {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self, value: $type) -> CodecResult<()> {
            if self.offset + $size > self.buffer.len() {
                return Err(CodecError::Length {
                    offset: self.offset,
                    needed: self.offset + $size - self.buffer.len(),
                });
            }
            self.buffer[self.offset..self.offset + $size].copy_from_slice(&value.to_le_bytes());
            self.offset += $size;
            Ok(())
        }
    };
}

/// Immutable cursor for decoding (bounds-checked, zero-copy).
pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_read_le!(read_u8, u8, 1);
    impl_read_le!(read_u16_le, u16, 2);
    impl_read_le!(read_u32_le, u32, 4);
    impl_read_le!(read_u64_le, u64, 8);
    impl_read_le!(read_i32_le, i32, 4);

    /// Read a u16 stored big-endian (PCI vendor id only).
    pub fn read_u16_be(&mut self) -> CodecResult<u16> {
        let le = self.read_u16_le()?;
        Ok(le.swap_bytes())
    }

    /// Borrow the next `len` bytes without copying.
    pub fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.offset + len > self.buffer.len() {
            return Err(CodecError::Length {
                offset: self.offset,
                needed: self.offset + len - self.buffer.len(),
            });
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Peek at the next byte without advancing.
    pub fn peek_u8(&self) -> CodecResult<u8> {
        self.buffer
            .get(self.offset)
            .copied()
            .ok_or(CodecError::Length { offset: self.offset, needed: 1 })
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }
}

/// Mutable cursor for encoding.
pub struct CursorMut<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> CursorMut<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_write_le!(write_u8, u8, 1);
    impl_write_le!(write_u16_le, u16, 2);
    impl_write_le!(write_u32_le, u32, 4);
    impl_write_le!(write_u64_le, u64, 8);
    impl_write_le!(write_i32_le, i32, 4);

    /// Write a u16 big-endian (PCI vendor id only).
    pub fn write_u16_be(&mut self, value: u16) -> CodecResult<()> {
        self.write_u16_le(value.swap_bytes())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> CodecResult<()> {
        if self.offset + data.len() > self.buffer.len() {
            return Err(CodecError::Length {
                offset: self.offset,
                needed: self.offset + data.len() - self.buffer.len(),
            });
        }
        self.buffer[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_primitives() {
        let buf = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.read_u8().unwrap(), 0x01);
        assert_eq!(cur.read_u16_le().unwrap(), 0x0302);
        assert_eq!(cur.read_u32_le().unwrap(), 0x07060504);
        assert_eq!(cur.remaining(), 1);
        assert!(matches!(cur.read_u16_le(), Err(CodecError::Length { .. })));
    }

    #[test]
    fn big_endian_vendor_id() {
        let buf = [0x10, 0xDE];
        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.read_u16_be().unwrap(), 0x10DE);

        let mut out = [0u8; 2];
        let mut w = CursorMut::new(&mut out);
        w.write_u16_be(0x10DE).unwrap();
        assert_eq!(out, [0x10, 0xDE]);
    }

    #[test]
    fn take_checks_bounds() {
        let buf = [1u8, 2, 3];
        let mut cur = Cursor::new(&buf);
        assert_eq!(cur.take(2).unwrap(), &[1, 2]);
        assert!(matches!(cur.take(2), Err(CodecError::Length { offset: 2, needed: 1 })));
        // Failed take must not advance.
        assert_eq!(cur.take(1).unwrap(), &[3]);
    }

    #[test]
    fn write_past_end_fails() {
        let mut buf = [0u8; 3];
        let mut w = CursorMut::new(&mut buf);
        w.write_u16_le(0xBEEF).unwrap();
        assert!(matches!(w.write_u32_le(1), Err(CodecError::Length { .. })));
        assert_eq!(w.offset(), 2);
    }

    #[test]
    fn arbitrary_prefix_never_panics() {
        let buf: Vec<u8> = (0..64).map(|_| fastrand::u8(..)).collect();
        for k in 0..buf.len() {
            let mut cur = Cursor::new(&buf[..k]);
            // Drain with mixed-width reads; only Length errors may surface.
            loop {
                let r = match cur.remaining() % 3 {
                    0 => cur.read_u32_le().map(|_| ()),
                    1 => cur.read_u8().map(|_| ()),
                    _ => cur.read_u16_le().map(|_| ()),
                };
                match r {
                    Ok(()) => {}
                    Err(CodecError::Length { .. }) => break,
                    Err(other) => panic!("unexpected error: {}", other),
                }
                if cur.remaining() == 0 {
                    break;
                }
            }
            assert!(cur.offset() <= k);
        }
    }
}
