// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tagged-field (TLV) primitive for variable-shape telemetry records.
//!
//! A field is `{tag: u8}` followed by a descriptor byte (bit 0: valid flag,
//! bits 3..1: length class, bits 7..4: reserved) and inline little-endian
//! data. The length class selects a data size of `1 << class` bytes for
//! classes 0..=4, i.e. one of {1, 2, 4, 8, 16}; higher classes are a decode
//! error. A decoder consumes exactly the class-declared size and never
//! advances past the remaining byte count.

use super::cursor::Cursor;
use super::{CodecError, CodecResult};

/// Tag byte + descriptor byte.
pub const FIELD_OVERHEAD: usize = 2;

const VALID_BIT: u8 = 0x01;
const CLASS_SHIFT: u8 = 1;
const CLASS_MASK: u8 = 0x07;
const CLASS_MAX: u8 = 4;

/// One decoded tagged field. `data` is exactly the class-declared size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedField<'a> {
    pub tag: u8,
    pub valid: bool,
    pub data: &'a [u8],
}

impl<'a> TaggedField<'a> {
    fn fixed<const N: usize>(&self) -> CodecResult<[u8; N]> {
        if self.data.len() != N {
            return Err(CodecError::Data { reason: "wrong width for tagged field" });
        }
        let mut out = [0u8; N];
        out.copy_from_slice(self.data);
        Ok(out)
    }

    pub fn as_u8(&self) -> CodecResult<u8> {
        Ok(self.fixed::<1>()?[0])
    }

    pub fn as_u16(&self) -> CodecResult<u16> {
        Ok(u16::from_le_bytes(self.fixed::<2>()?))
    }

    pub fn as_u32(&self) -> CodecResult<u32> {
        Ok(u32::from_le_bytes(self.fixed::<4>()?))
    }

    pub fn as_u64(&self) -> CodecResult<u64> {
        Ok(u64::from_le_bytes(self.fixed::<8>()?))
    }

    pub fn as_bytes16(&self) -> CodecResult<[u8; 16]> {
        self.fixed::<16>()
    }
}

/// Append one tagged field. The data length must be a legal class size.
pub fn encode_field(out: &mut Vec<u8>, tag: u8, valid: bool, data: &[u8]) -> CodecResult<()> {
    let class = match data.len() {
        1 => 0u8,
        2 => 1,
        4 => 2,
        8 => 3,
        16 => 4,
        _ => return Err(CodecError::Data { reason: "illegal tagged-field width" }),
    };
    out.push(tag);
    out.push((class << CLASS_SHIFT) | u8::from(valid));
    out.extend_from_slice(data);
    Ok(())
}

/// Streaming decoder over a tagged-field region.
///
/// Iteration ends at the declared field count or at buffer exhaustion,
/// whichever comes first; a field whose declared size overruns the buffer
/// is a `Length` error, not silent truncation.
pub struct AggregateDecoder<'a> {
    cur: Cursor<'a>,
    remaining_fields: u16,
}

impl<'a> AggregateDecoder<'a> {
    pub fn new(data: &'a [u8], field_count: u16) -> Self {
        Self { cur: Cursor::new(data), remaining_fields: field_count }
    }

    /// Fields still expected per the declared count.
    pub fn remaining_fields(&self) -> u16 {
        self.remaining_fields
    }

    /// Tag of the next field, if a whole field header remains.
    pub fn peek_tag(&self) -> Option<u8> {
        if self.remaining_fields == 0 || self.cur.remaining() < FIELD_OVERHEAD {
            None
        } else {
            self.cur.peek_u8().ok()
        }
    }

    /// Decode the next field, or `None` once the region is done.
    pub fn next_field(&mut self) -> CodecResult<Option<TaggedField<'a>>> {
        if self.remaining_fields == 0 || self.cur.remaining() < FIELD_OVERHEAD {
            return Ok(None);
        }
        let tag = self.cur.read_u8()?;
        let descriptor = self.cur.read_u8()?;
        let class = (descriptor >> CLASS_SHIFT) & CLASS_MASK;
        if class > CLASS_MAX {
            return Err(CodecError::Data { reason: "reserved tagged-field length class" });
        }
        let data = self.cur.take(1usize << class)?;
        self.remaining_fields -= 1;
        Ok(Some(TaggedField { tag, valid: descriptor & VALID_BIT != 0, data }))
    }
}
