// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type 6 firmware commands: the multi-slot security-processor state query.
//!
//! The response is a tagged aggregate: a header record (policies, active
//! slot, slot count, boot status) followed by one record per firmware slot.
//! Each slot record is introduced by the slot-id tag; encountering that tag
//! inside a record means the next record has begun and the tag is left for
//! the next pass. The slot vector is preallocated only once the slot count
//! (itself a tagged field) is known.

use super::aggregate::{encode_field, AggregateDecoder, FIELD_OVERHEAD};
use super::cursor::Cursor;
use super::header::{decode_response, encode_request, encode_response, ResponseInfo};
use super::{CodecError, CodecResult, CompletionCode, MessageType};

pub const CMD_QUERY_EROT_STATE: u8 = 0x01;

/// Field tags of the state aggregate.
pub mod tag {
    pub const BACKGROUND_COPY_POLICY: u8 = 1;
    pub const ACTIVE_FIRMWARE_SLOT: u8 = 2;
    pub const ACTIVE_KEY_SET: u8 = 3;
    pub const WRITE_PROTECT_STATE: u8 = 4;
    pub const FIRMWARE_SLOT_COUNT: u8 = 5;
    pub const FIRMWARE_SLOT_ID: u8 = 6;
    pub const FIRMWARE_VERSION_STRING: u8 = 7;
    pub const VERSION_COMPARISON_STAMP: u8 = 8;
    pub const BUILD_TYPE: u8 = 9;
    pub const SIGNING_TYPE: u8 = 10;
    pub const FIRMWARE_STATE: u8 = 11;
    pub const SECURITY_VERSION_NUMBER: u8 = 12;
    pub const MINIMUM_SECURITY_VERSION_NUMBER: u8 = 13;
    pub const SIGNING_KEY_INDEX: u8 = 14;
    pub const INBAND_UPDATE_POLICY: u8 = 15;
    pub const BOOT_STATUS_CODE: u8 = 16;
}

/// Component addressed by a state query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErotStateRequest {
    pub component_classification: u16,
    pub component_identifier: u16,
    pub classification_index: u8,
}

/// Header record of the state aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErotStateHeader {
    pub background_copy_policy: u8,
    pub active_slot: u8,
    pub active_keyset: u8,
    pub minimum_security_version: u16,
    pub inband_update_policy: u8,
    pub slot_count: u8,
    pub boot_status_code: u64,
}

/// One firmware-slot record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlotInfo {
    pub slot_id: u8,
    pub version: String,
    pub version_comparison_stamp: u32,
    pub build_type: u8,
    pub signing_type: u8,
    pub write_protect_state: u8,
    pub firmware_state: u8,
    pub security_version_number: u16,
    pub signing_key_index: u16,
}

/// Fully decoded state response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErotState {
    pub header: ErotStateHeader,
    pub slots: Vec<SlotInfo>,
}

pub fn encode_erot_state_req(instance_id: u8, req: &ErotStateRequest) -> CodecResult<Vec<u8>> {
    let mut data = Vec::with_capacity(5);
    data.extend_from_slice(&req.component_classification.to_le_bytes());
    data.extend_from_slice(&req.component_identifier.to_le_bytes());
    data.push(req.classification_index);
    encode_request(instance_id, MessageType::Firmware, CMD_QUERY_EROT_STATE, &data)
}

pub fn decode_erot_state_req(msg: &[u8]) -> CodecResult<ErotStateRequest> {
    let (_, command, data) = super::header::decode_request(msg)?;
    if command != CMD_QUERY_EROT_STATE {
        return Err(CodecError::Data { reason: "wrong command code" });
    }
    let mut cur = Cursor::new(data);
    Ok(ErotStateRequest {
        component_classification: cur.read_u16_le()?,
        component_identifier: cur.read_u16_le()?,
        classification_index: cur.read_u8()?,
    })
}

/// Encode a full state response: `{field_count u16 LE}` + tag stream.
pub fn encode_erot_state_resp(instance_id: u8, state: &ErotState) -> CodecResult<Vec<u8>> {
    let mut fields = Vec::new();
    let mut count: u16 = 0;
    let push = |fields: &mut Vec<u8>, count: &mut u16, tag: u8, data: &[u8]| -> CodecResult<()> {
        encode_field(fields, tag, true, data)?;
        *count += 1;
        Ok(())
    };

    let hdr = &state.header;
    push(&mut fields, &mut count, tag::BACKGROUND_COPY_POLICY, &[hdr.background_copy_policy])?;
    push(&mut fields, &mut count, tag::ACTIVE_FIRMWARE_SLOT, &[hdr.active_slot])?;
    push(&mut fields, &mut count, tag::ACTIVE_KEY_SET, &[hdr.active_keyset])?;
    push(
        &mut fields,
        &mut count,
        tag::MINIMUM_SECURITY_VERSION_NUMBER,
        &hdr.minimum_security_version.to_le_bytes(),
    )?;
    push(&mut fields, &mut count, tag::INBAND_UPDATE_POLICY, &[hdr.inband_update_policy])?;
    push(&mut fields, &mut count, tag::BOOT_STATUS_CODE, &hdr.boot_status_code.to_le_bytes())?;
    push(&mut fields, &mut count, tag::FIRMWARE_SLOT_COUNT, &[hdr.slot_count])?;

    for slot in &state.slots {
        if slot.version.len() > 16 {
            return Err(CodecError::Data { reason: "version string longer than 16 bytes" });
        }
        let mut version = [0u8; 16];
        version[..slot.version.len()].copy_from_slice(slot.version.as_bytes());

        push(&mut fields, &mut count, tag::FIRMWARE_SLOT_ID, &[slot.slot_id])?;
        push(&mut fields, &mut count, tag::FIRMWARE_VERSION_STRING, &version)?;
        push(
            &mut fields,
            &mut count,
            tag::VERSION_COMPARISON_STAMP,
            &slot.version_comparison_stamp.to_le_bytes(),
        )?;
        push(&mut fields, &mut count, tag::BUILD_TYPE, &[slot.build_type])?;
        push(&mut fields, &mut count, tag::SIGNING_TYPE, &[slot.signing_type])?;
        push(&mut fields, &mut count, tag::WRITE_PROTECT_STATE, &[slot.write_protect_state])?;
        push(&mut fields, &mut count, tag::FIRMWARE_STATE, &[slot.firmware_state])?;
        push(
            &mut fields,
            &mut count,
            tag::SECURITY_VERSION_NUMBER,
            &slot.security_version_number.to_le_bytes(),
        )?;
        push(&mut fields, &mut count, tag::SIGNING_KEY_INDEX, &slot.signing_key_index.to_le_bytes())?;
    }

    let mut data = Vec::with_capacity(2 + fields.len());
    data.extend_from_slice(&count.to_le_bytes());
    data.extend_from_slice(&fields);
    encode_response(
        instance_id,
        MessageType::Firmware,
        CMD_QUERY_EROT_STATE,
        CompletionCode::Success,
        0,
        &data,
    )
}

/// Decode the header record. Consumes tags up to and including the slot
/// count; an unexpected tag before the slot count is a hard `Data` error.
fn decode_state_header(dec: &mut AggregateDecoder<'_>) -> CodecResult<ErotStateHeader> {
    let mut hdr = ErotStateHeader::default();
    loop {
        let field = match dec.next_field()? {
            Some(f) => f,
            None => break,
        };
        match field.tag {
            tag::BACKGROUND_COPY_POLICY => hdr.background_copy_policy = field.as_u8()?,
            tag::ACTIVE_FIRMWARE_SLOT => hdr.active_slot = field.as_u8()?,
            tag::ACTIVE_KEY_SET => hdr.active_keyset = field.as_u8()?,
            tag::MINIMUM_SECURITY_VERSION_NUMBER => {
                hdr.minimum_security_version = field.as_u16()?
            }
            tag::INBAND_UPDATE_POLICY => hdr.inband_update_policy = field.as_u8()?,
            tag::BOOT_STATUS_CODE => hdr.boot_status_code = field.as_u64()?,
            tag::FIRMWARE_SLOT_COUNT => {
                hdr.slot_count = field.as_u8()?;
                return Ok(hdr);
            }
            _ => return Err(CodecError::Data { reason: "unexpected tag before slot count" }),
        }
    }
    Ok(hdr)
}

/// Decode one slot record. The slot-id tag is structurally mandatory as
/// the first field; a later slot-id tag belongs to the next record and is
/// left unconsumed.
fn decode_slot(dec: &mut AggregateDecoder<'_>) -> CodecResult<SlotInfo> {
    let first = dec
        .next_field()?
        .ok_or(CodecError::Length { offset: 0, needed: FIELD_OVERHEAD })?;
    if first.tag != tag::FIRMWARE_SLOT_ID {
        return Err(CodecError::Data { reason: "slot record must start with slot id" });
    }
    let mut slot = SlotInfo { slot_id: first.as_u8()?, ..SlotInfo::default() };

    while let Some(next_tag) = dec.peek_tag() {
        if next_tag == tag::FIRMWARE_SLOT_ID {
            // New record begins; leave the tag for the next pass.
            break;
        }
        let field = match dec.next_field()? {
            Some(f) => f,
            None => break,
        };
        match field.tag {
            tag::FIRMWARE_VERSION_STRING => {
                let raw = field.as_bytes16()?;
                let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
                slot.version = String::from_utf8(raw[..end].to_vec())
                    .map_err(|_| CodecError::Data { reason: "version string is not UTF-8" })?;
            }
            tag::VERSION_COMPARISON_STAMP => slot.version_comparison_stamp = field.as_u32()?,
            tag::BUILD_TYPE => slot.build_type = field.as_u8()?,
            tag::SIGNING_TYPE => slot.signing_type = field.as_u8()?,
            tag::WRITE_PROTECT_STATE => slot.write_protect_state = field.as_u8()?,
            tag::FIRMWARE_STATE => slot.firmware_state = field.as_u8()?,
            tag::SECURITY_VERSION_NUMBER => slot.security_version_number = field.as_u16()?,
            tag::SIGNING_KEY_INDEX => slot.signing_key_index = field.as_u16()?,
            _ => return Err(CodecError::Data { reason: "unexpected tag in slot record" }),
        }
    }
    Ok(slot)
}

pub fn decode_erot_state_resp(msg: &[u8]) -> CodecResult<(ResponseInfo, Option<ErotState>)> {
    let (_, info, data) = decode_response(msg)?;
    if !info.completion.is_success() {
        return Ok((info, None));
    }
    let mut cur = Cursor::new(data);
    let field_count = cur.read_u16_le()?;
    let region = cur.take(cur.remaining())?;
    let mut dec = AggregateDecoder::new(region, field_count);

    let header = decode_state_header(&mut dec)?;
    let mut slots = Vec::with_capacity(header.slot_count as usize);
    for _ in 0..header.slot_count {
        slots.push(decode_slot(&mut dec)?);
    }
    Ok((info, Some(ErotState { header, slots })))
}
