// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message header pack/unpack and the shared payload conventions.
//!
//! Wire layout of the 6-byte header:
//!
//! ```text
//! byte 0   bit 7: integrity-check flag (0), bits 6..0: link type (0x7E)
//! byte 1-2 PCI vendor id 0x10DE, big-endian
//! byte 3   bit 7: request, bit 6: datagram, bit 5: reserved,
//!          bits 4..0: instance id
//! byte 4   bits 7..4: OCP version (9), bits 3..0: OCP type (8)
//! byte 5   vendor message type
//! ```
//!
//! Request payloads start `{command, data_size}`. Response payloads start
//! `{command, completion}`; a success completion is followed by a reserved
//! u16 and a little-endian u16 data length, a failure by a little-endian
//! u16 reason code and nothing else.

use super::cursor::{Cursor, CursorMut};
use super::{
    CodecError, CodecResult, CompletionCode, MessageKind, MessageType, INSTANCE_ID_MAX,
    LINK_MSG_TYPE_PCI_VDM, MSG_HEADER_LEN, OCP_TYPE, OCP_VERSION, PCI_VENDOR_ID,
    REQUEST_CONVENTION_LEN, RESPONSE_CONVENTION_LEN, RESPONSE_REASON_LEN,
};

const REQUEST_BIT: u8 = 0x80;
const DATAGRAM_BIT: u8 = 0x40;
const INSTANCE_ID_MASK: u8 = 0x1F;

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub kind: MessageKind,
    pub instance_id: u8,
    pub message_type: MessageType,
}

/// Decoded response status: command echo, completion code and either the
/// data length (success) or the reason code (failure).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseInfo {
    pub command: u8,
    pub completion: CompletionCode,
    pub reason_code: u16,
    pub data_size: u16,
}

/// Pack a header into the cursor. Validates the instance id range before
/// writing anything.
pub fn pack_header(hdr: &MessageHeader, out: &mut CursorMut<'_>) -> CodecResult<()> {
    if hdr.instance_id > INSTANCE_ID_MAX {
        return Err(CodecError::Data { reason: "instance id out of range" });
    }
    let flags = match hdr.kind {
        MessageKind::Response => 0,
        MessageKind::Request => REQUEST_BIT,
        MessageKind::Event => REQUEST_BIT | DATAGRAM_BIT,
    };
    out.write_u8(LINK_MSG_TYPE_PCI_VDM)?;
    out.write_u16_be(PCI_VENDOR_ID)?;
    out.write_u8(flags | hdr.instance_id)?;
    out.write_u8((OCP_VERSION << 4) | OCP_TYPE)?;
    out.write_u8(hdr.message_type as u8)?;
    Ok(())
}

/// Unpack and validate a header. Rejects a wrong link type, vendor id or
/// OCP type/version before looking at anything else.
pub fn unpack_header(cur: &mut Cursor<'_>) -> CodecResult<MessageHeader> {
    let link = cur.read_u8()?;
    if link & 0x7F != LINK_MSG_TYPE_PCI_VDM {
        return Err(CodecError::Data { reason: "not a vendor-defined message" });
    }
    let vendor = cur.read_u16_be()?;
    if vendor != PCI_VENDOR_ID {
        return Err(CodecError::Data { reason: "wrong PCI vendor id" });
    }
    let flags = cur.read_u8()?;
    let ocp = cur.read_u8()?;
    if ocp & 0x0F != OCP_TYPE {
        return Err(CodecError::Data { reason: "wrong OCP type" });
    }
    if ocp >> 4 != OCP_VERSION {
        return Err(CodecError::Data { reason: "wrong OCP version" });
    }
    let raw_type = cur.read_u8()?;
    let message_type = MessageType::from_u8(raw_type)
        .ok_or(CodecError::Data { reason: "unknown vendor message type" })?;

    let kind = if flags & REQUEST_BIT == 0 {
        MessageKind::Response
    } else if flags & DATAGRAM_BIT != 0 {
        MessageKind::Event
    } else {
        MessageKind::Request
    };
    Ok(MessageHeader { kind, instance_id: flags & INSTANCE_ID_MASK, message_type })
}

/// Offset of the header byte carrying the instance id, for the requester
/// which patches the id into an already-serialized request.
pub const INSTANCE_ID_BYTE: usize = 3;

/// Overwrite the instance id of a serialized message in place.
pub fn patch_instance_id(msg: &mut [u8], instance_id: u8) -> CodecResult<()> {
    if instance_id > INSTANCE_ID_MAX {
        return Err(CodecError::Data { reason: "instance id out of range" });
    }
    let byte = msg
        .get_mut(INSTANCE_ID_BYTE)
        .ok_or(CodecError::Length { offset: 0, needed: MSG_HEADER_LEN })?;
    *byte = (*byte & !INSTANCE_ID_MASK) | instance_id;
    Ok(())
}

/// Build a complete request message: header + `{command, data_size}` + data.
pub fn encode_request(
    instance_id: u8,
    message_type: MessageType,
    command: u8,
    data: &[u8],
) -> CodecResult<Vec<u8>> {
    if data.len() > u8::MAX as usize {
        return Err(CodecError::Data { reason: "request data longer than 255 bytes" });
    }
    let mut msg = vec![0u8; MSG_HEADER_LEN + REQUEST_CONVENTION_LEN + data.len()];
    let mut out = CursorMut::new(&mut msg);
    let hdr = MessageHeader { kind: MessageKind::Request, instance_id, message_type };
    pack_header(&hdr, &mut out)?;
    out.write_u8(command)?;
    out.write_u8(data.len() as u8)?;
    out.write_bytes(data)?;
    Ok(msg)
}

/// Build a complete response message. A non-success completion encodes the
/// reason code instead of the data, matching the wire convention.
pub fn encode_response(
    instance_id: u8,
    message_type: MessageType,
    command: u8,
    completion: CompletionCode,
    reason_code: u16,
    data: &[u8],
) -> CodecResult<Vec<u8>> {
    let hdr = MessageHeader { kind: MessageKind::Response, instance_id, message_type };
    if !completion.is_success() {
        let mut msg = vec![0u8; MSG_HEADER_LEN + RESPONSE_REASON_LEN];
        let mut out = CursorMut::new(&mut msg);
        pack_header(&hdr, &mut out)?;
        out.write_u8(command)?;
        out.write_u8(completion as u8)?;
        out.write_u16_le(reason_code)?;
        return Ok(msg);
    }
    if data.len() > u16::MAX as usize {
        return Err(CodecError::Data { reason: "response data longer than 65535 bytes" });
    }
    let mut msg = vec![0u8; MSG_HEADER_LEN + RESPONSE_CONVENTION_LEN + data.len()];
    let mut out = CursorMut::new(&mut msg);
    pack_header(&hdr, &mut out)?;
    out.write_u8(command)?;
    out.write_u8(completion as u8)?;
    out.write_u16_le(0)?; // reserved
    out.write_u16_le(data.len() as u16)?;
    out.write_bytes(data)?;
    Ok(msg)
}

/// Decode a request message down to `(header, command, data)`.
pub fn decode_request(msg: &[u8]) -> CodecResult<(MessageHeader, u8, &[u8])> {
    if msg.is_empty() {
        return Err(CodecError::Null);
    }
    let mut cur = Cursor::new(msg);
    let hdr = unpack_header(&mut cur)?;
    if hdr.kind == MessageKind::Response {
        return Err(CodecError::Data { reason: "not a request message" });
    }
    let command = cur.read_u8()?;
    let data_size = cur.read_u8()? as usize;
    let data = cur.take(data_size)?;
    Ok((hdr, command, data))
}

/// Decode a response message down to `(header, status, data)`.
///
/// The completion code is read first; a failure short-circuits to the
/// reason code and returns an empty data slice. On success the declared
/// data length is validated against the bytes actually present.
pub fn decode_response(msg: &[u8]) -> CodecResult<(MessageHeader, ResponseInfo, &[u8])> {
    if msg.is_empty() {
        return Err(CodecError::Null);
    }
    let mut cur = Cursor::new(msg);
    let hdr = unpack_header(&mut cur)?;
    if hdr.kind != MessageKind::Response {
        return Err(CodecError::Data { reason: "not a response message" });
    }
    let command = cur.read_u8()?;
    let raw_cc = cur.read_u8()?;
    let completion =
        CompletionCode::from_u8(raw_cc).ok_or(CodecError::Data { reason: "unknown completion code" })?;
    if !completion.is_success() {
        let reason_code = cur.read_u16_le()?;
        let info = ResponseInfo { command, completion, reason_code, data_size: 0 };
        return Ok((hdr, info, &[]));
    }
    cur.read_u16_le()?; // reserved
    let data_size = cur.read_u16_le()?;
    let data = cur.take(data_size as usize)?;
    let info = ResponseInfo { command, completion, reason_code: 0, data_size };
    Ok((hdr, info, data))
}

/// Decode a response where the payload has a fixed expected size. Returns
/// `Data` when the declared length disagrees with the command's layout.
pub fn decode_response_fixed(
    msg: &[u8],
    expected: usize,
) -> CodecResult<(MessageHeader, ResponseInfo, &[u8])> {
    let (hdr, info, data) = decode_response(msg)?;
    if info.completion.is_success() && data.len() != expected {
        return Err(CodecError::Data { reason: "unexpected data size for command" });
    }
    Ok((hdr, info, data))
}
