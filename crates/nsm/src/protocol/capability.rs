// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type 0 device-capability-discovery commands.
//!
//! These are the first exchanges run against a freshly discovered endpoint:
//! ping, the supported message-type and command-code bitmasks, and the
//! device identification (kind + instance number).

use super::cursor::Cursor;
use super::header::{decode_response_fixed, encode_request, encode_response, ResponseInfo};
use super::{CodecError, CodecResult, CompletionCode, MessageType};

pub const CMD_PING: u8 = 0x00;
pub const CMD_SUPPORTED_MESSAGE_TYPES: u8 = 0x01;
pub const CMD_SUPPORTED_COMMAND_CODES: u8 = 0x02;
pub const CMD_QUERY_DEVICE_IDENTIFICATION: u8 = 0x09;

/// Fixed-width bitmask, one bit per message type or command code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitmask<const N: usize>(pub [u8; N]);

/// 64-bit mask of supported vendor message types.
pub type MessageTypeMask = Bitmask<8>;

/// 256-bit mask of supported command codes within one message type.
pub type CommandCodeMask = Bitmask<32>;

impl<const N: usize> Default for Bitmask<N> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<const N: usize> Bitmask<N> {
    pub const fn empty() -> Self {
        Self([0u8; N])
    }

    pub fn is_set(&self, bit: u8) -> bool {
        let idx = bit as usize / 8;
        idx < N && self.0[idx] & (1 << (bit % 8)) != 0
    }

    pub fn set(&mut self, bit: u8) {
        let idx = bit as usize / 8;
        if idx < N {
            self.0[idx] |= 1 << (bit % 8);
        }
    }
}

/// What kind of managed device answered a Query Device Identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceKind {
    Gpu = 0,
    Switch = 1,
    PcieBridge = 2,
    Baseboard = 3,
    Unknown = 0xFF,
}

impl DeviceKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Gpu),
            1 => Some(Self::Switch),
            2 => Some(Self::PcieBridge),
            3 => Some(Self::Baseboard),
            0xFF => Some(Self::Unknown),
            _ => None,
        }
    }
}

pub fn encode_ping_req(instance_id: u8) -> CodecResult<Vec<u8>> {
    encode_request(instance_id, MessageType::DeviceCapabilityDiscovery, CMD_PING, &[])
}

/// Ping answers carry no data; a non-empty success payload is malformed.
pub fn decode_ping_resp(msg: &[u8]) -> CodecResult<ResponseInfo> {
    let (_, info, _) = decode_response_fixed(msg, 0)?;
    Ok(info)
}

pub fn encode_supported_message_types_req(instance_id: u8) -> CodecResult<Vec<u8>> {
    encode_request(
        instance_id,
        MessageType::DeviceCapabilityDiscovery,
        CMD_SUPPORTED_MESSAGE_TYPES,
        &[],
    )
}

pub fn encode_supported_message_types_resp(
    instance_id: u8,
    types: &MessageTypeMask,
) -> CodecResult<Vec<u8>> {
    encode_response(
        instance_id,
        MessageType::DeviceCapabilityDiscovery,
        CMD_SUPPORTED_MESSAGE_TYPES,
        CompletionCode::Success,
        0,
        &types.0,
    )
}

pub fn decode_supported_message_types_resp(
    msg: &[u8],
) -> CodecResult<(ResponseInfo, MessageTypeMask)> {
    let (_, info, data) = decode_response_fixed(msg, 8)?;
    let mut mask = MessageTypeMask::empty();
    if info.completion.is_success() {
        mask.0.copy_from_slice(data);
    }
    Ok((info, mask))
}

/// Request carries the queried message type as its single data byte.
pub fn encode_supported_command_codes_req(
    instance_id: u8,
    queried: MessageType,
) -> CodecResult<Vec<u8>> {
    encode_request(
        instance_id,
        MessageType::DeviceCapabilityDiscovery,
        CMD_SUPPORTED_COMMAND_CODES,
        &[queried as u8],
    )
}

pub fn encode_supported_command_codes_resp(
    instance_id: u8,
    codes: &CommandCodeMask,
) -> CodecResult<Vec<u8>> {
    encode_response(
        instance_id,
        MessageType::DeviceCapabilityDiscovery,
        CMD_SUPPORTED_COMMAND_CODES,
        CompletionCode::Success,
        0,
        &codes.0,
    )
}

pub fn decode_supported_command_codes_resp(
    msg: &[u8],
) -> CodecResult<(ResponseInfo, CommandCodeMask)> {
    let (_, info, data) = decode_response_fixed(msg, 32)?;
    let mut mask = CommandCodeMask::empty();
    if info.completion.is_success() {
        mask.0.copy_from_slice(data);
    }
    Ok((info, mask))
}

pub fn encode_query_device_identification_req(instance_id: u8) -> CodecResult<Vec<u8>> {
    encode_request(
        instance_id,
        MessageType::DeviceCapabilityDiscovery,
        CMD_QUERY_DEVICE_IDENTIFICATION,
        &[],
    )
}

pub fn encode_query_device_identification_resp(
    instance_id: u8,
    kind: DeviceKind,
    device_instance: u8,
) -> CodecResult<Vec<u8>> {
    encode_response(
        instance_id,
        MessageType::DeviceCapabilityDiscovery,
        CMD_QUERY_DEVICE_IDENTIFICATION,
        CompletionCode::Success,
        0,
        &[kind as u8, device_instance],
    )
}

pub fn decode_query_device_identification_resp(
    msg: &[u8],
) -> CodecResult<(ResponseInfo, DeviceKind, u8)> {
    let (_, info, data) = decode_response_fixed(msg, 2)?;
    if !info.completion.is_success() {
        return Ok((info, DeviceKind::Unknown, 0));
    }
    let mut cur = Cursor::new(data);
    let raw_kind = cur.read_u8()?;
    let device_instance = cur.read_u8()?;
    let kind =
        DeviceKind::from_u8(raw_kind).ok_or(CodecError::Data { reason: "unknown device kind" })?;
    Ok((info, kind, device_instance))
}
