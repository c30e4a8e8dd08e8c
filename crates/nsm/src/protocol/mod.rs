// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! NSM wire codec: message headers, per-command payloads, tagged fields.
//!
//! Everything in this tree is pure and stateless: typed values in, bytes
//! out, and the reverse. No I/O, no shared state. Untrusted bytes are read
//! through the bounds-checked [`cursor`] types only; byte buffers are never
//! reinterpreted as packed structs.

pub mod aggregate;
pub mod capability;
pub mod cursor;
pub mod firmware;
pub mod header;
pub mod telemetry;

use std::fmt;

pub use header::{MessageHeader, ResponseInfo};

/// PCI vendor ID carried big-endian in every message header.
pub const PCI_VENDOR_ID: u16 = 0x10DE;

/// Link-layer message type for vendor-defined PCI messages.
pub const LINK_MSG_TYPE_PCI_VDM: u8 = 0x7E;

/// OCP type / version nibbles of header byte 4.
pub const OCP_TYPE: u8 = 8;
pub const OCP_VERSION: u8 = 9;

/// Highest valid instance ID (5-bit field).
pub const INSTANCE_ID_MAX: u8 = 31;

/// Fixed message header length in bytes.
pub const MSG_HEADER_LEN: usize = 6;

/// Request payload convention: `{command, data_size}`.
pub const REQUEST_CONVENTION_LEN: usize = 2;

/// Success response convention: `{command, cc, reserved u16, data_size u16}`.
pub const RESPONSE_CONVENTION_LEN: usize = 6;

/// Failure response convention: `{command, cc, reason_code u16}`.
pub const RESPONSE_REASON_LEN: usize = 4;

/// Vendor message categories (header byte 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    DeviceCapabilityDiscovery = 0,
    NetworkPort = 1,
    PciLink = 2,
    PlatformEnvironmental = 3,
    Diagnostic = 4,
    DeviceConfiguration = 5,
    Firmware = 6,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::DeviceCapabilityDiscovery),
            1 => Some(Self::NetworkPort),
            2 => Some(Self::PciLink),
            3 => Some(Self::PlatformEnvironmental),
            4 => Some(Self::Diagnostic),
            5 => Some(Self::DeviceConfiguration),
            6 => Some(Self::Firmware),
            _ => None,
        }
    }
}

/// Direction/kind of a message, derived from the request and datagram bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Response,
    Request,
    Event,
}

/// Completion code byte carried in every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CompletionCode {
    Success = 0x00,
    Accepted = 0x01,
    ErrGeneric = 0x02,
    ErrNotReady = 0x03,
    ErrRequest = 0x04,
    ErrUnsupportedMessageType = 0x05,
    ErrUnsupportedCommandCode = 0x06,
    ErrInvalidDataSize = 0x07,
    ErrInvalidArg1 = 0x08,
    ErrInvalidArg2 = 0x09,
    ErrInvalidData = 0x0A,
    ErrBusy = 0x0B,
    ErrDataNotAvailable = 0x0C,
    ErrBusAccess = 0x0D,
    ErrAgain = 0x0E,
    PartialSuccess = 0x0F,
}

impl CompletionCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Success),
            0x01 => Some(Self::Accepted),
            0x02 => Some(Self::ErrGeneric),
            0x03 => Some(Self::ErrNotReady),
            0x04 => Some(Self::ErrRequest),
            0x05 => Some(Self::ErrUnsupportedMessageType),
            0x06 => Some(Self::ErrUnsupportedCommandCode),
            0x07 => Some(Self::ErrInvalidDataSize),
            0x08 => Some(Self::ErrInvalidArg1),
            0x09 => Some(Self::ErrInvalidArg2),
            0x0A => Some(Self::ErrInvalidData),
            0x0B => Some(Self::ErrBusy),
            0x0C => Some(Self::ErrDataNotAvailable),
            0x0D => Some(Self::ErrBusAccess),
            0x0E => Some(Self::ErrAgain),
            0x0F => Some(Self::PartialSuccess),
            _ => None,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Codec error. The three kinds let callers tell a malformed call
/// (`Null`), a short read (`Length`) and malformed wire data (`Data`)
/// apart, which the requester and scheduler handle differently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Required input or output buffer was absent/empty.
    Null,
    /// Buffer shorter than the declared or minimum size.
    Length { offset: usize, needed: usize },
    /// A field held a semantically invalid value.
    Data { reason: &'static str },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Null => write!(f, "null or empty buffer"),
            CodecError::Length { offset, needed } => {
                write!(f, "buffer too short at offset {}: {} more bytes needed", offset, needed)
            }
            CodecError::Data { reason } => write!(f, "invalid data: {}", reason),
        }
    }
}

impl std::error::Error for CodecError {}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_roundtrip() {
        for raw in 0u8..=6 {
            let ty = MessageType::from_u8(raw).expect("defined type");
            assert_eq!(ty as u8, raw);
        }
        assert_eq!(MessageType::from_u8(7), None);
        assert_eq!(MessageType::from_u8(0xFF), None);
    }

    #[test]
    fn completion_code_range() {
        for raw in 0u8..=0x0F {
            assert!(CompletionCode::from_u8(raw).is_some());
        }
        assert_eq!(CompletionCode::from_u8(0x10), None);
        assert!(CompletionCode::Success.is_success());
        assert!(!CompletionCode::ErrBusy.is_success());
    }
}
