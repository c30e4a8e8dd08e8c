// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Endpoint discovery. The host's enumeration layer reports endpoints as
//! they appear; the handshake here pings the endpoint, learns what it is
//! and which commands it accepts, then activates its device record and
//! starts polling. Devices re-enter through the same path after a power
//! transition.

use std::fmt;
use std::sync::Arc;

use crate::device::{Device, SensorManager};
use crate::protocol::capability::{
    self, decode_ping_resp, decode_query_device_identification_resp,
    decode_supported_command_codes_resp, decode_supported_message_types_resp,
};
use crate::protocol::{CodecError, CompletionCode, MessageType};
use crate::requester::{Cadence, RequestHandler, RequesterError};
use crate::transport::Eid;

/// Endpoint tuple as delivered by the host enumeration layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub eid: Eid,
    pub uuid: String,
    pub medium: u8,
    pub network_id: u8,
    pub binding: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    Requester(RequesterError),
    Codec(CodecError),
    /// The endpoint answered a handshake command with a failure code.
    Refused { command: u8, completion: CompletionCode },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::Requester(e) => write!(f, "handshake request failed: {}", e),
            DiscoveryError::Codec(e) => write!(f, "handshake response malformed: {}", e),
            DiscoveryError::Refused { command, completion } => {
                write!(f, "endpoint refused command {:#04x} with {:?}", command, completion)
            }
        }
    }
}

impl std::error::Error for DiscoveryError {}

impl From<RequesterError> for DiscoveryError {
    fn from(e: RequesterError) -> Self {
        DiscoveryError::Requester(e)
    }
}

impl From<CodecError> for DiscoveryError {
    fn from(e: CodecError) -> Self {
        DiscoveryError::Codec(e)
    }
}

pub struct DeviceDiscovery {
    handler: Arc<RequestHandler>,
    manager: Arc<SensorManager>,
}

impl DeviceDiscovery {
    pub fn new(handler: Arc<RequestHandler>, manager: Arc<SensorManager>) -> Self {
        Self { handler, manager }
    }

    /// Full handshake for a reported endpoint. On success the device
    /// record exists, carries fresh capability masks and is active with
    /// polling started. Sensors survive rediscovery; capabilities do not.
    pub async fn endpoint_added(&self, info: EndpointInfo) -> Result<Arc<Device>, DiscoveryError> {
        log::info!(
            "[discovery] eid {}: endpoint reported (uuid {}, net {}, medium {})",
            info.eid,
            info.uuid,
            info.network_id,
            info.medium
        );

        self.ping(info.eid).await?;

        let (kind, device_instance) = self.query_identification(info.eid).await?;
        log::info!(
            "[discovery] eid {}: identified as {:?} instance {}",
            info.eid,
            kind,
            device_instance
        );

        let device = match self.manager.device(info.eid) {
            Some(existing) => existing,
            None => {
                let device = Device::new(info.eid, info.uuid.clone());
                self.manager.add_device(Arc::clone(&device));
                device
            }
        };
        device.set_kind(kind);

        let types = self.query_message_types(info.eid).await?;
        device.set_capabilities(types);
        for raw in 0u8..=6 {
            if !types.is_set(raw) {
                continue;
            }
            let Some(message_type) = MessageType::from_u8(raw) else {
                continue;
            };
            let commands = self.query_command_codes(info.eid, message_type).await?;
            device.set_command_mask(message_type, commands);
        }

        device.set_active(true);
        self.manager.start_polling(info.eid);
        Ok(device)
    }

    /// The endpoint went away. Its record stays for a later rediscovery.
    pub fn endpoint_removed(&self, eid: Eid) {
        if let Some(device) = self.manager.device(eid) {
            self.manager.stop_polling(eid);
            device.set_active(false);
            log::info!("[discovery] eid {}: endpoint deactivated", eid);
        }
    }

    async fn ping(&self, eid: Eid) -> Result<(), DiscoveryError> {
        let request = capability::encode_ping_req(0)?;
        let bytes = self.handler.send_recv(eid, Cadence::Regular, request).await?;
        let info = decode_ping_resp(&bytes)?;
        if !info.completion.is_success() {
            return Err(DiscoveryError::Refused {
                command: capability::CMD_PING,
                completion: info.completion,
            });
        }
        Ok(())
    }

    async fn query_identification(
        &self,
        eid: Eid,
    ) -> Result<(capability::DeviceKind, u8), DiscoveryError> {
        let request = capability::encode_query_device_identification_req(0)?;
        let bytes = self.handler.send_recv(eid, Cadence::Regular, request).await?;
        let (info, kind, device_instance) = decode_query_device_identification_resp(&bytes)?;
        if !info.completion.is_success() {
            return Err(DiscoveryError::Refused {
                command: capability::CMD_QUERY_DEVICE_IDENTIFICATION,
                completion: info.completion,
            });
        }
        Ok((kind, device_instance))
    }

    async fn query_message_types(
        &self,
        eid: Eid,
    ) -> Result<capability::MessageTypeMask, DiscoveryError> {
        let request = capability::encode_supported_message_types_req(0)?;
        let bytes = self.handler.send_recv(eid, Cadence::Regular, request).await?;
        let (info, mask) = decode_supported_message_types_resp(&bytes)?;
        if !info.completion.is_success() {
            return Err(DiscoveryError::Refused {
                command: capability::CMD_SUPPORTED_MESSAGE_TYPES,
                completion: info.completion,
            });
        }
        Ok(mask)
    }

    async fn query_command_codes(
        &self,
        eid: Eid,
        message_type: MessageType,
    ) -> Result<capability::CommandCodeMask, DiscoveryError> {
        let request = capability::encode_supported_command_codes_req(0, message_type)?;
        let bytes = self.handler.send_recv(eid, Cadence::Regular, request).await?;
        let (info, mask) = decode_supported_command_codes_resp(&bytes)?;
        if !info.completion.is_success() {
            return Err(DiscoveryError::Refused {
                command: capability::CMD_SUPPORTED_COMMAND_CODES,
                completion: info.completion,
            });
        }
        Ok(mask)
    }
}
