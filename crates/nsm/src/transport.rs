// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport boundary. The core never opens sockets; the host I/O layer
//! implements [`Transport`] for outbound bytes and feeds inbound bytes to
//! [`crate::requester::RequestHandler::handle_response`].

use std::fmt;

/// Remote endpoint ID as assigned by the host transport layer.
pub type Eid = u8;

/// Message tag for the regular request/response cadence.
pub const TAG_REGULAR: u8 = 0;

/// Message tag for long-running commands with delayed completion.
pub const TAG_LONG_RUNNING: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    /// The transport is shut down or the endpoint is unreachable.
    Closed,
    /// The transport rejected the message.
    Rejected { reason: &'static str },
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Closed => write!(f, "transport closed"),
            TransportError::Rejected { reason } => write!(f, "transport rejected message: {}", reason),
        }
    }
}

impl std::error::Error for TransportError {}

/// Outbound half of the host I/O layer. `send` hands the frame to the
/// host and returns once it is queued; it must not block. A loopback
/// transport may deliver the response inline from within `send`.
pub trait Transport: Send + Sync + 'static {
    fn send(&self, eid: Eid, tag: u8, bytes: &[u8]) -> Result<(), TransportError>;
}
