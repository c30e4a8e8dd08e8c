// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Request/response engine.
//!
//! Per endpoint and cadence, requests queue FIFO and at most one is in
//! flight. The handler leases an instance ID, patches it into the frame,
//! sends, and suspends the caller until the response with the matching
//! (endpoint, instance id) arrives or the expiry timer fires. The first
//! of {match, expiry} wins; the loser is a no-op.

mod handler;
mod track;

use std::fmt;

use crate::instance_id::InstanceIdError;
use crate::protocol::CodecError;
use crate::transport::{TransportError, TAG_LONG_RUNNING, TAG_REGULAR};

pub use handler::RequestHandler;

/// The two request cadences, one FIFO lane each per endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cadence {
    Regular,
    LongRunning,
}

impl Cadence {
    pub fn tag(self) -> u8 {
        match self {
            Cadence::Regular => TAG_REGULAR,
            Cadence::LongRunning => TAG_LONG_RUNNING,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            TAG_REGULAR => Some(Cadence::Regular),
            TAG_LONG_RUNNING => Some(Cadence::LongRunning),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequesterError {
    /// The transport refused the first send attempt.
    Send(TransportError),
    /// Instance-ID expiry fired with no matched response.
    Expired,
    /// The request was explicitly invalidated while in flight.
    Invalidated,
    /// Lease pool failure. `Exhausted` never reaches callers (the
    /// dispatcher backs off and retries); anything else is fatal.
    Pool(InstanceIdError),
    /// The request frame was malformed.
    Codec(CodecError),
    /// The handler shut down while the request was queued.
    Shutdown,
}

impl fmt::Display for RequesterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequesterError::Send(e) => write!(f, "send failed: {}", e),
            RequesterError::Expired => write!(f, "no response before instance id expiry"),
            RequesterError::Invalidated => write!(f, "request invalidated"),
            RequesterError::Pool(e) => write!(f, "instance id pool: {}", e),
            RequesterError::Codec(e) => write!(f, "malformed request: {}", e),
            RequesterError::Shutdown => write!(f, "request handler shut down"),
        }
    }
}

impl std::error::Error for RequesterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RequesterError::Send(e) => Some(e),
            RequesterError::Pool(e) => Some(e),
            RequesterError::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for RequesterError {
    fn from(e: CodecError) -> Self {
        RequesterError::Codec(e)
    }
}
