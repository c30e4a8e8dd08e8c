// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-endpoint timeout diagnostics. Keeps the last few successful
//! request summaries and the first timed-out one, so a degraded endpoint
//! can be explained from the log without a bus trace. A timeout never
//! aborts anything; the endpoint is degraded until a response succeeds.

use std::collections::VecDeque;

use dashmap::DashMap;

use crate::protocol::{MSG_HEADER_LEN, REQUEST_CONVENTION_LEN};
use crate::transport::Eid;

/// Successful requests retained per endpoint.
const RECENT_DEPTH: usize = 4;

#[derive(Debug, Clone, Copy)]
struct RequestRecord {
    message_type: u8,
    command: u8,
    len: usize,
}

impl RequestRecord {
    fn summarize(request: &[u8]) -> Self {
        Self {
            message_type: request.get(MSG_HEADER_LEN - 1).copied().unwrap_or(0xFF),
            command: request.get(MSG_HEADER_LEN).copied().unwrap_or(0xFF),
            len: request.len().saturating_sub(MSG_HEADER_LEN + REQUEST_CONVENTION_LEN),
        }
    }
}

#[derive(Debug, Default)]
struct EndpointLog {
    recent: VecDeque<RequestRecord>,
    first_timeout: Option<RequestRecord>,
}

#[derive(Debug, Default)]
pub(crate) struct TimeoutTracker {
    endpoints: DashMap<Eid, EndpointLog>,
}

impl TimeoutTracker {
    pub(crate) fn record_success(&self, eid: Eid, request: &[u8]) {
        let mut log = self.endpoints.entry(eid).or_default();
        if log.recent.len() == RECENT_DEPTH {
            log.recent.pop_front();
        }
        log.recent.push_back(RequestRecord::summarize(request));
        if log.first_timeout.take().is_some() {
            log::info!("[requester] eid {}: endpoint recovered", eid);
        }
    }

    /// Records the first timeout of a degraded stretch and dumps the
    /// successful requests that preceded it. Repeat timeouts stay quiet.
    pub(crate) fn record_timeout(&self, eid: Eid, request: &[u8]) {
        let mut log = self.endpoints.entry(eid).or_default();
        if log.first_timeout.is_some() {
            return;
        }
        let record = RequestRecord::summarize(request);
        log::warn!(
            "[requester] eid {}: first timeout on type {:#04x} command {:#04x} ({} data bytes)",
            eid,
            record.message_type,
            record.command,
            record.len
        );
        for (i, prior) in log.recent.iter().enumerate() {
            log::warn!(
                "[requester] eid {}:   prior success {}: type {:#04x} command {:#04x}",
                eid,
                i,
                prior.message_type,
                prior.command
            );
        }
        log.first_timeout = Some(record);
    }

    pub(crate) fn is_degraded(&self, eid: Eid) -> bool {
        self.endpoints.get(&eid).map(|log| log.first_timeout.is_some()).unwrap_or(false)
    }
}
