// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Tunables for the requester and the polling scheduler. Defaults follow
//! the platform firmware's shipped values; hosts override per deployment.

use std::time::Duration;

/// Instance-ID expiry. A request with no matched response after this long
/// is reported failed and its lease is reclaimed.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_millis(4800);

/// Raw-send retries below the instance-ID expiry backstop.
pub const SEND_RETRY_COUNT: u8 = 2;

/// Delay between raw-send retry attempts.
pub const SEND_RETRY_INTERVAL: Duration = Duration::from_millis(1500);

/// Backoff before re-attempting dispatch after lease exhaustion.
pub const EXHAUSTED_BACKOFF: Duration = Duration::from_millis(50);

/// Short polling cadence.
pub const POLL_INTERVAL: Duration = Duration::from_millis(997);

/// Long-running polling cadence.
pub const LONG_RUNNING_POLL_INTERVAL: Duration = Duration::from_secs(61);

/// Wall-clock budget of one short-cadence tick.
pub const POLL_BUDGET: Duration = Duration::from_millis(900);

#[derive(Debug, Clone, Copy)]
pub struct RequesterConfig {
    pub response_timeout: Duration,
    pub retry_count: u8,
    pub retry_interval: Duration,
    pub exhausted_backoff: Duration,
}

impl Default for RequesterConfig {
    fn default() -> Self {
        Self {
            response_timeout: RESPONSE_TIMEOUT,
            retry_count: SEND_RETRY_COUNT,
            retry_interval: SEND_RETRY_INTERVAL,
            exhausted_backoff: EXHAUSTED_BACKOFF,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PollingConfig {
    pub poll_interval: Duration,
    pub long_running_interval: Duration,
    pub poll_budget: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval: POLL_INTERVAL,
            long_running_interval: LONG_RUNNING_POLL_INTERVAL,
            poll_budget: POLL_BUDGET,
        }
    }
}
