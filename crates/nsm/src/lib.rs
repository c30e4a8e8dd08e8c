// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # NSM - management-controller stack for accelerator devices
//!
//! Polls GPUs, switches and bridges over the NSM vendor protocol: a
//! bit-exact wire codec, a per-endpoint request/response engine with
//! instance-ID correlation, and a budgeted polling scheduler that derives
//! a service-wide readiness signal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use nsm::config::{PollingConfig, RequesterConfig};
//! use nsm::device::SensorManager;
//! use nsm::discovery::{DeviceDiscovery, EndpointInfo};
//! use nsm::emit::NullSink;
//! use nsm::requester::RequestHandler;
//! use nsm::transport::{Eid, Transport, TransportError};
//!
//! struct HostTransport;
//!
//! impl Transport for HostTransport {
//!     fn send(&self, _eid: Eid, _tag: u8, _bytes: &[u8]) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let handler = RequestHandler::new(Arc::new(HostTransport), RequesterConfig::default());
//! let manager = SensorManager::new(handler.clone(), Arc::new(NullSink), PollingConfig::default());
//! let discovery = DeviceDiscovery::new(handler.clone(), manager.clone());
//!
//! let info = EndpointInfo { eid: 12, uuid: "gpu-0".into(), medium: 0, network_id: 0, binding: 0 };
//! let device = discovery.endpoint_added(info).await?;
//! # let _ = device; Ok(())
//! # }
//! ```
//!
//! Inbound frames from the host I/O layer go to
//! [`requester::RequestHandler::handle_response`]; decoded readings leave
//! through [`emit::PropertySink`].
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Discovery / Devices                     |
//! |   DeviceDiscovery -> Device records -> capability masks      |
//! +--------------------------------------------------------------+
//! |                      Polling Scheduler                       |
//! |   priority pass | round-robin budget | readiness derivation  |
//! +--------------------------------------------------------------+
//! |                  Request/Response Engine                     |
//! |   per-endpoint FIFO | instance-ID leases | expiry + retries  |
//! +--------------------------------------------------------------+
//! |                         Wire Codec                           |
//! |   headers | command payloads | tagged-field aggregates       |
//! +--------------------------------------------------------------+
//! ```

pub mod config;
pub mod device;
pub mod discovery;
pub mod emit;
pub mod instance_id;
pub mod protocol;
pub mod requester;
pub mod transport;

pub use device::{Device, SensorManager};
pub use discovery::DeviceDiscovery;
pub use emit::{PropertySink, PropertyValue};
pub use requester::{Cadence, RequestHandler, RequesterError};
pub use transport::{Eid, Transport, TransportError};
