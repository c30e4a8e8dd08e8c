// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// End-to-end polling against a scripted device: discovery handshake,
// rotation readiness, capability gating and power-transition re-arm.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use nsm::config::{PollingConfig, RequesterConfig};
use nsm::device::sensor::{ErotStateSensor, InventorySensor, PowerSensor, TemperatureSensor};
use nsm::device::{Device, SensorManager};
use nsm::discovery::{DeviceDiscovery, EndpointInfo};
use nsm::emit::{PropertySink, PropertyValue};
use nsm::protocol::capability::{
    self, CommandCodeMask, DeviceKind, MessageTypeMask,
};
use nsm::protocol::firmware::{
    self, ErotState, ErotStateHeader, ErotStateRequest, SlotInfo,
};
use nsm::protocol::header::{decode_request, encode_response};
use nsm::protocol::telemetry::{self, InventoryProperty, InventoryValue};
use nsm::protocol::{CompletionCode, MessageType};
use nsm::requester::RequestHandler;
use nsm::transport::{Eid, Transport, TransportError};

const EID: Eid = 12;

struct ChannelTransport {
    tx: mpsc::UnboundedSender<(Eid, u8, Vec<u8>)>,
}

impl Transport for ChannelTransport {
    fn send(&self, eid: Eid, tag: u8, bytes: &[u8]) -> Result<(), TransportError> {
        self.tx.send((eid, tag, bytes.to_vec())).map_err(|_| TransportError::Closed)
    }
}

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<(String, String, PropertyValue)>>,
}

impl RecordingSink {
    fn has(&self, path: &str, name: &str) -> bool {
        self.entries.lock().iter().any(|(p, n, _)| p == path && n == name)
    }
}

impl PropertySink for RecordingSink {
    fn set_property(&self, path: &str, name: &str, value: PropertyValue) {
        self.entries.lock().push((path.to_string(), name.to_string(), value));
    }
}

/// Scripted device model. Echoes the request's instance id into every
/// response.
fn respond(frame: &[u8], power_supported: bool) -> Option<Vec<u8>> {
    let (hdr, command, data) = decode_request(frame).ok()?;
    let iid = hdr.instance_id;
    match (hdr.message_type, command) {
        (MessageType::DeviceCapabilityDiscovery, capability::CMD_PING) => Some(
            encode_response(
                iid,
                MessageType::DeviceCapabilityDiscovery,
                capability::CMD_PING,
                CompletionCode::Success,
                0,
                &[],
            )
            .unwrap(),
        ),
        (MessageType::DeviceCapabilityDiscovery, capability::CMD_QUERY_DEVICE_IDENTIFICATION) => {
            Some(
                capability::encode_query_device_identification_resp(iid, DeviceKind::Gpu, 0)
                    .unwrap(),
            )
        }
        (MessageType::DeviceCapabilityDiscovery, capability::CMD_SUPPORTED_MESSAGE_TYPES) => {
            let mut mask = MessageTypeMask::empty();
            mask.set(MessageType::DeviceCapabilityDiscovery as u8);
            mask.set(MessageType::PlatformEnvironmental as u8);
            mask.set(MessageType::Firmware as u8);
            Some(capability::encode_supported_message_types_resp(iid, &mask).unwrap())
        }
        (MessageType::DeviceCapabilityDiscovery, capability::CMD_SUPPORTED_COMMAND_CODES) => {
            let mut mask = CommandCodeMask::empty();
            match data.first().copied() {
                Some(0) => {
                    for code in [
                        capability::CMD_PING,
                        capability::CMD_SUPPORTED_MESSAGE_TYPES,
                        capability::CMD_SUPPORTED_COMMAND_CODES,
                        capability::CMD_QUERY_DEVICE_IDENTIFICATION,
                    ] {
                        mask.set(code);
                    }
                }
                Some(3) => {
                    mask.set(telemetry::CMD_GET_TEMPERATURE_READING);
                    mask.set(telemetry::CMD_GET_INVENTORY_INFORMATION);
                    if power_supported {
                        mask.set(telemetry::CMD_GET_POWER);
                    }
                }
                Some(6) => mask.set(firmware::CMD_QUERY_EROT_STATE),
                _ => {}
            }
            Some(capability::encode_supported_command_codes_resp(iid, &mask).unwrap())
        }
        (MessageType::PlatformEnvironmental, telemetry::CMD_GET_TEMPERATURE_READING) => {
            Some(telemetry::encode_temperature_resp(iid, 41.5).unwrap())
        }
        (MessageType::PlatformEnvironmental, telemetry::CMD_GET_POWER) => {
            Some(telemetry::encode_power_resp(iid, 150_500).unwrap())
        }
        (MessageType::PlatformEnvironmental, telemetry::CMD_GET_INVENTORY_INFORMATION) => {
            let property_id = data.first().copied().unwrap_or(0);
            Some(
                telemetry::encode_inventory_resp(
                    iid,
                    property_id,
                    &InventoryValue::String("NV-PN-1234".to_string()),
                )
                .unwrap(),
            )
        }
        (MessageType::Firmware, firmware::CMD_QUERY_EROT_STATE) => {
            let state = ErotState {
                header: ErotStateHeader {
                    active_slot: 0,
                    slot_count: 1,
                    ..ErotStateHeader::default()
                },
                slots: vec![SlotInfo {
                    slot_id: 0,
                    version: "24.07.11".to_string(),
                    ..SlotInfo::default()
                }],
            };
            Some(firmware::encode_erot_state_resp(iid, &state).unwrap())
        }
        _ => None,
    }
}

struct Harness {
    handler: Arc<RequestHandler>,
    manager: Arc<SensorManager>,
    sink: Arc<RecordingSink>,
    device: Arc<Device>,
}

fn build_harness(power_supported: bool) -> Harness {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let transport = Arc::new(ChannelTransport { tx });
    let config = RequesterConfig { retry_count: 0, ..RequesterConfig::default() };
    let handler = RequestHandler::new(transport, config);
    let sink = Arc::new(RecordingSink::default());
    let polling = PollingConfig {
        poll_interval: Duration::from_millis(50),
        long_running_interval: Duration::from_millis(200),
        poll_budget: Duration::from_millis(40),
    };
    let manager = SensorManager::new(handler.clone(), sink.clone(), polling);

    let responder = handler.clone();
    tokio::spawn(async move {
        while let Some((eid, tag, frame)) = rx.recv().await {
            if let Some(reply) = respond(&frame, power_supported) {
                responder.handle_response(eid, tag, &reply);
            }
        }
    });

    let device = Device::new(EID, "gpu-0");
    device.add_priority_unit(Arc::new(TemperatureSensor {
        name: "die_temp".into(),
        path: "/sensors/gpu0/die_temp".into(),
        sensor_id: 0,
    }));
    device.add_round_robin_unit(Arc::new(TemperatureSensor {
        name: "mem_temp".into(),
        path: "/sensors/gpu0/mem_temp".into(),
        sensor_id: 1,
    }));
    device.add_round_robin_unit(Arc::new(PowerSensor {
        name: "power".into(),
        path: "/sensors/gpu0/power".into(),
        sensor_id: 0,
        averaging_interval: 0,
    }));
    device.add_round_robin_unit(Arc::new(InventorySensor {
        name: "BoardPartNumber".into(),
        path: "/inventory/gpu0".into(),
        property: InventoryProperty::BoardPartNumber,
    }));
    device.add_long_running_unit(Arc::new(ErotStateSensor {
        name: "erot".into(),
        path: "/firmware/gpu0/erot".into(),
        request: ErotStateRequest::default(),
    }));
    manager.add_device(device.clone());

    Harness { handler, manager, sink, device }
}

fn endpoint() -> EndpointInfo {
    EndpointInfo { eid: EID, uuid: "gpu-0".into(), medium: 0, network_id: 0, binding: 0 }
}

async fn wait_ready(manager: &SensorManager, want: bool) {
    let mut watch = manager.ready_watch();
    for _ in 0..200 {
        if *watch.borrow_and_update() == want {
            return;
        }
        watch.changed().await.unwrap();
    }
    panic!("readiness never became {}", want);
}

#[tokio::test(start_paused = true)]
async fn device_becomes_ready_within_one_rotation() {
    let h = build_harness(true);
    let discovery = DeviceDiscovery::new(h.handler.clone(), h.manager.clone());

    let device = discovery.endpoint_added(endpoint()).await.unwrap();
    assert!(device.is_active());
    assert_eq!(device.kind(), DeviceKind::Gpu);

    wait_ready(&h.manager, true).await;
    assert!(h.device.is_ready());
    assert!(h.sink.has("/sensors/gpu0/die_temp", "Value"));
    assert!(h.sink.has("/sensors/gpu0/mem_temp", "Value"));
    assert!(h.sink.has("/sensors/gpu0/power", "Value"));
    assert!(h.sink.has("/inventory/gpu0", "BoardPartNumber"));

    // Long-running cadence publishes independently of readiness.
    for _ in 0..200 {
        if h.sink.has("/firmware/gpu0/erot", "Version") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(h.sink.has("/firmware/gpu0/erot", "Version"));
}

#[tokio::test(start_paused = true)]
async fn power_transition_rearms_and_rediscovery_restores_readiness() {
    let h = build_harness(true);
    let discovery = DeviceDiscovery::new(h.handler.clone(), h.manager.clone());

    discovery.endpoint_added(endpoint()).await.unwrap();
    wait_ready(&h.manager, true).await;

    h.manager.handle_power_transition(EID);
    assert!(!h.device.is_active());
    assert!(!h.device.is_ready());
    wait_ready(&h.manager, false).await;

    // The host reports the endpoint again after the power event.
    discovery.endpoint_added(endpoint()).await.unwrap();
    wait_ready(&h.manager, true).await;
    assert!(h.device.is_ready());
}

#[tokio::test(start_paused = true)]
async fn unsupported_command_is_a_soft_failure() {
    let h = build_harness(false);
    let discovery = DeviceDiscovery::new(h.handler.clone(), h.manager.clone());

    discovery.endpoint_added(endpoint()).await.unwrap();
    // The gated power sensor does not hold readiness hostage.
    wait_ready(&h.manager, true).await;
    assert!(h.sink.has("/sensors/gpu0/mem_temp", "Value"));
    assert!(!h.sink.has("/sensors/gpu0/power", "Value"));
}
