// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pollable units. A [`Sensor`] builds its own request frame and consumes
//! the matched response, emitting decoded values through the property
//! sink. Instance IDs are encoded as zero and patched in by the requester.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::emit::{PropertySink, PropertyValue};
use crate::protocol::firmware::{self, ErotStateRequest};
use crate::protocol::telemetry::{self, InventoryProperty, InventoryValue};
use crate::protocol::{CodecResult, CompletionCode, MessageType};

pub trait Sensor: Send + Sync {
    fn name(&self) -> &str;

    /// Object-model path the sensor's properties are published under.
    fn object_path(&self) -> &str;

    fn message_type(&self) -> MessageType;

    fn command(&self) -> u8;

    /// Static sensors hold values that only change across power
    /// transitions; one successful refresh retires them from rotation.
    fn is_static(&self) -> bool {
        false
    }

    fn gen_request(&self) -> CodecResult<Vec<u8>>;

    /// Decode the matched response and publish. Returns the completion
    /// code so the scheduler can tell a soft command failure from a
    /// refresh; decode failures are codec errors.
    fn handle_response(&self, msg: &[u8], sink: &dyn PropertySink) -> CodecResult<CompletionCode>;
}

/// A sensor plus its rotation state.
pub struct PolledUnit {
    pub sensor: Arc<dyn Sensor>,
    refreshed: AtomicBool,
}

impl PolledUnit {
    pub fn new(sensor: Arc<dyn Sensor>) -> Arc<Self> {
        Arc::new(Self { sensor, refreshed: AtomicBool::new(false) })
    }

    pub fn is_refreshed(&self) -> bool {
        self.refreshed.load(Ordering::Acquire)
    }

    pub fn mark_refreshed(&self) {
        self.refreshed.store(true, Ordering::Release);
    }

    pub fn clear_refreshed(&self) {
        self.refreshed.store(false, Ordering::Release);
    }
}

/// Thermal reading in degrees Celsius, published as `Value`.
pub struct TemperatureSensor {
    pub name: String,
    pub path: String,
    pub sensor_id: u8,
}

impl Sensor for TemperatureSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn object_path(&self) -> &str {
        &self.path
    }

    fn message_type(&self) -> MessageType {
        MessageType::PlatformEnvironmental
    }

    fn command(&self) -> u8 {
        telemetry::CMD_GET_TEMPERATURE_READING
    }

    fn gen_request(&self) -> CodecResult<Vec<u8>> {
        telemetry::encode_temperature_req(0, self.sensor_id)
    }

    fn handle_response(&self, msg: &[u8], sink: &dyn PropertySink) -> CodecResult<CompletionCode> {
        let (info, celsius) = telemetry::decode_temperature_resp(msg)?;
        if info.completion.is_success() {
            sink.set_property(&self.path, "Value", PropertyValue::F64(celsius as f64));
        }
        Ok(info.completion)
    }
}

/// Power draw, published as `Value` in watts.
pub struct PowerSensor {
    pub name: String,
    pub path: String,
    pub sensor_id: u8,
    pub averaging_interval: u8,
}

impl Sensor for PowerSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn object_path(&self) -> &str {
        &self.path
    }

    fn message_type(&self) -> MessageType {
        MessageType::PlatformEnvironmental
    }

    fn command(&self) -> u8 {
        telemetry::CMD_GET_POWER
    }

    fn gen_request(&self) -> CodecResult<Vec<u8>> {
        telemetry::encode_power_req(0, self.sensor_id, self.averaging_interval)
    }

    fn handle_response(&self, msg: &[u8], sink: &dyn PropertySink) -> CodecResult<CompletionCode> {
        let (info, milliwatts) = telemetry::decode_power_resp(msg)?;
        if info.completion.is_success() {
            sink.set_property(&self.path, "Value", PropertyValue::F64(milliwatts as f64 / 1000.0));
        }
        Ok(info.completion)
    }
}

/// One inventory property. Static; retired from rotation after the first
/// successful read.
pub struct InventorySensor {
    pub name: String,
    pub path: String,
    pub property: InventoryProperty,
}

impl Sensor for InventorySensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn object_path(&self) -> &str {
        &self.path
    }

    fn message_type(&self) -> MessageType {
        MessageType::PlatformEnvironmental
    }

    fn command(&self) -> u8 {
        telemetry::CMD_GET_INVENTORY_INFORMATION
    }

    fn is_static(&self) -> bool {
        true
    }

    fn gen_request(&self) -> CodecResult<Vec<u8>> {
        telemetry::encode_inventory_req(0, self.property as u8)
    }

    fn handle_response(&self, msg: &[u8], sink: &dyn PropertySink) -> CodecResult<CompletionCode> {
        let (info, property_id, value) = telemetry::decode_inventory_resp(msg)?;
        if info.completion.is_success() {
            if property_id != self.property as u8 {
                log::debug!(
                    "[sensor] {}: inventory response for property {} (wanted {})",
                    self.name,
                    property_id,
                    self.property as u8
                );
            } else {
                sink.set_property(&self.path, &self.name, inventory_to_property(value));
            }
        }
        Ok(info.completion)
    }
}

fn inventory_to_property(value: InventoryValue) -> PropertyValue {
    match value {
        InventoryValue::Bool(v) => PropertyValue::Bool(v),
        InventoryValue::U8(v) => PropertyValue::U64(v as u64),
        InventoryValue::I8(v) => PropertyValue::I64(v as i64),
        InventoryValue::U16(v) => PropertyValue::U64(v as u64),
        InventoryValue::I16(v) => PropertyValue::I64(v as i64),
        InventoryValue::U32(v) => PropertyValue::U64(v as u64),
        InventoryValue::I32(v) => PropertyValue::I64(v as i64),
        InventoryValue::U64(v) => PropertyValue::U64(v),
        InventoryValue::I64(v) => PropertyValue::I64(v),
        InventoryValue::Fixed24_8(v) => PropertyValue::F64(v),
        InventoryValue::String(v) => PropertyValue::Text(v),
        InventoryValue::Bytes(v) => {
            let hex: String = v.iter().map(|b| format!("{:02x}", b)).collect();
            PropertyValue::Text(hex)
        }
    }
}

/// Security-processor firmware state. Long-running cadence; publishes the
/// active slot and its version.
pub struct ErotStateSensor {
    pub name: String,
    pub path: String,
    pub request: ErotStateRequest,
}

impl Sensor for ErotStateSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn object_path(&self) -> &str {
        &self.path
    }

    fn message_type(&self) -> MessageType {
        MessageType::Firmware
    }

    fn command(&self) -> u8 {
        firmware::CMD_QUERY_EROT_STATE
    }

    fn gen_request(&self) -> CodecResult<Vec<u8>> {
        firmware::encode_erot_state_req(0, &self.request)
    }

    fn handle_response(&self, msg: &[u8], sink: &dyn PropertySink) -> CodecResult<CompletionCode> {
        let (info, state) = firmware::decode_erot_state_resp(msg)?;
        if let Some(state) = state {
            sink.set_property(
                &self.path,
                "ActiveSlot",
                PropertyValue::U64(state.header.active_slot as u64),
            );
            sink.set_property(
                &self.path,
                "SlotCount",
                PropertyValue::U64(state.header.slot_count as u64),
            );
            sink.set_property(
                &self.path,
                "BootStatusCode",
                PropertyValue::U64(state.header.boot_status_code),
            );
            for slot in &state.slots {
                if slot.slot_id == state.header.active_slot {
                    sink.set_property(
                        &self.path,
                        "Version",
                        PropertyValue::Text(slot.version.clone()),
                    );
                }
            }
        }
        Ok(info.completion)
    }
}
