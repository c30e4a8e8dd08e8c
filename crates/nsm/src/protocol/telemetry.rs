// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type 3 platform-environmental commands: temperature, power, inventory.

use super::cursor::Cursor;
use super::header::{decode_response, decode_response_fixed, encode_request, encode_response, ResponseInfo};
use super::{CodecError, CodecResult, CompletionCode, MessageType};

pub const CMD_GET_TEMPERATURE_READING: u8 = 0x01;
pub const CMD_GET_POWER: u8 = 0x02;
pub const CMD_GET_INVENTORY_INFORMATION: u8 = 0x07;

/// Inventory property identifiers (subset; the catalog is extensible).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum InventoryProperty {
    BoardPartNumber = 0,
    SerialNumber = 1,
    MarketingName = 2,
    DevicePartNumber = 3,
    MemoryVendor = 5,
    MaximumMemoryCapacity = 7,
    BuildDate = 8,
    FirmwareVersion = 9,
    DeviceGuid = 10,
}

/// Typed value of an inventory property record.
#[derive(Debug, Clone, PartialEq)]
pub enum InventoryValue {
    Bool(bool),
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    /// Signed 24.8 fixed point, converted out of band.
    Fixed24_8(f64),
    String(String),
    Bytes(Vec<u8>),
}

const DATA_TYPE_BOOL8: u8 = 0;
const DATA_TYPE_U8: u8 = 1;
const DATA_TYPE_I8: u8 = 2;
const DATA_TYPE_U16: u8 = 3;
const DATA_TYPE_I16: u8 = 4;
const DATA_TYPE_U32: u8 = 5;
const DATA_TYPE_I32: u8 = 6;
const DATA_TYPE_U64: u8 = 7;
const DATA_TYPE_I64: u8 = 8;
const DATA_TYPE_S24_8: u8 = 9;
const DATA_TYPE_CSTRING: u8 = 10;
const DATA_TYPE_BYTES: u8 = 11;

/// Request data: `{sensor_id, reserved}`.
pub fn encode_temperature_req(instance_id: u8, sensor_id: u8) -> CodecResult<Vec<u8>> {
    encode_request(
        instance_id,
        MessageType::PlatformEnvironmental,
        CMD_GET_TEMPERATURE_READING,
        &[sensor_id, 0],
    )
}

pub fn encode_temperature_resp(instance_id: u8, celsius: f32) -> CodecResult<Vec<u8>> {
    encode_response(
        instance_id,
        MessageType::PlatformEnvironmental,
        CMD_GET_TEMPERATURE_READING,
        CompletionCode::Success,
        0,
        &celsius.to_bits().to_le_bytes(),
    )
}

/// Reading travels as IEEE-754 bits in a little-endian u32.
pub fn decode_temperature_resp(msg: &[u8]) -> CodecResult<(ResponseInfo, f32)> {
    let (_, info, data) = decode_response_fixed(msg, 4)?;
    if !info.completion.is_success() {
        return Ok((info, 0.0));
    }
    let mut cur = Cursor::new(data);
    let raw = cur.read_u32_le()?;
    let reading = f32::from_bits(raw);
    if !reading.is_finite() {
        return Err(CodecError::Data { reason: "non-finite temperature reading" });
    }
    Ok((info, reading))
}

/// Request data: `{sensor_id, averaging_interval}`.
pub fn encode_power_req(
    instance_id: u8,
    sensor_id: u8,
    averaging_interval: u8,
) -> CodecResult<Vec<u8>> {
    encode_request(
        instance_id,
        MessageType::PlatformEnvironmental,
        CMD_GET_POWER,
        &[sensor_id, averaging_interval],
    )
}

pub fn encode_power_resp(instance_id: u8, milliwatts: u32) -> CodecResult<Vec<u8>> {
    encode_response(
        instance_id,
        MessageType::PlatformEnvironmental,
        CMD_GET_POWER,
        CompletionCode::Success,
        0,
        &milliwatts.to_le_bytes(),
    )
}

pub fn decode_power_resp(msg: &[u8]) -> CodecResult<(ResponseInfo, u32)> {
    let (_, info, data) = decode_response_fixed(msg, 4)?;
    if !info.completion.is_success() {
        return Ok((info, 0));
    }
    let mut cur = Cursor::new(data);
    let milliwatts = cur.read_u32_le()?;
    Ok((info, milliwatts))
}

/// Request data: `{property_id, reserved}`.
pub fn encode_inventory_req(instance_id: u8, property_id: u8) -> CodecResult<Vec<u8>> {
    encode_request(
        instance_id,
        MessageType::PlatformEnvironmental,
        CMD_GET_INVENTORY_INFORMATION,
        &[property_id, 0],
    )
}

/// Response data is one property record:
/// `{property_id, data_type nibble, data_length u16 LE, data}`.
pub fn encode_inventory_resp(
    instance_id: u8,
    property_id: u8,
    value: &InventoryValue,
) -> CodecResult<Vec<u8>> {
    let (data_type, bytes) = match value {
        InventoryValue::Bool(v) => (DATA_TYPE_BOOL8, vec![u8::from(*v)]),
        InventoryValue::U8(v) => (DATA_TYPE_U8, vec![*v]),
        InventoryValue::I8(v) => (DATA_TYPE_I8, v.to_le_bytes().to_vec()),
        InventoryValue::U16(v) => (DATA_TYPE_U16, v.to_le_bytes().to_vec()),
        InventoryValue::I16(v) => (DATA_TYPE_I16, v.to_le_bytes().to_vec()),
        InventoryValue::U32(v) => (DATA_TYPE_U32, v.to_le_bytes().to_vec()),
        InventoryValue::I32(v) => (DATA_TYPE_I32, v.to_le_bytes().to_vec()),
        InventoryValue::U64(v) => (DATA_TYPE_U64, v.to_le_bytes().to_vec()),
        InventoryValue::I64(v) => (DATA_TYPE_I64, v.to_le_bytes().to_vec()),
        InventoryValue::Fixed24_8(v) => {
            let raw = (*v * 256.0).round() as i32;
            (DATA_TYPE_S24_8, raw.to_le_bytes().to_vec())
        }
        InventoryValue::String(v) => (DATA_TYPE_CSTRING, v.as_bytes().to_vec()),
        InventoryValue::Bytes(v) => (DATA_TYPE_BYTES, v.clone()),
    };
    if bytes.len() > u16::MAX as usize {
        return Err(CodecError::Data { reason: "inventory data longer than 65535 bytes" });
    }
    let mut record = Vec::with_capacity(4 + bytes.len());
    record.push(property_id);
    record.push(data_type & 0x0F);
    record.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
    record.extend_from_slice(&bytes);
    encode_response(
        instance_id,
        MessageType::PlatformEnvironmental,
        CMD_GET_INVENTORY_INFORMATION,
        CompletionCode::Success,
        0,
        &record,
    )
}

pub fn decode_inventory_resp(msg: &[u8]) -> CodecResult<(ResponseInfo, u8, InventoryValue)> {
    let (_, info, data) = decode_response(msg)?;
    if !info.completion.is_success() {
        return Ok((info, 0, InventoryValue::Bytes(Vec::new())));
    }
    let mut cur = Cursor::new(data);
    let property_id = cur.read_u8()?;
    let data_type = cur.read_u8()? & 0x0F;
    let data_length = cur.read_u16_le()? as usize;
    let raw = cur.take(data_length)?;

    let expect = |n: usize| -> CodecResult<()> {
        if raw.len() == n {
            Ok(())
        } else {
            Err(CodecError::Data { reason: "wrong length for inventory data type" })
        }
    };
    let mut field = Cursor::new(raw);
    let value = match data_type {
        DATA_TYPE_BOOL8 => {
            expect(1)?;
            InventoryValue::Bool(field.read_u8()? != 0)
        }
        DATA_TYPE_U8 => {
            expect(1)?;
            InventoryValue::U8(field.read_u8()?)
        }
        DATA_TYPE_I8 => {
            expect(1)?;
            InventoryValue::I8(field.read_u8()? as i8)
        }
        DATA_TYPE_U16 => {
            expect(2)?;
            InventoryValue::U16(field.read_u16_le()?)
        }
        DATA_TYPE_I16 => {
            expect(2)?;
            InventoryValue::I16(field.read_u16_le()? as i16)
        }
        DATA_TYPE_U32 => {
            expect(4)?;
            InventoryValue::U32(field.read_u32_le()?)
        }
        DATA_TYPE_I32 => {
            expect(4)?;
            InventoryValue::I32(field.read_i32_le()?)
        }
        DATA_TYPE_U64 => {
            expect(8)?;
            InventoryValue::U64(field.read_u64_le()?)
        }
        DATA_TYPE_I64 => {
            expect(8)?;
            InventoryValue::I64(field.read_u64_le()? as i64)
        }
        DATA_TYPE_S24_8 => {
            expect(4)?;
            InventoryValue::Fixed24_8(f64::from(field.read_i32_le()?) / 256.0)
        }
        DATA_TYPE_CSTRING => InventoryValue::String(
            String::from_utf8(raw.to_vec())
                .map_err(|_| CodecError::Data { reason: "inventory string is not UTF-8" })?,
        ),
        DATA_TYPE_BYTES => InventoryValue::Bytes(raw.to_vec()),
        _ => return Err(CodecError::Data { reason: "unknown inventory data type" }),
    };
    Ok((info, property_id, value))
}
