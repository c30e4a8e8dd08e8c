// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Object-model boundary. Decoded readings and states leave the core
//! through [`PropertySink`], fire-and-forget. The host side adapts this to
//! whatever property store it publishes (D-Bus, Redfish cache, tests).

use std::fmt;

/// Value shapes the core emits.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    U64(u64),
    I64(i64),
    F64(f64),
    Text(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Bool(v) => write!(f, "{}", v),
            PropertyValue::U64(v) => write!(f, "{}", v),
            PropertyValue::I64(v) => write!(f, "{}", v),
            PropertyValue::F64(v) => write!(f, "{}", v),
            PropertyValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// Write contract of the external property store. Implementations must
/// not block; failures are theirs to absorb.
pub trait PropertySink: Send + Sync {
    fn set_property(&self, path: &str, name: &str, value: PropertyValue);
}

/// Sink that drops everything after a trace line. Useful standalone and
/// as the default until the host wires a real store.
#[derive(Debug, Default)]
pub struct NullSink;

impl PropertySink for NullSink {
    fn set_property(&self, path: &str, name: &str, value: PropertyValue) {
        log::trace!("[emit] {} {} = {}", path, name, value);
    }
}
