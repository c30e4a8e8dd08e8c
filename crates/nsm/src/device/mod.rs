// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Managed-device records and the polling scheduler built on them.
//!
//! A [`Device`] owns four unit queues. Priority units run once every short
//! tick; round-robin units share the remaining budget and rotate; static
//! units that succeed retire to a standby list until the next power
//! transition; long-running units live on their own slow cadence.

mod scheduler;
pub mod sensor;

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::protocol::capability::{CommandCodeMask, DeviceKind, MessageTypeMask};
use crate::protocol::MessageType;
use crate::transport::Eid;

pub use scheduler::SensorManager;
pub use sensor::{PolledUnit, Sensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// Command not in the device's capability mask. Rejected before send;
    /// units treat this as a soft failure.
    Unsupported,
    /// The device is inactive; the whole tick is skipped.
    DeviceInactive,
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::Unsupported => write!(f, "command unsupported by device"),
            SchedulerError::DeviceInactive => write!(f, "device inactive"),
        }
    }
}

impl std::error::Error for SchedulerError {}

#[derive(Default)]
struct UnitQueues {
    priority: Vec<Arc<PolledUnit>>,
    round_robin: VecDeque<Arc<PolledUnit>>,
    long_running: Vec<Arc<PolledUnit>>,
    /// Static units retired after a successful refresh. Re-queued into
    /// round-robin on a power transition.
    standby: Vec<Arc<PolledUnit>>,
}

#[derive(Default)]
struct Capabilities {
    types: MessageTypeMask,
    commands: HashMap<u8, CommandCodeMask>,
}

/// One managed endpoint and its polling state.
pub struct Device {
    pub eid: Eid,
    pub uuid: String,
    kind: Mutex<DeviceKind>,
    active: AtomicBool,
    ready: AtomicBool,
    /// Cleared to stop both cadence loops; ticks also abort early when
    /// they observe it cleared mid-run.
    timer_running: AtomicBool,
    queues: Mutex<UnitQueues>,
    caps: Mutex<Capabilities>,
}

impl Device {
    pub fn new(eid: Eid, uuid: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            eid,
            uuid: uuid.into(),
            kind: Mutex::new(DeviceKind::Unknown),
            active: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            timer_running: AtomicBool::new(false),
            queues: Mutex::new(UnitQueues::default()),
            caps: Mutex::new(Capabilities::default()),
        })
    }

    pub fn kind(&self) -> DeviceKind {
        *self.kind.lock()
    }

    pub fn set_kind(&self, kind: DeviceKind) {
        *self.kind.lock() = kind;
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Release);
    }

    pub(crate) fn timer_running(&self) -> bool {
        self.timer_running.load(Ordering::Acquire)
    }

    pub(crate) fn set_timer_running(&self, running: bool) {
        self.timer_running.store(running, Ordering::Release);
    }

    pub fn add_priority_unit(&self, sensor: Arc<dyn Sensor>) {
        self.queues.lock().priority.push(PolledUnit::new(sensor));
    }

    pub fn add_round_robin_unit(&self, sensor: Arc<dyn Sensor>) {
        self.queues.lock().round_robin.push_back(PolledUnit::new(sensor));
    }

    pub fn add_long_running_unit(&self, sensor: Arc<dyn Sensor>) {
        self.queues.lock().long_running.push(PolledUnit::new(sensor));
    }

    /// Learned capability masks replace any earlier state wholesale.
    pub fn set_capabilities(&self, types: MessageTypeMask) {
        let mut caps = self.caps.lock();
        caps.types = types;
        caps.commands.clear();
    }

    pub fn set_command_mask(&self, message_type: MessageType, mask: CommandCodeMask) {
        self.caps.lock().commands.insert(message_type as u8, mask);
    }

    /// Capability gate checked before every send.
    pub fn supports(&self, message_type: MessageType, command: u8) -> bool {
        let caps = self.caps.lock();
        caps.types.is_set(message_type as u8)
            && caps
                .commands
                .get(&(message_type as u8))
                .map(|mask| mask.is_set(command))
                .unwrap_or(false)
    }

    fn snapshot_priority(&self) -> Vec<Arc<PolledUnit>> {
        self.queues.lock().priority.clone()
    }

    fn snapshot_long_running(&self) -> Vec<Arc<PolledUnit>> {
        self.queues.lock().long_running.clone()
    }

    fn pop_round_robin(&self) -> Option<Arc<PolledUnit>> {
        self.queues.lock().round_robin.pop_front()
    }

    fn round_robin_len(&self) -> usize {
        self.queues.lock().round_robin.len()
    }

    /// Re-queue after a run. A static unit that succeeded retires to the
    /// standby list instead of rotating.
    fn requeue(&self, unit: Arc<PolledUnit>, succeeded: bool) {
        let mut queues = self.queues.lock();
        if succeeded && unit.sensor.is_static() {
            queues.standby.push(unit);
        } else {
            queues.round_robin.push_back(unit);
        }
    }

    /// A refresh pass is complete once every unit still rotating has been
    /// visited. Units added mid-rotation hold readiness off until they are
    /// visited too.
    fn rotation_complete(&self) -> bool {
        let queues = self.queues.lock();
        queues.round_robin.iter().all(|u| u.is_refreshed())
    }

    /// Power-transition re-arm: every rotating unit forgets its refresh,
    /// retired static units rejoin the rotation and the device drops out
    /// of active/ready until rediscovered.
    pub fn rearm_after_power_transition(&self) {
        let mut queues = self.queues.lock();
        for unit in queues.round_robin.iter().chain(queues.standby.iter()) {
            unit.clear_refreshed();
        }
        let standby = std::mem::take(&mut queues.standby);
        queues.round_robin.extend(standby);
        drop(queues);
        self.set_ready(false);
        self.set_active(false);
        log::info!("[device] eid {}: re-armed after power transition", self.eid);
    }
}
