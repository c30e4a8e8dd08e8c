// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use tokio::time::{interval, Instant, MissedTickBehavior};

use crate::config::PollingConfig;
use crate::emit::PropertySink;
use crate::requester::{Cadence, RequestHandler};
use crate::transport::Eid;

use super::{Device, PolledUnit, SchedulerError};

/// Drives both polling cadences for every registered device and derives
/// the service-wide readiness signal.
pub struct SensorManager {
    handler: Arc<RequestHandler>,
    sink: Arc<dyn PropertySink>,
    devices: DashMap<Eid, Arc<Device>>,
    config: PollingConfig,
    ready_tx: watch::Sender<bool>,
}

impl SensorManager {
    pub fn new(
        handler: Arc<RequestHandler>,
        sink: Arc<dyn PropertySink>,
        config: PollingConfig,
    ) -> Arc<Self> {
        let (ready_tx, _) = watch::channel(false);
        Arc::new(Self { handler, sink, devices: DashMap::new(), config, ready_tx })
    }

    /// Observers see `true` once every active device has completed a full
    /// refresh pass, and `false` again after a power transition.
    pub fn ready_watch(&self) -> watch::Receiver<bool> {
        self.ready_tx.subscribe()
    }

    pub fn add_device(&self, device: Arc<Device>) {
        self.devices.insert(device.eid, device);
    }

    pub fn device(&self, eid: Eid) -> Option<Arc<Device>> {
        self.devices.get(&eid).map(|d| Arc::clone(&d))
    }

    pub fn remove_device(&self, eid: Eid) {
        if let Some((_, device)) = self.devices.remove(&eid) {
            device.set_timer_running(false);
            device.set_active(false);
            log::info!("[scheduler] eid {}: device removed", eid);
        }
        self.update_global_ready();
    }

    /// Start both cadence loops for a device. Idempotent while running.
    pub fn start_polling(self: &Arc<Self>, eid: Eid) {
        let Some(device) = self.device(eid) else {
            return;
        };
        if device.timer_running() {
            return;
        }
        device.set_timer_running(true);

        let manager = Arc::clone(self);
        let dev = Arc::clone(&device);
        tokio::spawn(async move {
            let mut tick = interval(manager.config.poll_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if !dev.timer_running() {
                    return;
                }
                manager.short_tick(&dev).await;
            }
        });

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut tick = interval(manager.config.long_running_interval);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                if !device.timer_running() {
                    return;
                }
                manager.long_tick(&device).await;
            }
        });
    }

    pub fn stop_polling(&self, eid: Eid) {
        if let Some(device) = self.device(eid) {
            device.set_timer_running(false);
        }
    }

    /// Power-state signal from the host: the device left standby and its
    /// static state can no longer be trusted.
    pub fn handle_power_transition(&self, eid: Eid) {
        if let Some(device) = self.device(eid) {
            device.rearm_after_power_transition();
        }
        self.update_global_ready();
    }

    /// One short-cadence tick: priority units once each, then round-robin
    /// for the rest of the budget. Aborts mid-run when the device timer is
    /// found stopped.
    async fn short_tick(self: &Arc<Self>, device: &Arc<Device>) {
        if !device.is_active() {
            log::debug!("[scheduler] eid {}: inactive, skipping tick", device.eid);
            return;
        }
        let deadline = Instant::now() + self.config.poll_budget;

        for unit in device.snapshot_priority() {
            if !device.timer_running() {
                return;
            }
            self.run_unit(device, &unit, Cadence::Regular).await;
        }

        // One pass over the queue as it stood at tick start. Units pushed
        // back during the pass wait for the next tick.
        let mut remaining = device.round_robin_len();
        while remaining > 0 {
            if !device.timer_running() || Instant::now() >= deadline {
                return;
            }
            let Some(unit) = device.pop_round_robin() else {
                break;
            };
            let succeeded = self.run_unit(device, &unit, Cadence::Regular).await;
            // A visit completes this unit's share of the rotation even if
            // the command soft-failed.
            unit.mark_refreshed();
            device.requeue(unit, succeeded);
            remaining -= 1;
        }
        // Ready once every rotating unit has been visited, including any
        // added mid-rotation; an emptied queue counts as a full pass.
        if !device.is_ready() && device.rotation_complete() {
            self.declare_ready(device);
        }
    }

    /// One long-cadence tick: every long-running unit once. No readiness
    /// side effects.
    async fn long_tick(self: &Arc<Self>, device: &Arc<Device>) {
        if !device.is_active() {
            return;
        }
        for unit in device.snapshot_long_running() {
            if !device.timer_running() {
                return;
            }
            self.run_unit(device, &unit, Cadence::LongRunning).await;
        }
    }

    /// Run one unit to completion. All failures are absorbed here; the
    /// return value only feeds static-unit retirement.
    async fn run_unit(&self, device: &Arc<Device>, unit: &PolledUnit, cadence: Cadence) -> bool {
        let sensor = &unit.sensor;
        if !device.supports(sensor.message_type(), sensor.command()) {
            log::debug!(
                "[scheduler] eid {}: {} rejected: {}",
                device.eid,
                sensor.name(),
                SchedulerError::Unsupported
            );
            return false;
        }
        let request = match sensor.gen_request() {
            Ok(request) => request,
            Err(e) => {
                log::warn!("[scheduler] eid {}: {} bad request: {}", device.eid, sensor.name(), e);
                return false;
            }
        };
        match self.handler.send_recv(device.eid, cadence, request).await {
            Ok(bytes) => match sensor.handle_response(&bytes, &*self.sink) {
                Ok(cc) if cc.is_success() => true,
                Ok(cc) => {
                    log::debug!(
                        "[scheduler] eid {}: {} completed with {:?}",
                        device.eid,
                        sensor.name(),
                        cc
                    );
                    false
                }
                Err(e) => {
                    log::warn!(
                        "[scheduler] eid {}: {} bad response: {}",
                        device.eid,
                        sensor.name(),
                        e
                    );
                    false
                }
            },
            Err(e) => {
                log::debug!("[scheduler] eid {}: {} failed: {}", device.eid, sensor.name(), e);
                false
            }
        }
    }

    fn declare_ready(&self, device: &Arc<Device>) {
        if device.is_ready() {
            return;
        }
        device.set_ready(true);
        log::info!("[scheduler] eid {}: device ready", device.eid);
        self.update_global_ready();
    }

    /// Service-wide ready means at least one active device and all active
    /// devices individually ready.
    fn update_global_ready(&self) {
        let mut any_active = false;
        let mut all_ready = true;
        for entry in self.devices.iter() {
            if entry.is_active() {
                any_active = true;
                all_ready &= entry.is_ready();
            }
        }
        let ready = any_active && all_ready;
        self.ready_tx.send_if_modified(|current| {
            if *current != ready {
                *current = ready;
                log::info!("[scheduler] service ready = {}", ready);
                true
            } else {
                false
            }
        });
    }
}
