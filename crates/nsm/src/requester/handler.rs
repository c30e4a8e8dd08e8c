// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio::time::sleep;

use crate::config::RequesterConfig;
use crate::instance_id::{InstanceIdAllocator, InstanceIdError};
use crate::protocol::cursor::Cursor;
use crate::protocol::header::{patch_instance_id, unpack_header};
use crate::protocol::MessageKind;
use crate::transport::{Eid, Transport};

use super::track::TimeoutTracker;
use super::{Cadence, RequesterError};

type Reply = oneshot::Sender<Result<Vec<u8>, RequesterError>>;
type Key = (Eid, Cadence);

enum TimerCmd {
    Cancel,
    ForceExpire,
}

struct PendingEntry {
    seq: u64,
    request: Vec<u8>,
    reply: Option<Reply>,
    instance_id: Option<u8>,
    valid: bool,
}

/// One FIFO lane. `live` means the front entry holds a lease and has an
/// armed expiry timer; everything behind it waits.
#[derive(Default)]
struct Lane {
    entries: VecDeque<PendingEntry>,
    live: bool,
    next_seq: u64,
    timer: Option<oneshot::Sender<TimerCmd>>,
}

/// Request/response engine. One instance serves every endpoint; lanes are
/// keyed by (endpoint, cadence) and never overlap requests in flight.
pub struct RequestHandler {
    transport: Arc<dyn Transport>,
    allocator: InstanceIdAllocator,
    lanes: DashMap<Key, Lane>,
    config: RequesterConfig,
    tracker: TimeoutTracker,
}

impl RequestHandler {
    pub fn new(transport: Arc<dyn Transport>, config: RequesterConfig) -> Arc<Self> {
        Arc::new(Self {
            transport,
            allocator: InstanceIdAllocator::new(),
            lanes: DashMap::new(),
            config,
            tracker: TimeoutTracker::default(),
        })
    }

    /// True while the endpoint has timed out and not yet answered again.
    pub fn is_degraded(&self, eid: Eid) -> bool {
        self.tracker.is_degraded(eid)
    }

    /// Queue a serialized request and suspend until its response arrives
    /// or the expiry timer gives up. The instance-id field of the frame is
    /// overwritten once a lease is held; callers encode it as zero.
    pub async fn send_recv(
        self: &Arc<Self>,
        eid: Eid,
        cadence: Cadence,
        request: Vec<u8>,
    ) -> Result<Vec<u8>, RequesterError> {
        let (tx, rx) = oneshot::channel();
        {
            let mut lane = self.lanes.entry((eid, cadence)).or_default();
            let seq = lane.next_seq;
            lane.next_seq += 1;
            lane.entries.push_back(PendingEntry {
                seq,
                request,
                reply: Some(tx),
                instance_id: None,
                valid: true,
            });
        }
        self.run_next(eid, cadence);
        rx.await.unwrap_or(Err(RequesterError::Shutdown))
    }

    /// True while a leased request for the lane is awaiting its response.
    pub fn in_flight(&self, eid: Eid, cadence: Cadence) -> bool {
        self.lanes.get(&(eid, cadence)).map(|l| l.live).unwrap_or(false)
    }

    /// Mark the live entry invalid and force its timer to fire now. The
    /// caller gets `Invalidated` unless a genuine response races in first.
    pub fn invalidate(&self, eid: Eid, cadence: Cadence) {
        let Some(mut lane) = self.lanes.get_mut(&(eid, cadence)) else {
            return;
        };
        if !lane.live {
            return;
        }
        if let Some(front) = lane.entries.front_mut() {
            front.valid = false;
        }
        if let Some(timer) = lane.timer.take() {
            let _ = timer.send(TimerCmd::ForceExpire);
        }
    }

    /// Inbound bytes from the host transport. Frames that fail header
    /// validation or do not correlate with the live entry are discarded;
    /// the live entry is never disturbed by a stale instance id.
    pub fn handle_response(self: &Arc<Self>, eid: Eid, tag: u8, bytes: &[u8]) {
        let Some(cadence) = Cadence::from_tag(tag) else {
            log::debug!("[requester] eid {}: discarding frame with unknown tag {}", eid, tag);
            return;
        };
        let mut cur = Cursor::new(bytes);
        let hdr = match unpack_header(&mut cur) {
            Ok(hdr) => hdr,
            Err(e) => {
                log::debug!("[requester] eid {}: discarding malformed frame: {}", eid, e);
                return;
            }
        };
        if hdr.kind != MessageKind::Response {
            log::debug!("[requester] eid {}: discarding non-response frame", eid);
            return;
        }

        let entry = {
            let Some(mut lane) = self.lanes.get_mut(&(eid, cadence)) else {
                log::debug!("[requester] eid {}: response with no request in flight", eid);
                return;
            };
            if !lane.live {
                log::debug!("[requester] eid {}: response with no request in flight", eid);
                return;
            }
            let leased = lane.entries.front().and_then(|e| e.instance_id);
            if leased != Some(hdr.instance_id) {
                log::debug!(
                    "[requester] eid {}: discarding stale instance id {} (live {:?})",
                    eid,
                    hdr.instance_id,
                    leased
                );
                return;
            }
            let Some(entry) = lane.entries.pop_front() else {
                return;
            };
            lane.live = false;
            if let Some(timer) = lane.timer.take() {
                let _ = timer.send(TimerCmd::Cancel);
            }
            entry
        };

        if let Some(id) = entry.instance_id {
            self.release(eid, id);
        }
        self.tracker.record_success(eid, &entry.request);
        if let Some(reply) = entry.reply {
            let _ = reply.send(Ok(bytes.to_vec()));
        }
        self.run_next(eid, cadence);
    }

    /// Dispatch the front entry of an idle non-empty lane. Entries whose
    /// lease or first send fails are failed in place and the next entry is
    /// tried, so one bad frame never wedges the lane.
    fn run_next(self: &Arc<Self>, eid: Eid, cadence: Cadence) {
        loop {
            let Some(mut lane) = self.lanes.get_mut(&(eid, cadence)) else {
                return;
            };
            if lane.live || lane.entries.is_empty() {
                return;
            }

            let id = match self.allocator.allocate(eid) {
                Ok(id) => id,
                Err(InstanceIdError::Exhausted) => {
                    drop(lane);
                    let handler = Arc::clone(self);
                    let backoff = self.config.exhausted_backoff;
                    log::debug!("[requester] eid {}: lease pool exhausted, backing off", eid);
                    tokio::spawn(async move {
                        sleep(backoff).await;
                        handler.run_next(eid, cadence);
                    });
                    return;
                }
                Err(e) => {
                    log::error!("[requester] eid {}: lease allocation failed: {}", eid, e);
                    Self::fail_front(&mut lane, RequesterError::Pool(e));
                    continue;
                }
            };

            let Some(front) = lane.entries.front_mut() else {
                self.release(eid, id);
                return;
            };
            if let Err(e) = patch_instance_id(&mut front.request, id) {
                self.release(eid, id);
                Self::fail_front(&mut lane, RequesterError::Codec(e));
                continue;
            }

            front.instance_id = Some(id);
            let seq = front.seq;
            let request = front.request.clone();
            lane.live = true;
            let (timer_tx, timer_rx) = oneshot::channel();
            lane.timer = Some(timer_tx);
            drop(lane);

            // The lane guard is released before the send so a transport
            // that delivers its response inline re-enters cleanly.
            if let Err(e) = self.transport.send(eid, cadence.tag(), &request) {
                log::warn!("[requester] eid {}: send failed: {}", eid, e);
                let Some(mut lane) = self.lanes.get_mut(&(eid, cadence)) else {
                    return;
                };
                let still_front =
                    lane.live && lane.entries.front().map(|f| f.seq == seq).unwrap_or(false);
                if !still_front {
                    // an inline response already consumed the entry
                    return;
                }
                lane.live = false;
                lane.timer = None;
                Self::fail_front(&mut lane, RequesterError::Send(e));
                drop(lane);
                self.release(eid, id);
                continue;
            }

            self.spawn_expiry(eid, cadence, seq, timer_rx);
            self.spawn_retry(eid, cadence, seq, request);
            return;
        }
    }

    fn fail_front(lane: &mut Lane, err: RequesterError) {
        if let Some(mut entry) = lane.entries.pop_front() {
            if let Some(reply) = entry.reply.take() {
                let _ = reply.send(Err(err));
            }
        }
    }

    fn spawn_expiry(
        self: &Arc<Self>,
        eid: Eid,
        cadence: Cadence,
        seq: u64,
        timer_rx: oneshot::Receiver<TimerCmd>,
    ) {
        let handler = Arc::clone(self);
        let timeout = self.config.response_timeout;
        tokio::spawn(async move {
            let cmd = tokio::select! {
                _ = sleep(timeout) => TimerCmd::ForceExpire,
                res = timer_rx => match res {
                    Ok(cmd) => cmd,
                    Err(_) => return,
                },
            };
            if matches!(cmd, TimerCmd::Cancel) {
                return;
            }
            handler.expire(eid, cadence, seq);
        });
    }

    /// Raw-send retries below the expiry backstop. Exhausting them stops
    /// silently; expiry reports the failure upward.
    fn spawn_retry(self: &Arc<Self>, eid: Eid, cadence: Cadence, seq: u64, request: Vec<u8>) {
        if self.config.retry_count == 0 {
            return;
        }
        let handler = Arc::clone(self);
        let config = self.config;
        tokio::spawn(async move {
            for attempt in 1..=config.retry_count {
                sleep(config.retry_interval).await;
                let still_live = handler
                    .lanes
                    .get(&(eid, cadence))
                    .map(|lane| {
                        lane.live
                            && lane
                                .entries
                                .front()
                                .map(|e| e.seq == seq && e.valid)
                                .unwrap_or(false)
                    })
                    .unwrap_or(false);
                if !still_live {
                    return;
                }
                if let Err(e) = handler.transport.send(eid, cadence.tag(), &request) {
                    log::debug!("[requester] eid {}: retry {} failed: {}", eid, attempt, e);
                }
            }
        });
    }

    /// Expiry outcome for a live entry. Seq is compared so a timer that
    /// lost the race against a matched response is a no-op.
    fn expire(self: &Arc<Self>, eid: Eid, cadence: Cadence, seq: u64) {
        let entry = {
            let Some(mut lane) = self.lanes.get_mut(&(eid, cadence)) else {
                return;
            };
            if !lane.live {
                return;
            }
            match lane.entries.front() {
                Some(front) if front.seq == seq => {}
                _ => return,
            }
            let Some(entry) = lane.entries.pop_front() else {
                return;
            };
            lane.live = false;
            lane.timer = None;
            entry
        };

        if let Some(id) = entry.instance_id {
            self.release(eid, id);
        }
        let outcome = if entry.valid {
            self.tracker.record_timeout(eid, &entry.request);
            RequesterError::Expired
        } else {
            log::debug!("[requester] eid {}: invalidated request reclaimed", eid);
            RequesterError::Invalidated
        };
        if let Some(reply) = entry.reply {
            let _ = reply.send(Err(outcome));
        }
        self.run_next(eid, cadence);
    }

    fn release(&self, eid: Eid, id: u8) {
        if let Err(e) = self.allocator.free(eid, id) {
            log::error!("[requester] eid {}: lease release failed for id {}: {}", eid, id, e);
        }
    }
}
