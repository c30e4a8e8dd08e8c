// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com
//
// Request/response engine behavior against a recording transport: FIFO
// dispatch, correlation, expiry, invalidation and the retry sub-layer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use nsm::config::RequesterConfig;
use nsm::protocol::header::encode_response;
use nsm::protocol::{CompletionCode, MessageType};
use nsm::requester::{Cadence, RequestHandler, RequesterError};
use nsm::transport::{Eid, Transport, TransportError, TAG_REGULAR};

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<(Eid, u8, Vec<u8>)>>,
    fail: AtomicBool,
}

impl RecordingTransport {
    fn frames(&self) -> Vec<(Eid, u8, Vec<u8>)> {
        self.sent.lock().clone()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, eid: Eid, tag: u8, bytes: &[u8]) -> Result<(), TransportError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push((eid, tag, bytes.to_vec()));
        Ok(())
    }
}

fn quiet_config() -> RequesterConfig {
    RequesterConfig { retry_count: 0, ..RequesterConfig::default() }
}

fn instance_id(frame: &[u8]) -> u8 {
    frame[3] & 0x1F
}

fn response_for(frame: &[u8]) -> Vec<u8> {
    encode_response(
        instance_id(frame),
        MessageType::DeviceCapabilityDiscovery,
        frame[6],
        CompletionCode::Success,
        0,
        &[],
    )
    .unwrap()
}

fn request(command: u8) -> Vec<u8> {
    nsm::protocol::header::encode_request(0, MessageType::DeviceCapabilityDiscovery, command, &[])
        .unwrap()
}

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn same_endpoint_requests_are_fifo_and_never_overlap() {
    let transport = Arc::new(RecordingTransport::default());
    let handler = RequestHandler::new(transport.clone(), quiet_config());

    let h = handler.clone();
    let first = tokio::spawn(async move { h.send_recv(7, Cadence::Regular, request(0x00)).await });
    let h = handler.clone();
    let second = tokio::spawn(async move { h.send_recv(7, Cadence::Regular, request(0x09)).await });
    settle().await;

    let frames = transport.frames();
    assert_eq!(frames.len(), 1, "second request must wait for the first");
    assert_eq!(frames[0].2[6], 0x00);
    assert!(handler.in_flight(7, Cadence::Regular));

    handler.handle_response(7, TAG_REGULAR, &response_for(&frames[0].2));
    settle().await;
    let ok = first.await.unwrap().unwrap();
    assert_eq!(ok[7], CompletionCode::Success as u8);

    let frames = transport.frames();
    assert_eq!(frames.len(), 2, "matching drains the queue");
    assert_eq!(frames[1].2[6], 0x09);
    handler.handle_response(7, TAG_REGULAR, &response_for(&frames[1].2));
    second.await.unwrap().unwrap();
    assert!(!handler.in_flight(7, Cadence::Regular));
}

#[tokio::test]
async fn stale_instance_id_does_not_disturb_live_entry() {
    let transport = Arc::new(RecordingTransport::default());
    let handler = RequestHandler::new(transport.clone(), quiet_config());

    let h = handler.clone();
    let pending = tokio::spawn(async move { h.send_recv(2, Cadence::Regular, request(0x01)).await });
    settle().await;

    let frames = transport.frames();
    let live = instance_id(&frames[0].2);
    let stale = (live + 1) & 0x1F;
    let mut bogus = response_for(&frames[0].2);
    bogus[3] = (bogus[3] & !0x1F) | stale;
    handler.handle_response(2, TAG_REGULAR, &bogus);
    settle().await;
    assert!(handler.in_flight(2, Cadence::Regular), "stale id must be discarded");

    handler.handle_response(2, TAG_REGULAR, &response_for(&frames[0].2));
    pending.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn expiry_reports_failure_and_late_response_is_a_noop() {
    let transport = Arc::new(RecordingTransport::default());
    let handler = RequestHandler::new(transport.clone(), quiet_config());

    let result = handler.send_recv(4, Cadence::Regular, request(0x01)).await;
    assert_eq!(result, Err(RequesterError::Expired));
    assert!(handler.is_degraded(4));

    // The genuine response arrives after the entry is gone.
    let frames = transport.frames();
    handler.handle_response(4, TAG_REGULAR, &response_for(&frames[0].2));
    settle().await;
    assert!(!handler.in_flight(4, Cadence::Regular));

    // The lane still works and the lease was reclaimed.
    let h = handler.clone();
    let next = tokio::spawn(async move { h.send_recv(4, Cadence::Regular, request(0x00)).await });
    settle().await;
    let frames = transport.frames();
    handler.handle_response(4, TAG_REGULAR, &response_for(&frames[1].2));
    next.await.unwrap().unwrap();
    assert!(!handler.is_degraded(4));
}

#[tokio::test]
async fn invalidate_forces_the_live_entry_out() {
    let transport = Arc::new(RecordingTransport::default());
    let handler = RequestHandler::new(transport.clone(), quiet_config());

    let h = handler.clone();
    let pending = tokio::spawn(async move { h.send_recv(9, Cadence::Regular, request(0x02)).await });
    settle().await;
    assert!(handler.in_flight(9, Cadence::Regular));

    handler.invalidate(9, Cadence::Regular);
    let result = pending.await.unwrap();
    assert_eq!(result, Err(RequesterError::Invalidated));
    assert!(!handler.in_flight(9, Cadence::Regular));
}

#[tokio::test]
async fn first_send_failure_fails_only_that_entry() {
    let transport = Arc::new(RecordingTransport::default());
    transport.fail.store(true, Ordering::Relaxed);
    let handler = RequestHandler::new(transport.clone(), quiet_config());

    let result = handler.send_recv(5, Cadence::Regular, request(0x01)).await;
    assert_eq!(result, Err(RequesterError::Send(TransportError::Closed)));

    // Transport recovers; the lane is not wedged and leases were freed.
    transport.fail.store(false, Ordering::Relaxed);
    let h = handler.clone();
    let next = tokio::spawn(async move { h.send_recv(5, Cadence::Regular, request(0x00)).await });
    settle().await;
    let frames = transport.frames();
    assert_eq!(frames.len(), 1);
    handler.handle_response(5, TAG_REGULAR, &response_for(&frames[0].2));
    next.await.unwrap().unwrap();
}

/// Answers every frame synchronously from inside `send`, the way a
/// loopback transport would.
#[derive(Default)]
struct LoopbackTransport {
    handler: Mutex<Option<Arc<RequestHandler>>>,
}

impl Transport for LoopbackTransport {
    fn send(&self, eid: Eid, tag: u8, bytes: &[u8]) -> Result<(), TransportError> {
        let handler = self.handler.lock().clone().expect("handler wired up");
        handler.handle_response(eid, tag, &response_for(bytes));
        Ok(())
    }
}

#[tokio::test]
async fn inline_response_from_within_send_is_matched() {
    let transport = Arc::new(LoopbackTransport::default());
    let handler = RequestHandler::new(transport.clone(), quiet_config());
    *transport.handler.lock() = Some(handler.clone());

    let ok = handler.send_recv(6, Cadence::Regular, request(0x00)).await.unwrap();
    assert_eq!(ok[7], CompletionCode::Success as u8);
    assert!(!handler.in_flight(6, Cadence::Regular));

    // Back-to-back requests keep draining through the inline path.
    let ok = handler.send_recv(6, Cadence::Regular, request(0x09)).await.unwrap();
    assert_eq!(ok[6], 0x09);
}

#[tokio::test]
async fn endpoints_are_independent_in_flight() {
    let transport = Arc::new(RecordingTransport::default());
    let handler = RequestHandler::new(transport.clone(), quiet_config());

    let h = handler.clone();
    let a = tokio::spawn(async move { h.send_recv(1, Cadence::Regular, request(0x01)).await });
    let h = handler.clone();
    let b = tokio::spawn(async move { h.send_recv(2, Cadence::Regular, request(0x01)).await });
    settle().await;

    let frames = transport.frames();
    assert_eq!(frames.len(), 2, "different endpoints fly concurrently");
    for frame in &frames {
        handler.handle_response(frame.0, TAG_REGULAR, &response_for(&frame.2));
    }
    a.await.unwrap().unwrap();
    b.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn retry_sublayer_resends_until_expiry_backstop() {
    let transport = Arc::new(RecordingTransport::default());
    let config = RequesterConfig {
        retry_count: 2,
        retry_interval: Duration::from_millis(10),
        response_timeout: Duration::from_millis(100),
        ..RequesterConfig::default()
    };
    let handler = RequestHandler::new(transport.clone(), config);

    let result = handler.send_recv(3, Cadence::Regular, request(0x01)).await;
    assert_eq!(result, Err(RequesterError::Expired));

    let frames = transport.frames();
    assert_eq!(frames.len(), 3, "initial send plus two retries");
    assert_eq!(frames[0].2, frames[1].2);
    assert_eq!(frames[1].2, frames[2].2);
}
