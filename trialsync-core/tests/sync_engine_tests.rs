// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the sync engine against the mock transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use parking_lot::Mutex;
use time::macros::datetime;
use trialsync_core::api::{CallbackHandler, SyncConfig, SyncNotice, TrialSync};
use trialsync_core::event::{EventId, SyncStatus};
use trialsync_core::gate::GateState;
use trialsync_core::network::{
    EventAckStatus, EventResult, MockReply, MockTransport, RejectionCode, SyncBatchResponse,
    TransportError,
};
use trialsync_core::storage::Storage;
use trialsync_core::sync::{RetryPolicy, SyncEngine, SyncReport};
use trialsync_core::temporal::FixedClock;

struct Harness {
    trialsync: TrialSync,
    clock: Arc<FixedClock>,
    transport: MockTransport,
    engine: SyncEngine<MockTransport>,
    notices: Arc<Mutex<Vec<SyncNotice>>>,
}

fn harness_with(config: SyncConfig) -> Harness {
    let clock = test_clock();
    let trialsync = TrialSync::with_storage(
        Storage::in_memory().unwrap().shared(),
        PATIENT,
        DEVICE,
        clock.clone(),
        config,
    )
    .unwrap();

    let notices = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&notices);
    trialsync.add_notice_handler(Arc::new(CallbackHandler::new(move |notice| {
        sink.lock().push(notice);
    })));

    let transport = MockTransport::new();
    let engine = trialsync.sync_engine(transport.clone());
    Harness {
        trialsync,
        clock,
        transport,
        engine,
        notices,
    }
}

fn harness() -> Harness {
    harness_with(SyncConfig::default())
}

fn approve(h: &Harness) {
    h.trialsync.submit_gating_questionnaire().unwrap();
    h.trialsync
        .approve_study_start(datetime!(2026-01-05 17:00 UTC))
        .unwrap();
}

fn record_points(h: &Harness, count: i64) -> Vec<EventId> {
    (0..count)
        .map(|i| {
            h.trialsync
                .record(instant(
                    datetime!(2026-01-05 00:00 -5) + time::Duration::minutes(i),
                ))
                .unwrap()
                .id
        })
        .collect()
}

fn status_of(h: &Harness, id: &EventId) -> SyncStatus {
    h.trialsync.store().sync_record(id).unwrap().unwrap().status
}

// === Gate Enforcement ===

#[tokio::test]
async fn test_end_to_end_scenario() {
    let h = harness();

    let event = h
        .trialsync
        .record(episode(
            datetime!(2026-01-05 08:00 -5),
            datetime!(2026-01-05 08:15 -5),
        ))
        .unwrap();
    assert_eq!(event.duration_minutes, Some(15));
    assert_eq!(event.sync.status, SyncStatus::Pending);

    h.trialsync.submit_gating_questionnaire().unwrap();
    assert_eq!(h.trialsync.gate_state(), GateState::PendingApproval);
    assert_eq!(h.engine.sync_once().await.unwrap(), SyncReport::default());
    assert_eq!(h.transport.submission_count(), 0);

    h.trialsync
        .approve_study_start(datetime!(2026-01-05 17:00 UTC))
        .unwrap();
    assert_eq!(h.trialsync.gate_state(), GateState::Approved);

    let report = h.engine.sync_once().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(report.acknowledged, 1);
    assert_eq!(status_of(&h, &event.id), SyncStatus::Synced);

    let submitted = h.transport.submissions();
    assert_eq!(submitted.len(), 1);
    let wire = &submitted[0].events[0];
    assert_eq!(wire.event_id, event.id);
    assert_eq!(wire.duration_minutes, Some(15));
    assert_eq!(wire.utc_offset_seconds, -5 * 3600);
}

#[tokio::test]
async fn test_no_transmission_before_approval() {
    let h = harness();
    record_points(&h, 120);

    for _ in 0..3 {
        h.engine.sync_once().await.unwrap();
    }
    h.trialsync.submit_gating_questionnaire().unwrap();
    for _ in 0..3 {
        h.engine.sync_once().await.unwrap();
    }

    assert_eq!(h.transport.submission_count(), 0);
    assert_eq!(h.engine.status().unwrap().pending, 120);
}

#[tokio::test]
async fn test_run_waits_for_gate_then_flushes() {
    let h = harness();
    let first = record_points(&h, 3);
    let engine = Arc::new(h.engine);
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();

    let task = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            engine
                .run(async {
                    let _ = stopped.await;
                })
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.transport.submission_count(), 0);

    h.trialsync.submit_gating_questionnaire().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.transport.submission_count(), 0);

    h.trialsync
        .approve_study_start(datetime!(2026-01-05 17:00 UTC))
        .unwrap();
    wait_for(|| h.transport.transmitted_event_count() == 3).await;
    for id in &first {
        assert_eq!(h.trialsync.store().sync_record(id).unwrap().unwrap().status, SyncStatus::Synced);
    }

    let later = h
        .trialsync
        .record(instant(datetime!(2026-01-05 12:00 -5)))
        .unwrap();
    wait_for(|| h.transport.transmitted_event_count() == 4).await;
    wait_for(|| {
        h.trialsync.store().sync_record(&later.id).unwrap().unwrap().status == SyncStatus::Synced
    })
    .await;

    stop.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

// === Batching ===

#[tokio::test]
async fn test_queue_is_flushed_in_batches() {
    let h = harness_with(SyncConfig::default().with_batch_size(10));
    let ids = record_points(&h, 25);
    approve(&h);

    let report = h.engine.sync_once().await.unwrap();
    assert_eq!(report.acknowledged, 25);

    let sizes: Vec<_> = h
        .transport
        .submissions()
        .iter()
        .map(|batch| batch.events.len())
        .collect();
    assert_eq!(sizes, vec![10, 10, 5]);
    assert!(ids.iter().all(|id| status_of(&h, id) == SyncStatus::Synced));
    assert_eq!(h.engine.status().unwrap().pending, 0);
}

// === Rejections ===

#[tokio::test]
async fn test_device_mismatch_rejects_without_retry() {
    let h = harness();
    let ids = record_points(&h, 2);
    approve(&h);
    h.transport.push_reply(MockReply::Fail(TransportError::Rejected(
        RejectionCode::DeviceMismatch,
    )));

    let report = h.engine.sync_once().await.unwrap();
    assert_eq!(report.rejected, 2);

    for id in &ids {
        let record = h.trialsync.store().sync_record(id).unwrap().unwrap();
        assert_eq!(record.status, SyncStatus::Rejected);
        assert_eq!(record.last_error.as_deref(), Some("DEVICE_MISMATCH"));
    }

    h.clock.advance(time::Duration::hours(24));
    assert_eq!(h.engine.sync_once().await.unwrap().sent, 0);
    assert_eq!(h.transport.submission_count(), 1);

    let rejected: Vec<_> = h
        .notices
        .lock()
        .iter()
        .filter_map(|notice| match notice {
            SyncNotice::EventRejected { code, .. } => Some(*code),
            _ => None,
        })
        .collect();
    assert_eq!(rejected, vec![RejectionCode::DeviceMismatch; 2]);
}

#[tokio::test]
async fn test_token_revoked_is_distinct_from_device_mismatch() {
    let h = harness();
    let ids = record_points(&h, 1);
    approve(&h);
    h.transport.push_reply(MockReply::Fail(TransportError::Rejected(
        RejectionCode::TokenRevoked,
    )));

    h.engine.sync_once().await.unwrap();

    let record = h.trialsync.store().sync_record(&ids[0]).unwrap().unwrap();
    assert_eq!(record.status, SyncStatus::Rejected);
    assert_eq!(record.last_error.as_deref(), Some("TOKEN_REVOKED"));
    assert!(h.notices.lock().contains(&SyncNotice::EventRejected {
        event_id: ids[0],
        code: RejectionCode::TokenRevoked,
    }));
}

// === Transient Failures ===

#[tokio::test]
async fn test_transient_failure_is_retried_after_backoff() {
    let h = harness();
    let ids = record_points(&h, 1);
    approve(&h);
    h.transport.push_reply(MockReply::Fail(TransportError::Transient(
        "connection reset".into(),
    )));

    let report = h.engine.sync_once().await.unwrap();
    assert_eq!(report.transient_failures, 1);

    let record = h.trialsync.store().sync_record(&ids[0]).unwrap().unwrap();
    assert_eq!(record.status, SyncStatus::Pending);
    assert_eq!(record.attempts, 1);
    assert_eq!(record.next_attempt_at, Some(NOW + Duration::from_secs(2)));
    assert!(record
        .last_error
        .as_deref()
        .unwrap()
        .contains("connection reset"));

    assert_eq!(h.engine.sync_once().await.unwrap().sent, 0);

    h.clock.advance(time::Duration::seconds(2));
    let report = h.engine.sync_once().await.unwrap();
    assert_eq!(report.acknowledged, 1);
    assert_eq!(status_of(&h, &ids[0]), SyncStatus::Synced);

    // The re-send carries the same id, so the relay can deduplicate it.
    let sent: Vec<_> = h
        .transport
        .submissions()
        .iter()
        .map(|batch| batch.events[0].event_id)
        .collect();
    assert_eq!(sent, vec![ids[0], ids[0]]);
}

#[tokio::test]
async fn test_exhausted_retries_stall_and_surface() {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_backoff: Duration::from_secs(2),
        max_backoff: Duration::from_secs(300),
    };
    let h = harness_with(SyncConfig::default().with_retry(policy));
    let ids = record_points(&h, 1);
    approve(&h);

    for _ in 0..3 {
        h.transport.push_reply(MockReply::Fail(TransportError::Transient(
            "relay returned 503".into(),
        )));
    }

    let mut stalled = 0;
    for _ in 0..3 {
        stalled += h.engine.sync_once().await.unwrap().stalled;
        h.clock.advance(time::Duration::minutes(10));
    }
    assert_eq!(stalled, 1);
    assert_eq!(h.transport.submission_count(), 3);

    let status = h.engine.status().unwrap();
    assert_eq!(status.stalled, ids);
    assert_eq!(status.pending, 1);
    assert!(h.notices.lock().iter().any(|notice| matches!(
        notice,
        SyncNotice::RetriesExhausted { event_id, .. } if *event_id == ids[0]
    )));

    h.clock.advance(time::Duration::hours(6));
    assert_eq!(h.engine.sync_once().await.unwrap().sent, 0);

    assert_eq!(h.engine.requeue_stalled().unwrap(), 1);
    let report = h.engine.sync_once().await.unwrap();
    assert_eq!(report.acknowledged, 1);
    assert!(h.engine.status().unwrap().stalled.is_empty());
}

#[tokio::test]
async fn test_unacknowledged_events_stay_pending() {
    let h = harness();
    let ids = record_points(&h, 2);
    approve(&h);
    h.transport
        .push_reply(MockReply::Respond(SyncBatchResponse {
            results: vec![EventResult {
                event_id: ids[0],
                status: EventAckStatus::Acknowledged,
            }],
        }));

    let report = h.engine.sync_once().await.unwrap();
    assert_eq!(report.acknowledged, 1);
    assert_eq!(report.transient_failures, 1);
    assert_eq!(status_of(&h, &ids[0]), SyncStatus::Synced);
    assert_eq!(status_of(&h, &ids[1]), SyncStatus::Pending);
}

// === Notices ===

#[tokio::test]
async fn test_gate_changes_are_announced() {
    let h = harness();
    approve(&h);

    let gates: Vec<_> = h
        .notices
        .lock()
        .iter()
        .filter_map(|notice| match notice {
            SyncNotice::GateChanged { state } => Some(*state),
            _ => None,
        })
        .collect();
    assert_eq!(gates, vec![GateState::PendingApproval, GateState::Approved]);
}
