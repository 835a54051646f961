// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for the sync gate state machine.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use time::macros::datetime;
use trialsync_core::gate::{GateError, GateState, SyncGate};
use trialsync_core::network::EnrollmentStatus;
use trialsync_core::storage::{SharedStorage, Storage};

fn test_gate() -> (SyncGate, SharedStorage) {
    let storage = Storage::in_memory().unwrap().shared();
    let gate = SyncGate::load(PATIENT, Arc::clone(&storage), test_clock()).unwrap();
    (gate, storage)
}

// === Transitions ===

#[test]
fn test_gate_starts_local_only() {
    let (gate, _) = test_gate();
    assert_eq!(gate.state(), GateState::LocalOnly);
    assert!(gate.transmission_permit().is_none());
}

#[test]
fn test_forward_transitions() {
    let (gate, _) = test_gate();

    assert_eq!(
        gate.submit_gating_questionnaire().unwrap(),
        GateState::PendingApproval
    );
    assert!(gate.transmission_permit().is_none());

    let approved_at = datetime!(2026-01-05 15:00 UTC);
    assert_eq!(gate.approve(approved_at).unwrap(), GateState::Approved);
    assert_eq!(gate.approved_at(), Some(approved_at));

    let permit = gate.transmission_permit().unwrap();
    assert_eq!(permit.patient_id(), PATIENT);
}

#[test]
fn test_approval_requires_questionnaire() {
    let (gate, _) = test_gate();

    let err = gate.approve(datetime!(2026-01-05 15:00 UTC)).unwrap_err();
    assert!(matches!(
        err,
        GateError::IllegalTransition {
            from: GateState::LocalOnly,
            to: GateState::Approved
        }
    ));
    assert_eq!(gate.state(), GateState::LocalOnly);
}

#[test]
fn test_no_regression_after_approval() {
    let (gate, _) = test_gate();
    gate.submit_gating_questionnaire().unwrap();
    gate.approve(datetime!(2026-01-05 15:00 UTC)).unwrap();

    assert!(matches!(
        gate.submit_gating_questionnaire(),
        Err(GateError::IllegalTransition { .. })
    ));
    assert_eq!(gate.state(), GateState::Approved);
}

#[test]
fn test_repeated_approval_keeps_first_timestamp() {
    let (gate, _) = test_gate();
    gate.submit_gating_questionnaire().unwrap();
    gate.approve(datetime!(2026-01-05 15:00 UTC)).unwrap();

    assert_eq!(
        gate.approve(datetime!(2026-01-06 09:00 UTC)).unwrap(),
        GateState::Approved
    );
    assert_eq!(gate.approved_at(), Some(datetime!(2026-01-05 15:00 UTC)));
}

// === Persistence ===

#[test]
fn test_gate_state_survives_reload() {
    let (gate, storage) = test_gate();
    gate.submit_gating_questionnaire().unwrap();
    gate.approve(datetime!(2026-01-05 15:00 UTC)).unwrap();
    drop(gate);

    let reloaded = SyncGate::load(PATIENT, storage, test_clock()).unwrap();
    assert_eq!(reloaded.state(), GateState::Approved);
    assert_eq!(reloaded.approved_at(), Some(datetime!(2026-01-05 15:00 UTC)));
}

#[test]
fn test_gates_are_per_patient() {
    let (gate, storage) = test_gate();
    gate.submit_gating_questionnaire().unwrap();

    let other = SyncGate::load(OTHER_PATIENT, storage, test_clock()).unwrap();
    assert_eq!(other.state(), GateState::LocalOnly);
}

// === Enrollment Status ===

#[test]
fn test_enrollment_status_applies_only_when_pending() {
    let (gate, _) = test_gate();
    let status = EnrollmentStatus {
        patient_id: PATIENT.into(),
        study_start_approved_at: Some(datetime!(2026-01-05 15:00 UTC)),
    };

    assert_eq!(
        gate.apply_enrollment_status(&status).unwrap(),
        GateState::LocalOnly
    );

    gate.submit_gating_questionnaire().unwrap();
    assert_eq!(
        gate.apply_enrollment_status(&status).unwrap(),
        GateState::Approved
    );
}

#[test]
fn test_unapproved_enrollment_status_is_noop() {
    let (gate, _) = test_gate();
    gate.submit_gating_questionnaire().unwrap();

    let status = EnrollmentStatus {
        patient_id: PATIENT.into(),
        study_start_approved_at: None,
    };
    assert_eq!(
        gate.apply_enrollment_status(&status).unwrap(),
        GateState::PendingApproval
    );
}

// === Notification ===

#[tokio::test]
async fn test_subscribers_see_transitions() {
    let (gate, _) = test_gate();
    let mut rx = gate.subscribe();

    gate.submit_gating_questionnaire().unwrap();
    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), GateState::PendingApproval);
}

#[tokio::test]
async fn test_wait_until_approved_wakes_on_approval() {
    let (gate, _) = test_gate();
    let gate = Arc::new(gate);
    gate.submit_gating_questionnaire().unwrap();

    let waiter = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move { gate.wait_until_approved().await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    gate.approve(datetime!(2026-01-05 15:00 UTC)).unwrap();
    let permit = tokio::time::timeout(Duration::from_secs(5), waiter)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(permit.patient_id(), PATIENT);
}
