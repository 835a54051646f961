// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! Shared fixtures for the device-side integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use time::macros::datetime;
use time::OffsetDateTime;
use trialsync_core::event::{EventDraft, Severity};
use trialsync_core::store::EventStore;
use trialsync_core::temporal::FixedClock;

pub const PATIENT: &str = "patient-001";
pub const OTHER_PATIENT: &str = "patient-002";
pub const DEVICE: &str = "device-aaa";

/// Device clock used by most tests: the evening of the scenario day.
pub const NOW: OffsetDateTime = datetime!(2026-01-05 18:00 UTC);

pub fn test_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(NOW))
}

pub fn test_store() -> (EventStore, Arc<FixedClock>) {
    let clock = test_clock();
    let store = EventStore::in_memory(clock.clone()).unwrap();
    (store, clock)
}

/// A recorded episode of `PATIENT` with severity 3.
pub fn episode(start: OffsetDateTime, end: OffsetDateTime) -> EventDraft {
    EventDraft::recorded(PATIENT, DEVICE, start)
        .with_end(end)
        .with_severity(Severity::new(3).unwrap())
}

/// A recorded instant of `PATIENT` without an end.
pub fn instant(at: OffsetDateTime) -> EventDraft {
    EventDraft::recorded(PATIENT, DEVICE, at).with_severity(Severity::new(2).unwrap())
}
