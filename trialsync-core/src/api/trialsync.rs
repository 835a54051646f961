// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! TrialSync Orchestrator
//!
//! Device-side entry point for one enrolled patient: capture, correction,
//! queries, the sync gate and construction of the sync engine.

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use time::OffsetDateTime;

use super::config::SyncConfig;
use super::error::{TrialSyncError, TrialSyncResult};
use super::events::{NoticeDispatcher, NoticeHandler, SyncNotice};
use crate::event::{Event, EventDraft, EventId, EventType, ValidationError};
use crate::gate::{GateState, SyncGate};
use crate::network::{EnrollmentStatus, SyncTransport};
use crate::storage::{SharedStorage, Storage};
use crate::store::{EventQuery, EventStore};
use crate::sync::SyncEngine;
use crate::temporal::{Clock, SystemClock};

/// Capture and sync for one patient on one device.
pub struct TrialSync {
    patient_id: String,
    device_id: String,
    store: EventStore,
    gate: Arc<SyncGate>,
    notices: Arc<NoticeDispatcher>,
    config: SyncConfig,
}

impl TrialSync {
    /// Opens the on-disk store at `path` with the system clock.
    pub fn open<P: AsRef<Path>>(
        path: P,
        patient_id: impl Into<String>,
        device_id: impl Into<String>,
        config: SyncConfig,
    ) -> TrialSyncResult<Self> {
        Self::with_storage(
            Storage::open(path)?.shared(),
            patient_id,
            device_id,
            Arc::new(SystemClock),
            config,
        )
    }

    /// Creates an in-memory instance (for testing).
    pub fn in_memory(
        patient_id: impl Into<String>,
        device_id: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> TrialSyncResult<Self> {
        Self::with_storage(
            Storage::in_memory()?.shared(),
            patient_id,
            device_id,
            clock,
            SyncConfig::default(),
        )
    }

    pub fn with_storage(
        storage: SharedStorage,
        patient_id: impl Into<String>,
        device_id: impl Into<String>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> TrialSyncResult<Self> {
        let patient_id = patient_id.into();
        let device_id = device_id.into();
        if patient_id.trim().is_empty() {
            return Err(ValidationError::MissingField("patient id").into());
        }
        if device_id.trim().is_empty() {
            return Err(ValidationError::MissingField("device id").into());
        }

        let store = EventStore::new(Arc::clone(&storage), Arc::clone(&clock))?;
        let gate = Arc::new(SyncGate::load(&patient_id, storage, clock)?);

        Ok(TrialSync {
            patient_id,
            device_id,
            store,
            gate,
            notices: Arc::new(NoticeDispatcher::new()),
            config,
        })
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    pub fn gate(&self) -> Arc<SyncGate> {
        Arc::clone(&self.gate)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // === Capture ===

    /// A medical-event draft for this patient and device.
    pub fn draft(&self, start: OffsetDateTime) -> EventDraft {
        EventDraft::recorded(&self.patient_id, &self.device_id, start)
    }

    /// A day-level marker draft (`NoEventsThatDay`, `UnknownStatus`).
    pub fn marker(&self, event_type: EventType, at: OffsetDateTime) -> EventDraft {
        EventDraft::marker(event_type, &self.patient_id, &self.device_id, at)
    }

    /// Admits a new event.
    pub fn record(&self, draft: EventDraft) -> TrialSyncResult<Event> {
        self.check_owner(&draft)?;
        Ok(self.store.append(draft)?)
    }

    /// Admits a correction of `old_id`.
    pub fn correct(&self, old_id: &EventId, draft: EventDraft) -> TrialSyncResult<Event> {
        self.check_owner(&draft)?;
        Ok(self.store.supersede(old_id, draft)?)
    }

    /// Retracts `old_id` without a replacement.
    pub fn retract(&self, old_id: &EventId, at: OffsetDateTime) -> TrialSyncResult<Event> {
        self.correct(old_id, self.marker(EventType::SupersededBy, at))
    }

    /// This patient's live events starting in `range`.
    pub fn events(&self, range: Range<OffsetDateTime>) -> TrialSyncResult<EventQuery> {
        Ok(self.store.query(range)?.for_patient(&self.patient_id))
    }

    fn check_owner(&self, draft: &EventDraft) -> TrialSyncResult<()> {
        if draft.patient_id != self.patient_id || draft.device_id != self.device_id {
            return Err(TrialSyncError::Configuration(
                "draft belongs to another patient or device".into(),
            ));
        }
        Ok(())
    }

    // === Sync Gate ===

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    /// Records the gating questionnaire submission.
    pub fn submit_gating_questionnaire(&self) -> TrialSyncResult<GateState> {
        let before = self.gate.state();
        let state = self.gate.submit_gating_questionnaire()?;
        self.notify_gate(before, state);
        Ok(state)
    }

    /// Applies the study start approval.
    pub fn approve_study_start(&self, approved_at: OffsetDateTime) -> TrialSyncResult<GateState> {
        let before = self.gate.state();
        let state = self.gate.approve(approved_at)?;
        self.notify_gate(before, state);
        Ok(state)
    }

    /// Applies the enrollment status fetched from the relay.
    pub fn apply_enrollment_status(&self, status: &EnrollmentStatus) -> TrialSyncResult<GateState> {
        if status.patient_id != self.patient_id {
            return Err(TrialSyncError::Configuration(
                "enrollment status is for another patient".into(),
            ));
        }
        let before = self.gate.state();
        let state = self.gate.apply_enrollment_status(status)?;
        self.notify_gate(before, state);
        Ok(state)
    }

    fn notify_gate(&self, before: GateState, after: GateState) {
        if before != after {
            self.notices.dispatch(SyncNotice::GateChanged { state: after });
        }
    }

    // === Sync ===

    /// Adds a handler for sync notices.
    pub fn add_notice_handler(&self, handler: Arc<dyn NoticeHandler>) {
        self.notices.add_handler(handler);
    }

    /// Builds the sync engine over `transport`.
    pub fn sync_engine<T: SyncTransport>(&self, transport: T) -> SyncEngine<T> {
        SyncEngine::new(
            self.store.clone(),
            Arc::clone(&self.gate),
            transport,
            self.config.clone(),
            Arc::clone(&self.notices),
        )
    }

    /// Builds the sync engine over HTTPS to the configured endpoint.
    #[cfg(feature = "network")]
    pub fn http_sync_engine(
        &self,
        token: impl Into<String>,
    ) -> TrialSyncResult<SyncEngine<crate::network::HttpTransport>> {
        let transport = crate::network::HttpTransport::new(
            &self.config.endpoint_url,
            token,
            &self.device_id,
            self.config.request_timeout(),
        )?;
        Ok(self.sync_engine(transport))
    }
}
