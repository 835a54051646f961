// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event Store
//!
//! Append-only log of captured events. Admission runs the temporal checks,
//! then the overlap check and the insert inside one write transaction while
//! holding the storage lock, so two concurrent writers can never both
//! observe "no overlap" and both be admitted.

mod query;

pub use query::{EventIter, EventQuery};

use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::event::{Event, EventDraft, EventId, EventType, SyncRecord, ValidationError};
use crate::storage::{NewEvent, SharedStorage, Storage, StorageError};
use crate::temporal::{self, Clock, Interval, TemporalError};

/// Reasons an event is not admitted.
#[derive(Error, Debug)]
pub enum AppendError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Temporal(#[from] TemporalError),

    #[error("overlaps {conflict_count} existing event(s)")]
    Overlap {
        conflict_count: usize,
        conflicting_ids: Vec<EventId>,
    },

    #[error("event not found: {0}")]
    UnknownEvent(EventId),

    #[error("event {target} is already superseded by {successor}")]
    AlreadySuperseded { target: EventId, successor: EventId },

    #[error("event {0} belongs to a different patient")]
    PatientMismatch(EventId),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// The device's event log.
#[derive(Clone)]
pub struct EventStore {
    storage: SharedStorage,
    clock: Arc<dyn Clock>,
    appended: Arc<watch::Sender<u64>>,
}

impl EventStore {
    /// Creates a store over shared storage.
    pub fn new(storage: SharedStorage, clock: Arc<dyn Clock>) -> Result<Self, StorageError> {
        let latest = storage.lock().latest_sequence()?;
        let (appended, _) = watch::channel(latest);
        Ok(EventStore {
            storage,
            clock,
            appended: Arc::new(appended),
        })
    }

    /// Opens or creates an on-disk store.
    pub fn open<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> Result<Self, StorageError> {
        Self::new(Storage::open(path)?.shared(), clock)
    }

    /// Creates an in-memory store (for testing).
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self, StorageError> {
        Self::new(Storage::in_memory()?.shared(), clock)
    }

    /// The storage this store writes to.
    pub fn storage(&self) -> SharedStorage {
        Arc::clone(&self.storage)
    }

    /// The capture clock used for future-dating checks.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Admits a new event with status `pending`.
    pub fn append(&self, draft: EventDraft) -> Result<Event, AppendError> {
        if draft.event_type == EventType::SupersededBy {
            return Err(ValidationError::RetractionWithoutTarget.into());
        }
        self.admit(draft, None)
    }

    /// Admits a correction of `old_id`. The old event is left untouched and
    /// no longer counts for overlap checks or queries.
    ///
    /// The correction is checked for overlap against every other live event
    /// but not against the event it replaces.
    pub fn supersede(&self, old_id: &EventId, draft: EventDraft) -> Result<Event, AppendError> {
        self.admit(draft, Some(*old_id))
    }

    fn admit(&self, draft: EventDraft, supersedes: Option<EventId>) -> Result<Event, AppendError> {
        draft.validate()?;
        let interval = draft.interval()?;
        let now = self.clock.now();
        let recorded_at = now.replace_nanosecond(0).unwrap_or(now);
        temporal::reject_future_dated(&interval, draft.utc_offset, now)?;
        let duration_minutes = temporal::duration_minutes(interval.start(), interval.end())?;

        let new = NewEvent {
            id: EventId::generate(),
            local_date: temporal::local_date(interval.start(), draft.utc_offset),
            patient_id: draft.patient_id,
            device_id: draft.device_id,
            event_type: draft.event_type,
            start: interval.start(),
            end: interval.end(),
            severity: draft.severity,
            utc_offset: draft.utc_offset,
            notes: draft.notes,
            supersedes,
            recorded_at,
            duration_minutes,
        };

        let storage = self.storage.lock();
        let event = storage.write_transaction(|storage| {
            if let Some(target) = supersedes {
                check_supersede_target(storage, &target, &new.patient_id)?;
            }

            if new.event_type.occupies_time() {
                let conflicting_ids =
                    find_conflicts(storage, &new.patient_id, &interval, supersedes)?;
                if !conflicting_ids.is_empty() {
                    return Err(AppendError::Overlap {
                        conflict_count: conflicting_ids.len(),
                        conflicting_ids,
                    });
                }
            }

            let sequence = storage.insert_event(&new)?;
            Ok(Event {
                id: new.id,
                sequence,
                patient_id: new.patient_id.clone(),
                device_id: new.device_id.clone(),
                event_type: new.event_type,
                start: new.start,
                end: new.end,
                severity: new.severity,
                utc_offset: new.utc_offset,
                notes: new.notes.clone(),
                supersedes: new.supersedes,
                recorded_at: new.recorded_at,
                duration_minutes: new.duration_minutes,
                sync: SyncRecord::pending(),
            })
        });
        drop(storage);

        match &event {
            Ok(event) => {
                tracing::debug!(
                    event_id = %event.id,
                    sequence = event.sequence,
                    event_type = %event.event_type,
                    "event admitted"
                );
                self.appended.send_replace(event.sequence);
            }
            Err(AppendError::Overlap { conflict_count, .. }) => {
                tracing::debug!(conflict_count, "event rejected: overlap");
            }
            Err(_) => {}
        }

        event
    }

    /// Live events whose start lies in `range`, in capture-time order.
    ///
    /// The returned query is lazy and restartable: every iteration reads the
    /// log page by page as of the sequence number committed when the query
    /// was created.
    pub fn query(&self, range: Range<OffsetDateTime>) -> Result<EventQuery, StorageError> {
        let snapshot = self.storage.lock().latest_sequence()?;
        Ok(EventQuery::new(self.storage(), range, snapshot))
    }

    /// Gets an event by id.
    pub fn get(&self, id: &EventId) -> Result<Option<Event>, StorageError> {
        self.storage.lock().get_event(id)
    }

    /// Current sync bookkeeping of an event.
    pub fn sync_record(&self, id: &EventId) -> Result<Option<SyncRecord>, StorageError> {
        self.storage.lock().sync_record(id)
    }

    /// Number of a patient's events not yet synced or rejected.
    pub fn pending_count(&self, patient_id: &str) -> Result<usize, StorageError> {
        self.storage.lock().pending_count(patient_id)
    }

    /// Highest committed sequence number.
    pub fn latest_sequence(&self) -> Result<u64, StorageError> {
        self.storage.lock().latest_sequence()
    }

    /// Marks an event acknowledged by the central endpoint.
    pub fn mark_synced(&self, id: &EventId) -> Result<bool, StorageError> {
        let at = self.clock.now();
        self.storage.lock().mark_synced(id, at)
    }

    /// Marks an event refused; it is never retried automatically.
    pub fn mark_rejected(&self, id: &EventId, error: &str) -> Result<bool, StorageError> {
        let at = self.clock.now();
        self.storage.lock().mark_rejected(id, error, at)
    }

    /// Ids of a patient's events whose retries are exhausted.
    pub fn stalled_events(&self, patient_id: &str) -> Result<Vec<EventId>, StorageError> {
        self.storage.lock().stalled_events(patient_id)
    }

    /// Returns a patient's stalled events to the automatic queue.
    pub fn requeue_stalled(&self, patient_id: &str) -> Result<usize, StorageError> {
        self.storage.lock().requeue_stalled(patient_id)
    }

    pub(crate) fn due_for_sync(
        &self,
        patient_id: &str,
        limit: usize,
    ) -> Result<Vec<Event>, StorageError> {
        let now = self.clock.now();
        self.storage.lock().due_for_sync(patient_id, now, limit)
    }

    pub(crate) fn record_transient_failure(
        &self,
        id: &EventId,
        error: &str,
        next_attempt_at: Option<OffsetDateTime>,
    ) -> Result<bool, StorageError> {
        let at = self.clock.now();
        self.storage.lock().record_transient_failure(
            id,
            error,
            at,
            next_attempt_at,
            next_attempt_at.is_none(),
        )
    }

    pub(crate) fn next_attempt_due(
        &self,
        patient_id: &str,
    ) -> Result<Option<OffsetDateTime>, StorageError> {
        self.storage.lock().next_attempt_due(patient_id)
    }

    /// Subscribes to the latest admitted sequence number.
    pub fn subscribe_appends(&self) -> watch::Receiver<u64> {
        self.appended.subscribe()
    }
}

fn check_supersede_target(
    storage: &Storage,
    target: &EventId,
    patient_id: &str,
) -> Result<(), AppendError> {
    let old = storage
        .get_event(target)?
        .ok_or(AppendError::UnknownEvent(*target))?;
    if old.patient_id != patient_id {
        return Err(AppendError::PatientMismatch(*target));
    }
    if let Some(successor) = storage.superseded_by(target)? {
        return Err(AppendError::AlreadySuperseded {
            target: *target,
            successor,
        });
    }
    Ok(())
}

/// Ids of live events of the same patient that overlap `interval`.
///
/// Candidates are selected on UTC instants, so spans of any length and
/// events captured in any offset are seen; [`temporal::overlaps`] decides.
fn find_conflicts(
    storage: &Storage,
    patient_id: &str,
    interval: &Interval,
    replacing: Option<EventId>,
) -> Result<Vec<EventId>, StorageError> {
    // Stored instants are whole seconds; widen by one on each side.
    let from = interval.start().unix_timestamp() - 1;
    let to = interval.end().unwrap_or(interval.start()).unix_timestamp() + 1;

    let conflicts = storage
        .overlap_candidates(patient_id, from, to)?
        .into_iter()
        .filter(|existing| Some(existing.id) != replacing)
        .filter(|existing| temporal::overlaps(&existing.interval(), interval))
        .map(|existing| existing.id)
        .collect();

    Ok(conflicts)
}
