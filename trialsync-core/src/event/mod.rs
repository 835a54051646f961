// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Clinical Event Model
//!
//! Immutable facts captured on the patient's device. A correction never
//! edits an event: it appends a new one holding a back-reference
//! (`supersedes`) to the earlier event's id. References only point at
//! lower sequence numbers, so the supersede graph cannot contain cycles.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::{Date, OffsetDateTime, UtcOffset};
use uuid::Uuid;

use crate::temporal::{self, Interval, TemporalError};

/// Maximum length of free-text notes, in characters.
pub const MAX_NOTES_LEN: usize = 2_000;

/// Opaque unique event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(Uuid);

impl EventId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        EventId(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(EventId)
    }
}

/// Kind of captured fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A medical event (e.g. a bleeding episode) with a time span.
    EventRecorded,
    /// The patient confirms nothing happened on that day.
    NoEventsThatDay,
    /// The patient cannot say whether anything happened.
    UnknownStatus,
    /// Retraction marker; only created by correcting an existing event.
    SupersededBy,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::EventRecorded => "event_recorded",
            EventType::NoEventsThatDay => "no_events_that_day",
            EventType::UnknownStatus => "unknown_status",
            EventType::SupersededBy => "superseded_by",
        }
    }

    /// Parses an event type from its string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "event_recorded" => Some(EventType::EventRecorded),
            "no_events_that_day" => Some(EventType::NoEventsThatDay),
            "unknown_status" => Some(EventType::UnknownStatus),
            "superseded_by" => Some(EventType::SupersededBy),
            _ => None,
        }
    }

    /// Whether events of this type occupy time for overlap purposes.
    pub fn occupies_time(&self) -> bool {
        !matches!(self, EventType::SupersededBy)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordinal severity grade, 1 (mildest) to 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 6;

    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Severity(value))
        } else {
            Err(ValidationError::SeverityOutOfRange(value))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Severity {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Severity::new(value)
    }
}

impl From<Severity> for u8 {
    fn from(severity: Severity) -> Self {
        severity.0
    }
}

/// Delivery state of an event towards the central database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Stored locally, not yet acknowledged.
    Pending,
    /// Acknowledged by the central endpoint.
    Synced,
    /// Refused for a security reason; needs human action.
    Rejected,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SyncStatus::Pending),
            "synced" => Some(SyncStatus::Synced),
            "rejected" => Some(SyncStatus::Rejected),
            _ => None,
        }
    }
}

/// Malformed or missing draft fields.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("severity {0} is outside {min}..={max}", min = Severity::MIN, max = Severity::MAX)]
    SeverityOutOfRange(u8),

    #[error("retraction markers can only be created by superseding an existing event")]
    RetractionWithoutTarget,

    #[error("notes exceed {MAX_NOTES_LEN} characters")]
    NotesTooLong,
}

/// Unvalidated input for a new event, as produced by the capture UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub patient_id: String,
    pub device_id: String,
    pub event_type: EventType,
    pub start: OffsetDateTime,
    pub end: Option<OffsetDateTime>,
    pub severity: Option<Severity>,
    /// Patient-local offset at capture time.
    pub utc_offset: UtcOffset,
    pub notes: Option<String>,
}

impl EventDraft {
    /// A medical event starting at `start`, captured in `start`'s offset.
    pub fn recorded(
        patient_id: impl Into<String>,
        device_id: impl Into<String>,
        start: OffsetDateTime,
    ) -> Self {
        Self::marker(EventType::EventRecorded, patient_id, device_id, start)
    }

    /// An event of any type at `at`, captured in `at`'s offset.
    pub fn marker(
        event_type: EventType,
        patient_id: impl Into<String>,
        device_id: impl Into<String>,
        at: OffsetDateTime,
    ) -> Self {
        EventDraft {
            patient_id: patient_id.into(),
            device_id: device_id.into(),
            event_type,
            start: at,
            end: None,
            severity: None,
            utc_offset: at.offset(),
            notes: None,
        }
    }

    pub fn with_end(mut self, end: OffsetDateTime) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_offset(mut self, utc_offset: UtcOffset) -> Self {
        self.utc_offset = utc_offset;
        self
    }

    /// Checks required fields and free-text limits.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.patient_id.trim().is_empty() {
            return Err(ValidationError::MissingField("patient id"));
        }
        if self.device_id.trim().is_empty() {
            return Err(ValidationError::MissingField("device id"));
        }
        if self.event_type == EventType::EventRecorded && self.severity.is_none() {
            return Err(ValidationError::MissingField("severity"));
        }
        if let Some(notes) = &self.notes {
            if notes.chars().count() > MAX_NOTES_LEN {
                return Err(ValidationError::NotesTooLong);
            }
        }
        Ok(())
    }

    /// The draft's span in its capture offset, truncated to whole seconds.
    pub fn interval(&self) -> Result<Interval, TemporalError> {
        let start = normalize(self.start, self.utc_offset);
        let end = self.end.map(|end| normalize(end, self.utc_offset));
        Interval::new(start, end)
    }
}

fn normalize(at: OffsetDateTime, offset: UtcOffset) -> OffsetDateTime {
    let at = at.to_offset(offset);
    at.replace_nanosecond(0).unwrap_or(at)
}

/// Sync bookkeeping kept beside an event.
///
/// The event itself is an immutable fact; only this record changes as
/// delivery progresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRecord {
    pub status: SyncStatus,
    pub attempts: u32,
    pub last_attempt_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<OffsetDateTime>,
    /// Retries are exhausted; waiting for an operator to requeue.
    pub stalled: bool,
}

impl SyncRecord {
    pub fn pending() -> Self {
        SyncRecord {
            status: SyncStatus::Pending,
            attempts: 0,
            last_attempt_at: None,
            last_error: None,
            next_attempt_at: None,
            stalled: false,
        }
    }
}

/// An admitted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    /// Local, gap-free admission order on this device.
    pub sequence: u64,
    pub patient_id: String,
    pub device_id: String,
    pub event_type: EventType,
    pub start: OffsetDateTime,
    pub end: Option<OffsetDateTime>,
    pub severity: Option<Severity>,
    pub utc_offset: UtcOffset,
    pub notes: Option<String>,
    /// Back-reference to the corrected event, if this is a correction.
    pub supersedes: Option<EventId>,
    /// Device instant at which the event was admitted.
    pub recorded_at: OffsetDateTime,
    pub duration_minutes: Option<i64>,
    pub sync: SyncRecord,
}

impl Event {
    pub fn interval(&self) -> Interval {
        Interval::from_stored(self.start, self.end)
    }

    /// Patient-local calendar date the event starts on.
    pub fn local_date(&self) -> Date {
        temporal::local_date(self.start, self.utc_offset)
    }

    pub fn is_correction(&self) -> bool {
        self.supersedes.is_some()
    }
}
