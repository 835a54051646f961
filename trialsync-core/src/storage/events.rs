// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event log storage operations.

use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use time::{Date, OffsetDateTime, UtcOffset};

use crate::event::{Event, EventId, EventType, Severity, SyncRecord, SyncStatus};

use super::{Storage, StorageError};

/// Columns selected for every event read, joined with its sync record.
const EVENT_COLUMNS: &str = "e.sequence, e.id, e.patient_id, e.device_id, e.event_type,
    e.start_at, e.end_at, e.utc_offset, e.severity, e.notes, e.supersedes, e.recorded_at,
    e.duration_minutes, s.status, s.attempts, s.last_attempt_at, s.last_error,
    s.next_attempt_at, s.stalled";

/// An event that passed validation and is about to be admitted.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: EventId,
    pub patient_id: String,
    pub device_id: String,
    pub event_type: EventType,
    pub start: OffsetDateTime,
    pub end: Option<OffsetDateTime>,
    pub severity: Option<Severity>,
    pub utc_offset: UtcOffset,
    pub local_date: Date,
    pub notes: Option<String>,
    pub supersedes: Option<EventId>,
    pub recorded_at: OffsetDateTime,
    pub duration_minutes: Option<i64>,
}

/// Keyset position in capture-time order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryCursor {
    pub start_at: i64,
    pub sequence: u64,
}

impl QueryCursor {
    /// Position before every event.
    pub fn origin() -> Self {
        QueryCursor {
            start_at: i64::MIN,
            sequence: 0,
        }
    }

    pub fn after(event: &Event) -> Self {
        QueryCursor {
            start_at: event.start.unix_timestamp(),
            sequence: event.sequence,
        }
    }
}

impl Storage {
    // === Event Log Operations ===

    /// Appends an event and its pending sync record, returning the assigned
    /// sequence number.
    ///
    /// Callers run this inside [`Storage::write_transaction`] together with
    /// their admission checks.
    pub fn insert_event(&self, event: &NewEvent) -> Result<u64, StorageError> {
        let sequence: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM events",
            [],
            |row| row.get(0),
        )?;

        self.conn.execute(
            "INSERT INTO events
             (sequence, id, patient_id, device_id, event_type, start_at, end_at, utc_offset,
              local_date, severity, notes, supersedes, recorded_at, duration_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                sequence,
                event.id.to_string(),
                event.patient_id,
                event.device_id,
                event.event_type.as_str(),
                event.start.unix_timestamp(),
                event.end.map(|end| end.unix_timestamp()),
                event.utc_offset.whole_seconds(),
                event.local_date.to_string(),
                event.severity.map(|s| s.value()),
                event.notes,
                event.supersedes.map(|id| id.to_string()),
                event.recorded_at.unix_timestamp(),
                event.duration_minutes,
            ],
        )?;

        self.conn.execute(
            "INSERT INTO event_sync (event_id, status) VALUES (?1, 'pending')",
            params![event.id.to_string()],
        )?;

        Ok(sequence as u64)
    }

    /// Gets an event by id.
    pub fn get_event(&self, id: &EventId) -> Result<Option<Event>, StorageError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events e JOIN event_sync s ON s.event_id = e.id
             WHERE e.id = ?1"
        );
        let event = self
            .conn
            .query_row(&sql, params![id.to_string()], row_to_event)
            .optional()?;
        Ok(event)
    }

    /// Returns the id of the event that supersedes `id`, if any.
    pub fn superseded_by(&self, id: &EventId) -> Result<Option<EventId>, StorageError> {
        let successor: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM events WHERE supersedes = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        successor
            .map(|s| {
                s.parse::<EventId>()
                    .map_err(|e| StorageError::Corrupt(format!("event id {s}: {e}")))
            })
            .transpose()
    }

    /// Live, time-occupying events of a patient that touch the unix-second
    /// range `from..=to`. Open-ended events count as occupying their start.
    pub fn overlap_candidates(
        &self,
        patient_id: &str,
        from: i64,
        to: i64,
    ) -> Result<Vec<Event>, StorageError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events e JOIN event_sync s ON s.event_id = e.id
             WHERE e.patient_id = ?1
               AND e.start_at <= ?3
               AND COALESCE(e.end_at, e.start_at) >= ?2
               AND e.event_type <> 'superseded_by'
               AND NOT EXISTS (SELECT 1 FROM events c WHERE c.supersedes = e.id)
             ORDER BY e.sequence"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![patient_id, from, to], row_to_event)?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }

    /// Highest committed sequence number, or 0 for an empty log.
    pub fn latest_sequence(&self) -> Result<u64, StorageError> {
        let sequence: i64 =
            self.conn
                .query_row("SELECT COALESCE(MAX(sequence), 0) FROM events", [], |row| {
                    row.get(0)
                })?;
        Ok(sequence as u64)
    }

    /// One page of live events in capture-time order.
    ///
    /// Only events with `sequence <= max_sequence` are visible, and an event
    /// counts as superseded only if its successor is visible too, so repeated
    /// pages observe a single snapshot.
    pub fn query_page(
        &self,
        patient_id: Option<&str>,
        from: OffsetDateTime,
        to: OffsetDateTime,
        max_sequence: u64,
        after: QueryCursor,
        limit: usize,
    ) -> Result<Vec<Event>, StorageError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events e JOIN event_sync s ON s.event_id = e.id
             WHERE e.sequence <= ?1
               AND e.start_at >= ?2 AND e.start_at < ?3
               AND (?4 IS NULL OR e.patient_id = ?4)
               AND (e.start_at > ?5 OR (e.start_at = ?5 AND e.sequence > ?6))
               AND NOT EXISTS (
                   SELECT 1 FROM events c WHERE c.supersedes = e.id AND c.sequence <= ?1
               )
             ORDER BY e.start_at, e.sequence
             LIMIT ?7"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                max_sequence as i64,
                from.unix_timestamp(),
                to.unix_timestamp(),
                patient_id,
                after.start_at,
                after.sequence as i64,
                limit as i64,
            ],
            row_to_event,
        )?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }

    /// Pending, non-stalled events of a patient whose next attempt is due,
    /// oldest first.
    pub fn due_for_sync(
        &self,
        patient_id: &str,
        now: OffsetDateTime,
        limit: usize,
    ) -> Result<Vec<Event>, StorageError> {
        let sql = format!(
            "SELECT {EVENT_COLUMNS} FROM events e JOIN event_sync s ON s.event_id = e.id
             WHERE e.patient_id = ?1
               AND s.status = 'pending'
               AND s.stalled = 0
               AND (s.next_attempt_at IS NULL OR s.next_attempt_at <= ?2)
             ORDER BY e.sequence
             LIMIT ?3"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![patient_id, now.unix_timestamp(), limit as i64],
            row_to_event,
        )?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::Database)
    }
}

fn corrupt(idx: usize, ty: Type, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, ty, Box::new(StorageError::Corrupt(message)))
}

fn instant(idx: usize, unix: i64, offset: UtcOffset) -> rusqlite::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(unix)
        .map(|at| at.to_offset(offset))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
}

pub(super) fn optional_instant(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<OffsetDateTime>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|unix| instant(idx, unix, UtcOffset::UTC))
        .transpose()
}

fn event_id(idx: usize, raw: String) -> rusqlite::Result<EventId> {
    raw.parse::<EventId>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Converts a joined events/event_sync row to an Event.
fn row_to_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    let offset_seconds: i32 = row.get(7)?;
    let utc_offset = UtcOffset::from_whole_seconds(offset_seconds)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Integer, Box::new(e)))?;

    let event_type: String = row.get(4)?;
    let event_type = EventType::parse(&event_type)
        .ok_or_else(|| corrupt(4, Type::Text, format!("unknown event type '{event_type}'")))?;

    let severity = row
        .get::<_, Option<u8>>(8)?
        .map(|value| {
            Severity::new(value).map_err(|e| corrupt(8, Type::Integer, e.to_string()))
        })
        .transpose()?;

    let supersedes = row
        .get::<_, Option<String>>(10)?
        .map(|raw| event_id(10, raw))
        .transpose()?;

    let status: String = row.get(13)?;
    let status = SyncStatus::parse(&status)
        .ok_or_else(|| corrupt(13, Type::Text, format!("unknown sync status '{status}'")))?;

    Ok(Event {
        sequence: row.get::<_, i64>(0)? as u64,
        id: event_id(1, row.get(1)?)?,
        patient_id: row.get(2)?,
        device_id: row.get(3)?,
        event_type,
        start: instant(5, row.get(5)?, utc_offset)?,
        end: row
            .get::<_, Option<i64>>(6)?
            .map(|unix| instant(6, unix, utc_offset))
            .transpose()?,
        severity,
        utc_offset,
        notes: row.get(9)?,
        supersedes,
        recorded_at: instant(11, row.get(11)?, UtcOffset::UTC)?,
        duration_minutes: row.get(12)?,
        sync: SyncRecord {
            status,
            attempts: row.get::<_, i64>(14)? as u32,
            last_attempt_at: optional_instant(row, 15)?,
            last_error: row.get(16)?,
            next_attempt_at: optional_instant(row, 17)?,
            stalled: row.get(18)?,
        },
    })
}
