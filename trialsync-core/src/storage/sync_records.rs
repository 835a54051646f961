// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync bookkeeping operations.
//!
//! These statements touch only `event_sync`; the event rows they describe
//! stay untouched. Every transition is guarded by `status = 'pending'` so a
//! late or duplicated outcome cannot move an event out of a final state.

use rusqlite::{params, OptionalExtension};
use time::OffsetDateTime;

use crate::event::{EventId, SyncRecord, SyncStatus};

use super::events::optional_instant;
use super::{Storage, StorageError};

impl Storage {
    // === Sync Record Operations ===

    /// Marks a pending event as acknowledged by the central endpoint.
    pub fn mark_synced(&self, id: &EventId, at: OffsetDateTime) -> Result<bool, StorageError> {
        let rows_affected = self.conn.execute(
            "UPDATE event_sync
             SET status = 'synced', attempts = attempts + 1, last_attempt_at = ?1,
                 last_error = NULL, next_attempt_at = NULL, stalled = 0
             WHERE event_id = ?2 AND status = 'pending'",
            params![at.unix_timestamp(), id.to_string()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Marks a pending event as refused for a security reason.
    pub fn mark_rejected(
        &self,
        id: &EventId,
        error: &str,
        at: OffsetDateTime,
    ) -> Result<bool, StorageError> {
        let rows_affected = self.conn.execute(
            "UPDATE event_sync
             SET status = 'rejected', attempts = attempts + 1, last_attempt_at = ?1,
                 last_error = ?2, next_attempt_at = NULL, stalled = 0
             WHERE event_id = ?3 AND status = 'pending'",
            params![at.unix_timestamp(), error, id.to_string()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Records a failed delivery attempt that may be retried.
    ///
    /// With `stalled` set the event leaves the automatic queue until
    /// [`Storage::requeue_stalled`] is called.
    pub fn record_transient_failure(
        &self,
        id: &EventId,
        error: &str,
        at: OffsetDateTime,
        next_attempt_at: Option<OffsetDateTime>,
        stalled: bool,
    ) -> Result<bool, StorageError> {
        let rows_affected = self.conn.execute(
            "UPDATE event_sync
             SET attempts = attempts + 1, last_attempt_at = ?1, last_error = ?2,
                 next_attempt_at = ?3, stalled = ?4
             WHERE event_id = ?5 AND status = 'pending'",
            params![
                at.unix_timestamp(),
                error,
                next_attempt_at.map(|t| t.unix_timestamp()),
                stalled,
                id.to_string(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Gets the sync record of an event.
    pub fn sync_record(&self, id: &EventId) -> Result<Option<SyncRecord>, StorageError> {
        let record = self
            .conn
            .query_row(
                "SELECT status, attempts, last_attempt_at, last_error, next_attempt_at, stalled
                 FROM event_sync WHERE event_id = ?1",
                params![id.to_string()],
                |row| {
                    let status: String = row.get(0)?;
                    Ok((
                        status,
                        SyncRecord {
                            status: SyncStatus::Pending,
                            attempts: row.get::<_, i64>(1)? as u32,
                            last_attempt_at: optional_instant(row, 2)?,
                            last_error: row.get(3)?,
                            next_attempt_at: optional_instant(row, 4)?,
                            stalled: row.get(5)?,
                        },
                    ))
                },
            )
            .optional()?;

        record
            .map(|(status, record)| {
                SyncStatus::parse(&status)
                    .map(|status| SyncRecord { status, ..record })
                    .ok_or_else(|| StorageError::Corrupt(format!("unknown sync status '{status}'")))
            })
            .transpose()
    }

    /// Counts a patient's events that are still pending, stalled or not.
    pub fn pending_count(&self, patient_id: &str) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_sync s JOIN events e ON e.id = s.event_id
             WHERE e.patient_id = ?1 AND s.status = 'pending'",
            params![patient_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Ids of a patient's events whose retries are exhausted.
    pub fn stalled_events(&self, patient_id: &str) -> Result<Vec<EventId>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT e.id FROM event_sync s JOIN events e ON e.id = s.event_id
             WHERE e.patient_id = ?1 AND s.status = 'pending' AND s.stalled = 1
             ORDER BY e.sequence",
        )?;
        let ids = stmt
            .query_map(params![patient_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        ids.into_iter()
            .map(|raw| {
                raw.parse::<EventId>()
                    .map_err(|e| StorageError::Corrupt(format!("event id {raw}: {e}")))
            })
            .collect()
    }

    /// Puts a patient's stalled events back into the automatic queue with a
    /// fresh attempt budget. Returns how many were requeued.
    pub fn requeue_stalled(&self, patient_id: &str) -> Result<usize, StorageError> {
        let rows_affected = self.conn.execute(
            "UPDATE event_sync SET stalled = 0, attempts = 0, next_attempt_at = NULL
             WHERE stalled = 1 AND status = 'pending'
               AND event_id IN (SELECT id FROM events WHERE patient_id = ?1)",
            params![patient_id],
        )?;
        Ok(rows_affected)
    }

    /// Earliest scheduled retry among a patient's queued events.
    pub fn next_attempt_due(
        &self,
        patient_id: &str,
    ) -> Result<Option<OffsetDateTime>, StorageError> {
        let next: Option<i64> = self.conn.query_row(
            "SELECT MIN(s.next_attempt_at) FROM event_sync s JOIN events e ON e.id = s.event_id
             WHERE e.patient_id = ?1 AND s.status = 'pending' AND s.stalled = 0",
            params![patient_id],
            |row| row.get(0),
        )?;

        next.map(|unix| {
            OffsetDateTime::from_unix_timestamp(unix)
                .map_err(|e| StorageError::Corrupt(format!("next attempt {unix}: {e}")))
        })
        .transpose()
    }
}
