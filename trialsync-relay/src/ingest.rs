// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Event Ingest
//!
//! Central copy of uploaded events, keyed by event id. Re-sent events are
//! acknowledged without being stored twice.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension, TransactionBehavior};
use time::OffsetDateTime;
use trialsync_core::event::EventId;
use trialsync_core::network::WireEvent;

use crate::db::RelayDb;
use crate::error::RelayError;

/// What happened to one uploaded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    /// The id was already stored; the stored copy is kept.
    Duplicate,
}

#[derive(Clone)]
pub struct IngestStore {
    db: Arc<RelayDb>,
}

impl IngestStore {
    pub fn new(db: Arc<RelayDb>) -> Self {
        IngestStore { db }
    }

    /// Stores a verified batch in one transaction.
    pub fn ingest(
        &self,
        events: &[WireEvent],
        received_at: OffsetDateTime,
    ) -> Result<Vec<IngestOutcome>, RelayError> {
        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut outcomes = Vec::with_capacity(events.len());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO ingested_events (event_id, patient_id, device_id, payload, received_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(event_id) DO NOTHING",
            )?;
            for event in events {
                let payload = serde_json::to_string(event)?;
                let inserted = stmt.execute(params![
                    event.event_id.to_string(),
                    event.patient_id,
                    event.device_id,
                    payload,
                    received_at.unix_timestamp(),
                ])?;
                outcomes.push(if inserted == 1 {
                    IngestOutcome::Inserted
                } else {
                    IngestOutcome::Duplicate
                });
            }
        }
        tx.commit()?;

        Ok(outcomes)
    }

    pub fn get(&self, event_id: &EventId) -> Result<Option<WireEvent>, RelayError> {
        let payload = self
            .db
            .conn()
            .query_row(
                "SELECT payload FROM ingested_events WHERE event_id = ?1",
                params![event_id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;

        payload
            .map(|p| serde_json::from_str(&p).map_err(RelayError::from))
            .transpose()
    }

    pub fn count(&self) -> Result<usize, RelayError> {
        let n: i64 = self
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM ingested_events", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn count_for_patient(&self, patient_id: &str) -> Result<usize, RelayError> {
        let n: i64 = self.db.conn().query_row(
            "SELECT COUNT(*) FROM ingested_events WHERE patient_id = ?1",
            params![patient_id],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}
