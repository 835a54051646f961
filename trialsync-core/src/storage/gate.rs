// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync gate persistence.

use rusqlite::{params, OptionalExtension};
use time::OffsetDateTime;

use crate::gate::GateState;

use super::events::optional_instant;
use super::{Storage, StorageError};

/// Persisted gate state of one patient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRow {
    pub state: GateState,
    pub questionnaire_submitted_at: Option<OffsetDateTime>,
    pub approved_at: Option<OffsetDateTime>,
}

impl Storage {
    // === Sync Gate Operations ===

    /// Loads a patient's gate, or `None` if it was never persisted.
    pub fn load_gate(&self, patient_id: &str) -> Result<Option<GateRow>, StorageError> {
        let row = self
            .conn
            .query_row(
                "SELECT state, questionnaire_submitted_at, approved_at
                 FROM sync_gate WHERE patient_id = ?1",
                params![patient_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        optional_instant(row, 1)?,
                        optional_instant(row, 2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(state, questionnaire_submitted_at, approved_at)| {
            let state = GateState::parse(&state)
                .ok_or_else(|| StorageError::Corrupt(format!("unknown gate state '{state}'")))?;
            Ok(GateRow {
                state,
                questionnaire_submitted_at,
                approved_at,
            })
        })
        .transpose()
    }

    /// Inserts or replaces a patient's gate.
    pub fn save_gate(
        &self,
        patient_id: &str,
        gate: &GateRow,
        updated_at: OffsetDateTime,
    ) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO sync_gate (patient_id, state, questionnaire_submitted_at, approved_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(patient_id) DO UPDATE SET
                 state = excluded.state,
                 questionnaire_submitted_at = excluded.questionnaire_submitted_at,
                 approved_at = excluded.approved_at,
                 updated_at = excluded.updated_at",
            params![
                patient_id,
                gate.state.as_str(),
                gate.questionnaire_submitted_at.map(|t| t.unix_timestamp()),
                gate.approved_at.map(|t| t.unix_timestamp()),
                updated_at.unix_timestamp(),
            ],
        )?;
        Ok(())
    }
}
