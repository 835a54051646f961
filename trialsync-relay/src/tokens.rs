// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Token Registry
//!
//! Opaque bearer token ids mapped to the patient they were issued for.
//! Revocation is permanent.

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension};
use time::OffsetDateTime;

use crate::db::{to_instant, RelayDb};
use crate::error::RelayError;

/// What a presented token id resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStatus {
    Active {
        patient_id: String,
    },
    Revoked {
        patient_id: String,
        revoked_at: OffsetDateTime,
    },
    Unknown,
}

/// Issues, resolves and revokes token ids.
#[derive(Clone)]
pub struct TokenRegistry {
    db: Arc<RelayDb>,
}

impl TokenRegistry {
    pub fn new(db: Arc<RelayDb>) -> Self {
        TokenRegistry { db }
    }

    /// Issues a fresh token id for `patient_id`.
    pub fn issue(&self, patient_id: &str, at: OffsetDateTime) -> Result<String, RelayError> {
        Ok(insert_token(&self.db.conn(), patient_id, at)?)
    }

    pub fn resolve(&self, token_id: &str) -> Result<TokenStatus, RelayError> {
        let row = self
            .db
            .conn()
            .query_row(
                "SELECT patient_id, revoked_at FROM tokens WHERE token_id = ?1",
                params![token_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<i64>>(1)?)),
            )
            .optional()?;

        Ok(match row {
            None => TokenStatus::Unknown,
            Some((patient_id, None)) => TokenStatus::Active { patient_id },
            Some((patient_id, Some(revoked_at))) => TokenStatus::Revoked {
                patient_id,
                revoked_at: to_instant(revoked_at)?,
            },
        })
    }

    /// Revokes `token_id`. Returns `false` for unknown ids. Revoking twice
    /// keeps the first revocation time.
    pub fn revoke(&self, token_id: &str, at: OffsetDateTime) -> Result<bool, RelayError> {
        let conn = self.db.conn();
        let known: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tokens WHERE token_id = ?1)",
            params![token_id],
            |row| row.get(0),
        )?;
        if !known {
            return Ok(false);
        }
        conn.execute(
            "UPDATE tokens SET revoked_at = ?2 WHERE token_id = ?1 AND revoked_at IS NULL",
            params![token_id, at.unix_timestamp()],
        )?;
        Ok(true)
    }
}

pub(crate) fn insert_token(
    conn: &Connection,
    patient_id: &str,
    at: OffsetDateTime,
) -> rusqlite::Result<String> {
    let token_id = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO tokens (token_id, patient_id, issued_at) VALUES (?1, ?2, ?3)",
        params![token_id, patient_id, at.unix_timestamp()],
    )?;
    Ok(token_id)
}
