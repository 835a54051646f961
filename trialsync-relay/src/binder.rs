// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Device Identity Binder
//!
//! Binds one device to each enrolled patient and re-verifies the presented
//! device on every sync request, independently of token validity.
//!
//! Every refusal is written to the audit log before the outcome is returned,
//! so the entry exists even if the response never reaches the client. The
//! expected device id goes to the audit log only.

use std::sync::Arc;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use thiserror::Error;
use time::OffsetDateTime;
use trialsync_core::temporal::Clock;

use crate::audit::{AuditKind, AuditRecord, AuditStore};
use crate::db::{to_instant, RelayDb};
use crate::error::RelayError;
use crate::tokens::{insert_token, TokenRegistry, TokenStatus};

/// A patient's device binding. Immutable once created, except for the
/// one-time study start approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentBinding {
    pub patient_id: String,
    pub device_id: String,
    /// Token issued at enrollment.
    pub token_id: String,
    pub bound_at: OffsetDateTime,
    pub study_start_approved_at: Option<OffsetDateTime>,
}

/// Result of verifying a sync request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified { patient_id: String },
    /// Carries nothing about the bound device.
    DeviceMismatch,
    TokenRevoked,
}

#[derive(Error, Debug)]
pub enum BinderError {
    #[error("a different device is already bound to this patient")]
    EnrollmentConflict,

    #[error("patient is not enrolled")]
    NotEnrolled,

    #[error("Storage error: {0}")]
    Storage(#[from] RelayError),

    #[error("audit write failed: {0}")]
    Audit(RelayError),
}

impl From<rusqlite::Error> for BinderError {
    fn from(err: rusqlite::Error) -> Self {
        BinderError::Storage(RelayError::Database(err))
    }
}

pub struct DeviceBinder {
    db: Arc<RelayDb>,
    tokens: TokenRegistry,
    audit: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
}

impl DeviceBinder {
    pub fn new(
        db: Arc<RelayDb>,
        tokens: TokenRegistry,
        audit: Arc<dyn AuditStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        DeviceBinder {
            db,
            tokens,
            audit,
            clock,
        }
    }

    /// Binds `device_id` to `patient_id` and issues the enrollment token.
    ///
    /// Binding the already bound device again returns the existing binding.
    /// Any other device fails with [`BinderError::EnrollmentConflict`].
    pub fn bind(
        &self,
        patient_id: &str,
        device_id: &str,
    ) -> Result<EnrollmentBinding, BinderError> {
        let now = self.clock.now();
        let mut conn = self.db.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        if let Some(existing) = load_binding(&tx, patient_id)? {
            return if existing.device_id == device_id {
                Ok(existing)
            } else {
                tracing::warn!(patient_id, "enrollment conflict");
                Err(BinderError::EnrollmentConflict)
            };
        }

        let token_id = insert_token(&tx, patient_id, now)?;
        tx.execute(
            "INSERT INTO bindings (patient_id, device_id, token_id, bound_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![patient_id, device_id, token_id, now.unix_timestamp()],
        )?;
        tx.commit()?;

        tracing::info!(patient_id, "device bound");
        Ok(EnrollmentBinding {
            patient_id: patient_id.to_string(),
            device_id: device_id.to_string(),
            token_id,
            bound_at: to_instant(now.unix_timestamp())?,
            study_start_approved_at: None,
        })
    }

    /// Resolves `token_id` and compares the presented device with the bound
    /// one. A valid, unrevoked token is still refused for the wrong device.
    pub fn verify(
        &self,
        token_id: &str,
        presented_device_id: &str,
    ) -> Result<VerifyOutcome, BinderError> {
        let patient_id = match self.tokens.resolve(token_id)? {
            TokenStatus::Active { patient_id } => patient_id,
            TokenStatus::Revoked { patient_id, .. } => {
                self.record(
                    AuditKind::TokenRevoked,
                    token_id,
                    presented_device_id,
                    None,
                    Some(patient_id),
                )?;
                return Ok(VerifyOutcome::TokenRevoked);
            }
            TokenStatus::Unknown => {
                self.record(
                    AuditKind::TokenRevoked,
                    token_id,
                    presented_device_id,
                    None,
                    None,
                )?;
                return Ok(VerifyOutcome::TokenRevoked);
            }
        };

        let bound = self.binding(&patient_id)?.map(|b| b.device_id);
        if bound.as_deref() == Some(presented_device_id) {
            return Ok(VerifyOutcome::Verified { patient_id });
        }

        self.record(
            AuditKind::DeviceMismatch,
            token_id,
            presented_device_id,
            bound,
            Some(patient_id),
        )?;
        Ok(VerifyOutcome::DeviceMismatch)
    }

    fn record(
        &self,
        kind: AuditKind,
        token_id: &str,
        presented_device_id: &str,
        expected_device_id: Option<String>,
        patient_id: Option<String>,
    ) -> Result<(), BinderError> {
        let record = AuditRecord {
            kind,
            token_id: token_id.to_string(),
            presented_device_id: presented_device_id.to_string(),
            expected_device_id,
            patient_id,
            at: self.clock.now(),
        };
        self.audit.append(&record).map_err(BinderError::Audit)?;

        match kind {
            AuditKind::DeviceMismatch => {
                tracing::warn!(token_id, presented_device_id, "device mismatch")
            }
            AuditKind::TokenRevoked => {
                tracing::warn!(token_id, presented_device_id, "revoked or unknown token")
            }
        }
        Ok(())
    }

    /// Records the study start approval. Only the first approval is kept.
    pub fn approve_study_start(
        &self,
        patient_id: &str,
        approved_at: OffsetDateTime,
    ) -> Result<EnrollmentBinding, BinderError> {
        let conn = self.db.conn();
        let updated = conn.execute(
            "UPDATE bindings SET study_start_approved_at = ?2
             WHERE patient_id = ?1 AND study_start_approved_at IS NULL",
            params![patient_id, approved_at.unix_timestamp()],
        )?;
        let binding = load_binding(&conn, patient_id)?.ok_or(BinderError::NotEnrolled)?;
        if updated > 0 {
            tracing::info!(patient_id, "study start approved");
        }
        Ok(binding)
    }

    pub fn binding(&self, patient_id: &str) -> Result<Option<EnrollmentBinding>, BinderError> {
        Ok(load_binding(&self.db.conn(), patient_id)?)
    }

    /// Issues a further token for an enrolled patient, as on login.
    pub fn issue_token(&self, patient_id: &str) -> Result<String, BinderError> {
        if self.binding(patient_id)?.is_none() {
            return Err(BinderError::NotEnrolled);
        }
        Ok(self.tokens.issue(patient_id, self.clock.now())?)
    }

    pub fn revoke_token(&self, token_id: &str) -> Result<bool, BinderError> {
        let revoked = self.tokens.revoke(token_id, self.clock.now())?;
        if revoked {
            tracing::info!(token_id, "token revoked");
        }
        Ok(revoked)
    }

    pub fn audit(&self) -> &Arc<dyn AuditStore> {
        &self.audit
    }
}

fn load_binding(
    conn: &Connection,
    patient_id: &str,
) -> Result<Option<EnrollmentBinding>, RelayError> {
    let row = conn
        .query_row(
            "SELECT device_id, token_id, bound_at, study_start_approved_at
             FROM bindings WHERE patient_id = ?1",
            params![patient_id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            },
        )
        .optional()?;

    let Some((device_id, token_id, bound_at, approved_at)) = row else {
        return Ok(None);
    };
    Ok(Some(EnrollmentBinding {
        patient_id: patient_id.to_string(),
        device_id,
        token_id,
        bound_at: to_instant(bound_at)?,
        study_start_approved_at: approved_at.map(to_instant).transpose()?,
    }))
}
