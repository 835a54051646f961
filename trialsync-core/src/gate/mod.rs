// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Gate
//!
//! Per-patient state machine that decides whether captured data may leave
//! the device:
//!
//! ```text
//! LocalOnly --submit questionnaire--> PendingApproval --approval--> Approved
//! ```
//!
//! Transitions only move forward and are persisted before they are
//! published. Egress requires an [`EgressPermit`], which can only be
//! obtained while the gate is `Approved`.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::network::EnrollmentStatus;
use crate::storage::{GateRow, SharedStorage, StorageError};
use crate::temporal::Clock;

/// Gate position of one patient.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateState {
    /// Data is captured and kept on the device only.
    LocalOnly,
    /// The gating questionnaire was submitted; waiting for approval.
    PendingApproval,
    /// Study start approved; queued data may be transmitted.
    Approved,
}

impl GateState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GateState::LocalOnly => "local_only",
            GateState::PendingApproval => "pending_approval",
            GateState::Approved => "approved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local_only" => Some(GateState::LocalOnly),
            "pending_approval" => Some(GateState::PendingApproval),
            "approved" => Some(GateState::Approved),
            _ => None,
        }
    }

    pub fn allows_egress(&self) -> bool {
        matches!(self, GateState::Approved)
    }
}

impl fmt::Display for GateState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gate errors.
#[derive(Error, Debug)]
pub enum GateError {
    #[error("illegal gate transition from {from} to {to}")]
    IllegalTransition { from: GateState, to: GateState },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Proof that the gate was `Approved` for a patient.
///
/// Only [`SyncGate`] can mint one; every transmission API takes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EgressPermit {
    patient_id: String,
}

impl EgressPermit {
    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }
}

/// Persistent, observable sync gate of one patient.
pub struct SyncGate {
    patient_id: String,
    storage: SharedStorage,
    clock: Arc<dyn Clock>,
    row: Mutex<GateRow>,
    state: watch::Sender<GateState>,
}

impl SyncGate {
    /// Loads a patient's gate; a patient without a stored gate starts in
    /// `LocalOnly`.
    pub fn load(
        patient_id: impl Into<String>,
        storage: SharedStorage,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, GateError> {
        let patient_id = patient_id.into();
        let row = storage.lock().load_gate(&patient_id)?.unwrap_or(GateRow {
            state: GateState::LocalOnly,
            questionnaire_submitted_at: None,
            approved_at: None,
        });
        let (state, _) = watch::channel(row.state);

        Ok(SyncGate {
            patient_id,
            storage,
            clock,
            row: Mutex::new(row),
            state,
        })
    }

    pub fn patient_id(&self) -> &str {
        &self.patient_id
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    /// When the study start was approved, if it was.
    pub fn approved_at(&self) -> Option<OffsetDateTime> {
        self.row.lock().approved_at
    }

    /// Records submission of the gating questionnaire.
    pub fn submit_gating_questionnaire(&self) -> Result<GateState, GateError> {
        let now = self.clock.now();
        self.transition(GateState::PendingApproval, |row| {
            row.questionnaire_submitted_at = Some(now);
        })
    }

    /// Applies the external approval signal. The first approval timestamp
    /// is kept; repeated approvals are no-ops.
    pub fn approve(&self, approved_at: OffsetDateTime) -> Result<GateState, GateError> {
        self.transition(GateState::Approved, |row| {
            row.approved_at = Some(approved_at);
        })
    }

    /// Feeds the relay's enrollment status into the gate. Approval only
    /// takes effect once the questionnaire has been submitted locally.
    pub fn apply_enrollment_status(
        &self,
        status: &EnrollmentStatus,
    ) -> Result<GateState, GateError> {
        match (self.state(), status.study_start_approved_at) {
            (GateState::PendingApproval, Some(approved_at)) => self.approve(approved_at),
            (state, _) => Ok(state),
        }
    }

    fn transition(
        &self,
        to: GateState,
        apply: impl FnOnce(&mut GateRow),
    ) -> Result<GateState, GateError> {
        let mut row = self.row.lock();
        let from = row.state;

        if from == to {
            return Ok(from);
        }
        let legal = matches!(
            (from, to),
            (GateState::LocalOnly, GateState::PendingApproval)
                | (GateState::PendingApproval, GateState::Approved)
        );
        if !legal {
            return Err(GateError::IllegalTransition { from, to });
        }

        let mut next = row.clone();
        next.state = to;
        apply(&mut next);
        self.storage
            .lock()
            .save_gate(&self.patient_id, &next, self.clock.now())?;
        *row = next;
        drop(row);

        tracing::info!(patient_id = %self.patient_id, %from, %to, "sync gate transition");
        self.state.send_replace(to);
        Ok(to)
    }

    /// Observes gate changes.
    pub fn subscribe(&self) -> watch::Receiver<GateState> {
        self.state.subscribe()
    }

    /// A permit if the gate is `Approved` right now.
    pub fn transmission_permit(&self) -> Option<EgressPermit> {
        self.state().allows_egress().then(|| EgressPermit {
            patient_id: self.patient_id.clone(),
        })
    }

    /// Resolves once the gate is `Approved`, without polling.
    pub async fn wait_until_approved(&self) -> EgressPermit {
        let mut rx = self.state.subscribe();
        loop {
            if let Some(permit) = self.transmission_permit() {
                return permit;
            }
            // The sender lives in `self`, so the channel cannot close here.
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}
