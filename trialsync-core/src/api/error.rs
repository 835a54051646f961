// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! API Error Types
//!
//! Unified error type for the TrialSync API layer.

use thiserror::Error;

use crate::crypto::CredentialError;
use crate::event::ValidationError;
use crate::gate::GateError;
use crate::network::TransportError;
use crate::storage::StorageError;
use crate::store::AppendError;
use crate::sync::SyncError;
use crate::temporal::TemporalError;

/// Unified error type for TrialSync operations.
#[derive(Error, Debug)]
pub enum TrialSyncError {
    /// A draft field is missing or malformed.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Invalid interval or future-dated capture.
    #[error(transparent)]
    Temporal(#[from] TemporalError),

    /// The event store refused an event.
    #[error("event not admitted: {0}")]
    Append(#[from] AppendError),

    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Sync gate transition failed.
    #[error("sync gate error: {0}")]
    Gate(#[from] GateError),

    /// Sync engine failed.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Talking to the relay failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Credential encoding or derivation failed.
    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Result type for TrialSync operations.
pub type TrialSyncResult<T> = Result<T, TrialSyncError>;
