// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync transport abstraction.

use std::future::Future;

use thiserror::Error;

use super::protocol::{RejectionCode, SyncBatchRequest, SyncBatchResponse};
use crate::gate::EgressPermit;

/// Transport error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Refused for a security reason; never retried automatically.
    #[error("rejected by relay: {}", .0.as_str())]
    Rejected(RejectionCode),

    /// Connection, timeout or server-side failure; safe to retry.
    #[error("transient network error: {0}")]
    Transient(String),

    /// The relay answered something this client does not understand.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Rejected(_))
    }
}

/// Delivers event batches to the central endpoint.
///
/// Submitting requires an [`EgressPermit`], so nothing can be sent for a
/// patient whose sync gate is not approved.
pub trait SyncTransport: Send + Sync + 'static {
    fn submit(
        &self,
        permit: &EgressPermit,
        batch: &SyncBatchRequest,
    ) -> impl Future<Output = Result<SyncBatchResponse, TransportError>> + Send;
}
