// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Mock Transport
//!
//! Scriptable in-memory transport for testing.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::protocol::{SyncBatchRequest, SyncBatchResponse};
use super::transport::{SyncTransport, TransportError};
use crate::gate::EgressPermit;

/// Scripted reply for the next submission.
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Acknowledge every event in the batch.
    AcknowledgeAll,
    /// Return exactly this response.
    Respond(SyncBatchResponse),
    /// Fail the whole request.
    Fail(TransportError),
}

#[derive(Debug, Default)]
struct MockState {
    submissions: Vec<SyncBatchRequest>,
    script: VecDeque<MockReply>,
}

/// Mock transport for testing.
///
/// Records every submitted batch. Replies follow the queued script and
/// default to acknowledging everything once the script is empty. Clones
/// share state, so a test can keep a handle after moving one into an engine.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues the reply for a future submission.
    pub fn push_reply(&self, reply: MockReply) {
        self.state.lock().script.push_back(reply);
    }

    /// Returns all batches submitted so far.
    pub fn submissions(&self) -> Vec<SyncBatchRequest> {
        self.state.lock().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().submissions.len()
    }

    /// Total number of events transmitted, counting re-sends.
    pub fn transmitted_event_count(&self) -> usize {
        self.state
            .lock()
            .submissions
            .iter()
            .map(|batch| batch.events.len())
            .sum()
    }
}

impl SyncTransport for MockTransport {
    async fn submit(
        &self,
        _permit: &EgressPermit,
        batch: &SyncBatchRequest,
    ) -> Result<SyncBatchResponse, TransportError> {
        let mut state = self.state.lock();
        state.submissions.push(batch.clone());
        match state.script.pop_front().unwrap_or(MockReply::AcknowledgeAll) {
            MockReply::AcknowledgeAll => Ok(SyncBatchResponse::acknowledge_all(batch)),
            MockReply::Respond(response) => Ok(response),
            MockReply::Fail(error) => Err(error),
        }
    }
}
