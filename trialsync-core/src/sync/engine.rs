// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Engine
//!
//! Background flush of a patient's pending events. Nothing is submitted
//! unless the sync gate hands out an [`EgressPermit`]. The queue is the
//! `event_sync` table, so cancelling the engine at any await point loses
//! nothing: unacknowledged events are still pending on the next run.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::api::config::SyncConfig;
use crate::api::events::{NoticeDispatcher, SyncNotice};
use crate::event::{Event, EventId};
use crate::gate::{EgressPermit, GateState, SyncGate};
use crate::network::{SyncBatchRequest, SyncTransport, TransportError, WireEvent};
use crate::store::EventStore;

use super::SyncError;

/// Idle wait when nothing is scheduled; any append or wake ends it early.
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// Outcome counts of one flush cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Events put on the wire, counting re-sends.
    pub sent: usize,
    pub acknowledged: usize,
    pub rejected: usize,
    /// Failures that will be retried.
    pub transient_failures: usize,
    /// Failures that used up the retry budget.
    pub stalled: usize,
}

impl SyncReport {
    fn merge(&mut self, other: SyncReport) {
        self.sent += other.sent;
        self.acknowledged += other.acknowledged;
        self.rejected += other.rejected;
        self.transient_failures += other.transient_failures;
        self.stalled += other.stalled;
    }
}

/// Operator-visible engine status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    pub gate: GateState,
    /// Events still pending, stalled ones included.
    pub pending: usize,
    /// Events that need [`SyncEngine::requeue_stalled`].
    pub stalled: Vec<EventId>,
}

/// Sync engine of one patient.
pub struct SyncEngine<T: SyncTransport> {
    store: EventStore,
    gate: Arc<SyncGate>,
    transport: T,
    config: SyncConfig,
    notices: Arc<NoticeDispatcher>,
    wake: Notify,
}

impl<T: SyncTransport> SyncEngine<T> {
    pub fn new(
        store: EventStore,
        gate: Arc<SyncGate>,
        transport: T,
        config: SyncConfig,
        notices: Arc<NoticeDispatcher>,
    ) -> Self {
        SyncEngine {
            store,
            gate,
            transport,
            config,
            notices,
            wake: Notify::new(),
        }
    }

    pub fn gate(&self) -> &SyncGate {
        &self.gate
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Asks a running engine to flush now.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Current gate state, queue depth and stalled events.
    pub fn status(&self) -> Result<EngineStatus, SyncError> {
        let patient_id = self.gate.patient_id();
        Ok(EngineStatus {
            gate: self.gate.state(),
            pending: self.store.pending_count(patient_id)?,
            stalled: self.store.stalled_events(patient_id)?,
        })
    }

    /// Gives stalled events a fresh retry budget and wakes the engine.
    pub fn requeue_stalled(&self) -> Result<usize, SyncError> {
        let requeued = self.store.requeue_stalled(self.gate.patient_id())?;
        if requeued > 0 {
            tracing::info!(patient_id = %self.gate.patient_id(), requeued, "stalled events requeued");
            self.wake();
        }
        Ok(requeued)
    }

    /// Runs one flush cycle.
    ///
    /// Without approval this returns an empty report and transmits nothing.
    /// Otherwise due events are sent batch by batch until the queue is empty
    /// or a request fails as a whole.
    pub async fn sync_once(&self) -> Result<SyncReport, SyncError> {
        let Some(permit) = self.gate.transmission_permit() else {
            tracing::debug!(patient_id = %self.gate.patient_id(), "sync gate closed, nothing sent");
            return Ok(SyncReport::default());
        };

        let mut report = SyncReport::default();
        loop {
            let batch = self
                .store
                .due_for_sync(permit.patient_id(), self.config.batch_size)?;
            if batch.is_empty() {
                break;
            }

            let (batch_report, request_failed) = self.send_batch(&permit, &batch).await?;
            report.merge(batch_report);
            if request_failed {
                break;
            }
        }

        if report.sent > 0 {
            tracing::info!(
                patient_id = %permit.patient_id(),
                sent = report.sent,
                acknowledged = report.acknowledged,
                rejected = report.rejected,
                transient_failures = report.transient_failures,
                stalled = report.stalled,
                "sync cycle finished"
            );
        }
        Ok(report)
    }

    async fn send_batch(
        &self,
        permit: &EgressPermit,
        batch: &[Event],
    ) -> Result<(SyncReport, bool), SyncError> {
        let request = SyncBatchRequest {
            events: batch.iter().map(WireEvent::from).collect(),
        };
        let mut report = SyncReport {
            sent: batch.len(),
            ..SyncReport::default()
        };

        match self.transport.submit(permit, &request).await {
            Ok(response) => {
                let acknowledged: HashSet<EventId> =
                    response.results.iter().map(|r| r.event_id).collect();
                for event in batch {
                    if acknowledged.contains(&event.id) {
                        if self.store.mark_synced(&event.id)? {
                            report.acknowledged += 1;
                            self.notices
                                .dispatch(SyncNotice::EventSynced { event_id: event.id });
                        }
                    } else {
                        self.record_failure(event, "not acknowledged", &mut report)?;
                    }
                }
                Ok((report, false))
            }
            Err(TransportError::Rejected(code)) => {
                tracing::warn!(
                    patient_id = %permit.patient_id(),
                    code = code.as_str(),
                    events = batch.len(),
                    "batch rejected by relay"
                );
                for event in batch {
                    if self.store.mark_rejected(&event.id, code.as_str())? {
                        report.rejected += 1;
                        self.notices.dispatch(SyncNotice::EventRejected {
                            event_id: event.id,
                            code,
                        });
                    }
                }
                Ok((report, true))
            }
            Err(error) => {
                tracing::debug!(patient_id = %permit.patient_id(), %error, "batch failed");
                let message = error.to_string();
                for event in batch {
                    self.record_failure(event, &message, &mut report)?;
                }
                Ok((report, true))
            }
        }
    }

    fn record_failure(
        &self,
        event: &Event,
        error: &str,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let failed_attempts = event.sync.attempts + 1;
        let next_attempt_at = self
            .config
            .retry
            .next_attempt(self.store.clock().now(), failed_attempts);

        if !self
            .store
            .record_transient_failure(&event.id, error, next_attempt_at)?
        {
            return Ok(());
        }

        if next_attempt_at.is_some() {
            report.transient_failures += 1;
        } else {
            report.stalled += 1;
            tracing::warn!(event_id = %event.id, failed_attempts, error, "sync retries exhausted");
            self.notices.dispatch(SyncNotice::RetriesExhausted {
                event_id: event.id,
                last_error: error.to_string(),
            });
        }
        Ok(())
    }

    /// Runs until `shutdown` resolves.
    ///
    /// Waits for the gate to open, then flushes whenever an event is
    /// appended, a retry falls due, or [`SyncEngine::wake`] is called.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<(), SyncError> {
        tokio::pin!(shutdown);
        let mut appends = self.store.subscribe_appends();

        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            _ = self.gate.wait_until_approved() => {}
        }
        tracing::info!(patient_id = %self.gate.patient_id(), "sync gate open, flushing queue");

        loop {
            appends.borrow_and_update();
            self.sync_once().await?;

            let delay = self.until_next_retry()?;
            tokio::select! {
                _ = &mut shutdown => return Ok(()),
                changed = appends.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                }
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn until_next_retry(&self) -> Result<Duration, SyncError> {
        let due = self.store.next_attempt_due(self.gate.patient_id())?;
        Ok(match due {
            Some(at) => Duration::try_from(at - self.store.clock().now()).unwrap_or_default(),
            None => IDLE_WAIT,
        })
    }
}
