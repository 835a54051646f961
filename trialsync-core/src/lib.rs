// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! TrialSync Core Library
//!
//! Offline-first capture of clinical events on a patient device. Events are
//! kept in an append-only local log and leave the device only after the
//! study start has been approved.

pub mod api;
pub mod crypto;
pub mod event;
pub mod gate;
pub mod network;
pub mod storage;
pub mod store;
pub mod sync;
pub mod temporal;

pub use api::{
    CallbackHandler, NoticeDispatcher, NoticeHandler, SyncConfig, SyncNotice, TrialSync,
    TrialSyncError, TrialSyncResult,
};
pub use crypto::{Credential, CredentialError};
pub use event::{Event, EventDraft, EventId, EventType, Severity, SyncStatus, ValidationError};
pub use gate::{EgressPermit, GateError, GateState, SyncGate};
#[cfg(feature = "network")]
pub use network::HttpTransport;
pub use network::{MockReply, MockTransport, RejectionCode, SyncTransport, TransportError};
pub use storage::{Storage, StorageError};
pub use store::{AppendError, EventQuery, EventStore};
pub use sync::{EngineStatus, RetryPolicy, SyncEngine, SyncError, SyncReport};
pub use temporal::{Clock, FixedClock, Interval, SystemClock, TemporalError};
