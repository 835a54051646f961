// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! TrialSync API Layer
//!
//! High-level API for patient devices.
//!
//! # Example
//!
//! ```ignore
//! use trialsync_core::api::TrialSync;
//! use trialsync_core::event::Severity;
//!
//! let ts = TrialSync::open("trialsync.db", "patient-1", "device-1", Default::default())?;
//! let event = ts.record(
//!     ts.draft(start).with_end(end).with_severity(Severity::new(3)?),
//! )?;
//!
//! ts.submit_gating_questionnaire()?;
//! let engine = ts.http_sync_engine(token)?;
//! engine.run(shutdown).await?;
//! ```
//!
//! # Module Structure
//!
//! - [`error`] - Error types for the API layer
//! - [`config`] - Configuration types
//! - [`events`] - Sync notices for callbacks
//! - [`trialsync`] - Main orchestrator

pub mod config;
pub mod error;
pub mod events;
mod trialsync;

pub use config::SyncConfig;
pub use error::{TrialSyncError, TrialSyncResult};
pub use events::{CallbackHandler, NoticeDispatcher, NoticeHandler, SyncNotice};
pub use trialsync::TrialSync;
