// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Module
//!
//! Delivery of pending events to the central endpoint once the sync gate
//! is approved.

mod engine;
mod retry;

pub use engine::{EngineStatus, SyncEngine, SyncReport};
pub use retry::RetryPolicy;

use thiserror::Error;

use crate::storage::StorageError;

/// Sync error types.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
