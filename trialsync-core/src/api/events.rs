// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Notices
//!
//! Callbacks for sync outcomes that an operator or the UI should see.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::event::EventId;
use crate::gate::GateState;
use crate::network::RejectionCode;

/// Notices emitted by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    /// The central endpoint acknowledged an event.
    EventSynced {
        /// The event ID.
        event_id: EventId,
    },

    /// An event was refused and will not be retried automatically.
    EventRejected {
        /// The event ID.
        event_id: EventId,
        /// Why it was refused; decides the recovery path.
        code: RejectionCode,
    },

    /// Transient failures used up the retry budget of an event.
    RetriesExhausted {
        /// The event ID.
        event_id: EventId,
        /// Last transport error.
        last_error: String,
    },

    /// The sync gate moved.
    GateChanged {
        /// The new gate state.
        state: GateState,
    },
}

/// Notice handler trait.
///
/// Implement this trait to receive sync notices.
pub trait NoticeHandler: Send + Sync {
    /// Called when a notice is emitted.
    fn on_notice(&self, notice: SyncNotice);
}

/// Simple callback-based notice handler.
pub struct CallbackHandler<F>
where
    F: Fn(SyncNotice) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackHandler<F>
where
    F: Fn(SyncNotice) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        CallbackHandler { callback }
    }
}

impl<F> NoticeHandler for CallbackHandler<F>
where
    F: Fn(SyncNotice) + Send + Sync,
{
    fn on_notice(&self, notice: SyncNotice) {
        (self.callback)(notice);
    }
}

/// Fans notices out to every registered handler.
///
/// Handlers can be added after the dispatcher is shared with the engine.
#[derive(Default)]
pub struct NoticeDispatcher {
    handlers: RwLock<Vec<Arc<dyn NoticeHandler>>>,
}

impl NoticeDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a notice handler.
    pub fn add_handler(&self, handler: Arc<dyn NoticeHandler>) {
        self.handlers.write().push(handler);
    }

    /// Removes all handlers.
    pub fn clear_handlers(&self) {
        self.handlers.write().clear();
    }

    /// Returns the number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Dispatches a notice to all handlers.
    pub fn dispatch(&self, notice: SyncNotice) {
        let handlers = self.handlers.read().clone();
        for handler in handlers {
            handler.on_notice(notice.clone());
        }
    }
}
