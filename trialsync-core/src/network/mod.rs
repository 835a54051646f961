// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Module
//!
//! Client side of the sync wire protocol.

#[cfg(feature = "network")]
mod http;
mod mock;
pub mod protocol;
mod transport;

#[cfg(feature = "network")]
pub use http::HttpTransport;
pub use mock::{MockReply, MockTransport};
pub use protocol::{
    EnrollRequest, EnrollmentStatus, ErrorCode, ErrorResponse, EventAckStatus, EventResult,
    RejectionCode, SessionRequest, SessionResponse, SyncBatchRequest, SyncBatchResponse,
    WireEvent, DEVICE_ID_HEADER, ENROLLMENT_STATUS_PATH, SESSION_PATH, SYNC_PATH,
};
pub use transport::{SyncTransport, TransportError};
