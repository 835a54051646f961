// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Wire Protocol
//!
//! JSON messages exchanged with the central sync endpoint. Shared by the
//! device client and the relay so both sides agree on every code.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::event::{Event, EventId, EventType, Severity};

/// Path of the batch upload endpoint.
pub const SYNC_PATH: &str = "/v1/events";
/// Path of the password login endpoint.
pub const SESSION_PATH: &str = "/v1/session";
/// Path of the caller's own enrollment status.
pub const ENROLLMENT_STATUS_PATH: &str = "/v1/enrollments/me";
/// Header carrying the presenting device's identifier.
pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// An event as transmitted to the central database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEvent {
    pub event_id: EventId,
    pub sequence: u64,
    pub patient_id: String,
    pub device_id: String,
    pub event_type: EventType,
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end: Option<OffsetDateTime>,
    #[serde(default)]
    pub severity: Option<Severity>,
    pub utc_offset_seconds: i32,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub supersedes: Option<EventId>,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: OffsetDateTime,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

impl From<&Event> for WireEvent {
    fn from(event: &Event) -> Self {
        WireEvent {
            event_id: event.id,
            sequence: event.sequence,
            patient_id: event.patient_id.clone(),
            device_id: event.device_id.clone(),
            event_type: event.event_type,
            start: event.start,
            end: event.end,
            severity: event.severity,
            utc_offset_seconds: event.utc_offset.whole_seconds(),
            notes: event.notes.clone(),
            supersedes: event.supersedes,
            recorded_at: event.recorded_at,
            duration_minutes: event.duration_minutes,
        }
    }
}

/// Body of `POST /v1/events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatchRequest {
    pub events: Vec<WireEvent>,
}

/// Per-event result inside a successful batch response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAckStatus {
    /// Stored centrally. Re-sent ids are acknowledged again.
    Acknowledged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResult {
    pub event_id: EventId,
    pub status: EventAckStatus,
}

/// Body of a 200 response to `POST /v1/events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBatchResponse {
    pub results: Vec<EventResult>,
}

impl SyncBatchResponse {
    /// Acknowledges every event of `request`.
    pub fn acknowledge_all(request: &SyncBatchRequest) -> Self {
        SyncBatchResponse {
            results: request
                .events
                .iter()
                .map(|event| EventResult {
                    event_id: event.event_id,
                    status: EventAckStatus::Acknowledged,
                })
                .collect(),
        }
    }
}

/// Security refusals. Each one calls for a different human recovery path:
/// re-binding the device, or re-authenticating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionCode {
    DeviceMismatch,
    TokenRevoked,
}

impl RejectionCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionCode::DeviceMismatch => "DEVICE_MISMATCH",
            RejectionCode::TokenRevoked => "TOKEN_REVOKED",
        }
    }

    /// HTTP status the code travels with.
    pub fn http_status(&self) -> u16 {
        match self {
            RejectionCode::DeviceMismatch => 403,
            RejectionCode::TokenRevoked => 401,
        }
    }
}

/// Machine-readable error codes of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DeviceMismatch,
    TokenRevoked,
    InvalidCredentials,
    InvalidBatch,
    BatchTooLarge,
    EnrollmentConflict,
    NotFound,
    Unauthorized,
    Internal,
}

impl From<RejectionCode> for ErrorCode {
    fn from(code: RejectionCode) -> Self {
        match code {
            RejectionCode::DeviceMismatch => ErrorCode::DeviceMismatch,
            RejectionCode::TokenRevoked => ErrorCode::TokenRevoked,
        }
    }
}

/// Body of every non-200 relay response. Carries a code and nothing that
/// identifies another party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
}

/// Body of `POST /v1/session`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRequest {
    pub user_id: String,
    pub password: String,
}

/// Token issued on enrollment or login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
}

/// Body of `POST /v1/enrollments`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollRequest {
    pub patient_id: String,
    pub device_id: String,
    pub password: String,
}

/// Body of `GET /v1/enrollments/me`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrollmentStatus {
    pub patient_id: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub study_start_approved_at: Option<OffsetDateTime>,
}
