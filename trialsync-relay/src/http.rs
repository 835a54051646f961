// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTP Server
//!
//! Sync API, enrollment administration, health and metrics endpoints.
//! Error bodies are always an [`ErrorResponse`] code and never name the
//! bound device.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use trialsync_core::network::{
    EnrollRequest, EnrollmentStatus, ErrorCode, ErrorResponse, RejectionCode, SessionRequest,
    SessionResponse, SyncBatchRequest, SyncBatchResponse, DEVICE_ID_HEADER,
    ENROLLMENT_STATUS_PATH, SESSION_PATH, SYNC_PATH,
};
use trialsync_core::temporal::Clock;

use crate::binder::{BinderError, DeviceBinder, VerifyOutcome};
use crate::credentials::CredentialStore;
use crate::db::RelayDb;
use crate::ingest::{IngestOutcome, IngestStore};
use crate::metrics::RelayMetrics;

/// Shared state for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub metrics: RelayMetrics,
    pub db: Arc<RelayDb>,
    pub binder: Arc<DeviceBinder>,
    pub credentials: CredentialStore,
    pub ingest: IngestStore,
    pub clock: Arc<dyn Clock>,
    pub start_time: Instant,
    pub metrics_token: Option<String>,
    pub admin_token: Option<String>,
    pub max_batch: usize,
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
    pub storage_ok: bool,
    pub events_stored: usize,
}

/// Creates the HTTP router.
pub fn create_router(state: HttpState) -> Router {
    Router::new()
        .route(SYNC_PATH, post(sync_handler))
        .route(SESSION_PATH, post(session_handler))
        .route(ENROLLMENT_STATUS_PATH, get(enrollment_status_handler))
        .route("/v1/enrollments", post(enroll_handler))
        .route("/v1/enrollments/:patient_id/approve", post(approve_handler))
        .route("/v1/tokens/:token_id/revoke", post(revoke_handler))
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/", get(root_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            metrics_auth_middleware,
        ))
        .with_state(state)
}

fn error_response(status: StatusCode, code: ErrorCode) -> Response {
    (status, Json(ErrorResponse { code })).into_response()
}

fn rejection_response(code: RejectionCode) -> Response {
    let status = StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::FORBIDDEN);
    error_response(status, code.into())
}

fn internal_error(context: &str, error: impl std::fmt::Display) -> Response {
    tracing::error!("{}: {}", context, error);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Internal)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
}

fn device_id(headers: &HeaderMap) -> &str {
    headers
        .get(DEVICE_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("")
}

fn is_admin(state: &HttpState, headers: &HeaderMap) -> bool {
    match (&state.admin_token, bearer_token(headers)) {
        (Some(expected), Some(presented)) => expected == presented,
        _ => false,
    }
}

/// Verifies token and device of a device-facing request.
///
/// A request without a bearer token is refused as `TOKEN_REVOKED` and
/// counted, but not audited: there is no token to attribute it to. A missing
/// device header is verified as empty and refused like any other mismatch.
fn verify_request(state: &HttpState, headers: &HeaderMap) -> Result<String, Response> {
    let Some(token) = bearer_token(headers).filter(|t| !t.is_empty()) else {
        state.metrics.missing_credentials.inc();
        return Err(rejection_response(RejectionCode::TokenRevoked));
    };
    match state.binder.verify(token, device_id(headers)) {
        Ok(VerifyOutcome::Verified { patient_id }) => Ok(patient_id),
        Ok(VerifyOutcome::DeviceMismatch) => {
            state.metrics.device_mismatches.inc();
            Err(rejection_response(RejectionCode::DeviceMismatch))
        }
        Ok(VerifyOutcome::TokenRevoked) => {
            state.metrics.revoked_token_uses.inc();
            Err(rejection_response(RejectionCode::TokenRevoked))
        }
        Err(e) => Err(internal_error("verification failed", e)),
    }
}

/// Middleware to check bearer token for metrics endpoint.
async fn metrics_auth_middleware(
    State(state): State<HttpState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/metrics" {
        if let Some(ref expected_token) = state.metrics_token {
            let is_authorized =
                bearer_token(request.headers()).is_some_and(|token| token == expected_token);

            if !is_authorized {
                return (
                    StatusCode::UNAUTHORIZED,
                    [(header::WWW_AUTHENTICATE, "Bearer")],
                    "Unauthorized",
                )
                    .into_response();
            }
        }
    }

    next.run(request).await
}

/// Batch upload. The device is verified before the body is looked at.
async fn sync_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let patient_id = match verify_request(&state, &headers) {
        Ok(patient_id) => patient_id,
        Err(response) => {
            state
                .metrics
                .sync_batches
                .with_label_values(&["rejected"])
                .inc();
            return response;
        }
    };

    let Ok(batch) = serde_json::from_slice::<SyncBatchRequest>(&body) else {
        state.metrics.sync_batches.with_label_values(&["invalid"]).inc();
        return error_response(StatusCode::BAD_REQUEST, ErrorCode::InvalidBatch);
    };

    if batch.events.len() > state.max_batch {
        state.metrics.sync_batches.with_label_values(&["invalid"]).inc();
        return error_response(StatusCode::PAYLOAD_TOO_LARGE, ErrorCode::BatchTooLarge);
    }

    let presented_device = device_id(&headers);
    let foreign = batch
        .events
        .iter()
        .any(|e| e.patient_id != patient_id || e.device_id != presented_device);
    if foreign {
        tracing::warn!(
            patient_id = %patient_id,
            "batch contains events of another patient or device"
        );
        state.metrics.sync_batches.with_label_values(&["invalid"]).inc();
        return error_response(StatusCode::BAD_REQUEST, ErrorCode::InvalidBatch);
    }

    let outcomes = match state.ingest.ingest(&batch.events, state.clock.now()) {
        Ok(outcomes) => outcomes,
        Err(e) => return internal_error("ingest failed", e),
    };

    let duplicates = outcomes
        .iter()
        .filter(|o| **o == IngestOutcome::Duplicate)
        .count();
    state
        .metrics
        .events_acknowledged
        .inc_by(outcomes.len() as u64);
    state.metrics.events_duplicate.inc_by(duplicates as u64);
    state
        .metrics
        .sync_batches
        .with_label_values(&["acknowledged"])
        .inc();
    tracing::debug!(
        patient_id = %patient_id,
        events = outcomes.len(),
        duplicates,
        "batch acknowledged"
    );

    Json(SyncBatchResponse::acknowledge_all(&batch)).into_response()
}

/// Password login for an enrolled patient.
async fn session_handler(
    State(state): State<HttpState>,
    Json(request): Json<SessionRequest>,
) -> Response {
    let credentials = state.credentials.clone();
    let user_id = request.user_id.clone();
    let verified = tokio::task::spawn_blocking(move || {
        credentials.verify(&request.user_id, &request.password)
    })
    .await;

    match verified {
        Ok(Ok(true)) => {}
        Ok(Ok(false)) => {
            state.metrics.login_failures.inc();
            return error_response(StatusCode::UNAUTHORIZED, ErrorCode::InvalidCredentials);
        }
        Ok(Err(e)) => return internal_error("credential lookup failed", e),
        Err(e) => return internal_error("credential task failed", e),
    }

    match state.binder.issue_token(&user_id) {
        Ok(token) => {
            state.metrics.sessions_issued.inc();
            Json(SessionResponse { token }).into_response()
        }
        Err(BinderError::NotEnrolled) => {
            state.metrics.login_failures.inc();
            error_response(StatusCode::UNAUTHORIZED, ErrorCode::InvalidCredentials)
        }
        Err(e) => internal_error("token issue failed", e),
    }
}

/// The verified caller's enrollment, including the study start approval.
async fn enrollment_status_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Response {
    let patient_id = match verify_request(&state, &headers) {
        Ok(patient_id) => patient_id,
        Err(response) => return response,
    };

    match state.binder.binding(&patient_id) {
        Ok(Some(binding)) => Json(EnrollmentStatus {
            patient_id,
            study_start_approved_at: binding.study_start_approved_at,
        })
        .into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, ErrorCode::NotFound),
        Err(e) => internal_error("enrollment lookup failed", e),
    }
}

/// Binds a device and sets the patient's password. Admin only.
async fn enroll_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Json(request): Json<EnrollRequest>,
) -> Response {
    if !is_admin(&state, &headers) {
        return error_response(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized);
    }
    if request.patient_id.is_empty() || request.device_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, ErrorCode::InvalidBatch);
    }

    let binding = match state.binder.bind(&request.patient_id, &request.device_id) {
        Ok(binding) => binding,
        Err(BinderError::EnrollmentConflict) => {
            return error_response(StatusCode::CONFLICT, ErrorCode::EnrollmentConflict)
        }
        Err(e) => return internal_error("bind failed", e),
    };

    let credentials = state.credentials.clone();
    let now = state.clock.now();
    let registered = tokio::task::spawn_blocking(move || {
        credentials.register(&request.patient_id, &request.password, now)
    })
    .await;

    match registered {
        Ok(Ok(_)) => Json(SessionResponse {
            token: binding.token_id,
        })
        .into_response(),
        Ok(Err(e)) => internal_error("credential registration failed", e),
        Err(e) => internal_error("credential task failed", e),
    }
}

/// Records the study start approval. Admin only.
async fn approve_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Path(patient_id): Path<String>,
) -> Response {
    if !is_admin(&state, &headers) {
        return error_response(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized);
    }

    match state
        .binder
        .approve_study_start(&patient_id, state.clock.now())
    {
        Ok(binding) => Json(EnrollmentStatus {
            patient_id,
            study_start_approved_at: binding.study_start_approved_at,
        })
        .into_response(),
        Err(BinderError::NotEnrolled) => error_response(StatusCode::NOT_FOUND, ErrorCode::NotFound),
        Err(e) => internal_error("approval failed", e),
    }
}

/// Permanently revokes a token. Admin only.
async fn revoke_handler(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Path(token_id): Path<String>,
) -> Response {
    if !is_admin(&state, &headers) {
        return error_response(StatusCode::UNAUTHORIZED, ErrorCode::Unauthorized);
    }

    match state.binder.revoke_token(&token_id) {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => error_response(StatusCode::NOT_FOUND, ErrorCode::NotFound),
        Err(e) => internal_error("revocation failed", e),
    }
}

/// Root handler - returns basic info.
async fn root_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "trialsync-relay",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [SYNC_PATH, SESSION_PATH, ENROLLMENT_STATUS_PATH, "/health", "/ready", "/metrics"]
    }))
}

/// Health check endpoint - always returns 200 if server is running.
async fn health_handler(State(state): State<HttpState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

/// Readiness check endpoint - returns 200 if the database answers.
async fn ready_handler(State(state): State<HttpState>) -> Response {
    let storage_ok = state.db.is_healthy();
    let events_stored = state.ingest.count().unwrap_or(0);

    let response = ReadyResponse {
        ready: storage_ok,
        storage_ok,
        events_stored,
    };

    if storage_ok {
        (StatusCode::OK, Json(response)).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response)).into_response()
    }
}

/// Prometheus metrics endpoint.
async fn metrics_handler(State(state): State<HttpState>) -> impl IntoResponse {
    if let Ok(count) = state.ingest.count() {
        state.metrics.events_stored.set(count as i64);
    }
    state
        .metrics
        .audit_entries
        .set(state.binder.audit().count() as i64);

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        state.metrics.encode(),
    )
}
