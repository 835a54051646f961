// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! HTTPS transport to the relay.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use super::protocol::{
    EnrollmentStatus, ErrorCode, ErrorResponse, RejectionCode, SessionRequest, SessionResponse,
    SyncBatchRequest, SyncBatchResponse, DEVICE_ID_HEADER, ENROLLMENT_STATUS_PATH, SESSION_PATH,
    SYNC_PATH,
};
use super::transport::{SyncTransport, TransportError};
use crate::gate::EgressPermit;

/// Relay client authenticated by a bearer token and bound to one device id.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    token: String,
    device_id: String,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        device_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Protocol(format!("http client: {e}")))?;

        Ok(HttpTransport {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            device_id: device_id.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchanges a password for a new token.
    pub async fn login(
        base_url: &str,
        request: &SessionRequest,
        timeout: Duration,
    ) -> Result<SessionResponse, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Protocol(format!("http client: {e}")))?;
        let response = client
            .post(format!("{}{}", base_url.trim_end_matches('/'), SESSION_PATH))
            .json(request)
            .send()
            .await
            .map_err(transient)?;

        if response.status() == StatusCode::OK {
            response
                .json()
                .await
                .map_err(|e| TransportError::Protocol(e.to_string()))
        } else {
            Err(classify_failure(response).await)
        }
    }

    /// Reads this patient's enrollment, including the study start approval
    /// that opens the sync gate.
    pub async fn enrollment_status(&self) -> Result<EnrollmentStatus, TransportError> {
        let response = self
            .client
            .get(self.url(ENROLLMENT_STATUS_PATH))
            .bearer_auth(&self.token)
            .header(DEVICE_ID_HEADER, &self.device_id)
            .send()
            .await
            .map_err(transient)?;

        if response.status() == StatusCode::OK {
            response
                .json()
                .await
                .map_err(|e| TransportError::Protocol(e.to_string()))
        } else {
            Err(classify_failure(response).await)
        }
    }
}

impl SyncTransport for HttpTransport {
    async fn submit(
        &self,
        _permit: &EgressPermit,
        batch: &SyncBatchRequest,
    ) -> Result<SyncBatchResponse, TransportError> {
        let response = self
            .client
            .post(self.url(SYNC_PATH))
            .bearer_auth(&self.token)
            .header(DEVICE_ID_HEADER, &self.device_id)
            .json(batch)
            .send()
            .await
            .map_err(transient)?;

        if response.status() == StatusCode::OK {
            // A body lost after the relay committed is an ambiguous outcome;
            // the batch is re-sent and deduplicated by event id.
            response.json().await.map_err(transient)
        } else {
            Err(classify_failure(response).await)
        }
    }
}

fn transient(error: reqwest::Error) -> TransportError {
    TransportError::Transient(error.to_string())
}

/// Maps a non-200 response onto the client's recovery paths.
async fn classify_failure(response: Response) -> TransportError {
    let status = response.status();
    let code = response.json::<ErrorResponse>().await.ok().map(|body| body.code);

    match (status, code) {
        (StatusCode::FORBIDDEN, Some(ErrorCode::DeviceMismatch)) => {
            TransportError::Rejected(RejectionCode::DeviceMismatch)
        }
        (StatusCode::UNAUTHORIZED, Some(ErrorCode::InvalidCredentials)) => {
            TransportError::Protocol("invalid credentials".into())
        }
        (StatusCode::UNAUTHORIZED, _) => TransportError::Rejected(RejectionCode::TokenRevoked),
        (status, _)
            if status.is_server_error()
                || status == StatusCode::TOO_MANY_REQUESTS
                || status == StatusCode::REQUEST_TIMEOUT =>
        {
            TransportError::Transient(format!("relay returned {status}"))
        }
        (status, code) => TransportError::Protocol(format!("relay returned {status} ({code:?})")),
    }
}
