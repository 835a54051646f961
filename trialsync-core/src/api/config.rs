// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Sync Configuration

use std::time::Duration;

use crate::sync::RetryPolicy;

/// Default number of events per upload batch.
pub const DEFAULT_BATCH_SIZE: usize = 50;

/// Configuration of the device-side sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Base URL of the central sync endpoint.
    pub endpoint_url: String,
    /// Timeout of one HTTP request in milliseconds.
    pub request_timeout_ms: u64,
    /// Maximum number of events per upload.
    pub batch_size: usize,
    /// Backoff for transient failures.
    pub retry: RetryPolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            endpoint_url: "https://localhost:8080".to_string(),
            request_timeout_ms: 30_000,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl SyncConfig {
    /// Creates a config pointing at the given endpoint.
    pub fn new(endpoint_url: impl Into<String>) -> Self {
        SyncConfig {
            endpoint_url: endpoint_url.into(),
            ..Self::default()
        }
    }

    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    /// Sets the batch size; zero is raised to one.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_overrides_defaults() {
        let config = SyncConfig::new("https://sync.example.org")
            .with_batch_size(0)
            .with_request_timeout_ms(5_000);

        assert_eq!(config.endpoint_url, "https://sync.example.org");
        assert_eq!(config.batch_size, 1);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        assert_eq!(config.retry, RetryPolicy::default());
    }
}
