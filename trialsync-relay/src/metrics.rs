// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Prometheus Metrics

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Relay metrics. Clones share the same counters.
#[derive(Clone)]
pub struct RelayMetrics {
    registry: Registry,
    /// Upload requests, labelled by outcome.
    pub sync_batches: IntCounterVec,
    /// Events acknowledged, re-sends included.
    pub events_acknowledged: IntCounter,
    /// Re-sent events that were already stored.
    pub events_duplicate: IntCounter,
    /// Requests refused for a device id mismatch.
    pub device_mismatches: IntCounter,
    /// Requests presenting a revoked or unknown token.
    pub revoked_token_uses: IntCounter,
    /// Device requests without a bearer token. Not audited.
    pub missing_credentials: IntCounter,
    pub sessions_issued: IntCounter,
    pub login_failures: IntCounter,
    /// Events stored centrally.
    pub events_stored: IntGauge,
    pub audit_entries: IntGauge,
}

impl RelayMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new_custom(Some("trialsync_relay".into()), None)?;

        let metrics = RelayMetrics {
            sync_batches: IntCounterVec::new(
                Opts::new("sync_batches_total", "Event upload requests by outcome"),
                &["outcome"],
            )?,
            events_acknowledged: IntCounter::new("events_acknowledged_total", "Events acknowledged")?,
            events_duplicate: IntCounter::new(
                "events_duplicate_total",
                "Re-sent events already stored",
            )?,
            device_mismatches: IntCounter::new("device_mismatches_total", "Device id mismatches")?,
            revoked_token_uses: IntCounter::new(
                "revoked_token_uses_total",
                "Requests with a revoked or unknown token",
            )?,
            missing_credentials: IntCounter::new(
                "missing_credentials_total",
                "Device requests without a bearer token",
            )?,
            sessions_issued: IntCounter::new("sessions_issued_total", "Tokens issued by login")?,
            login_failures: IntCounter::new("login_failures_total", "Failed logins")?,
            events_stored: IntGauge::new("events_stored", "Events stored centrally")?,
            audit_entries: IntGauge::new("audit_entries", "Audit log entries")?,
            registry,
        };

        metrics.registry.register(Box::new(metrics.sync_batches.clone()))?;
        metrics.registry.register(Box::new(metrics.events_acknowledged.clone()))?;
        metrics.registry.register(Box::new(metrics.events_duplicate.clone()))?;
        metrics.registry.register(Box::new(metrics.device_mismatches.clone()))?;
        metrics.registry.register(Box::new(metrics.revoked_token_uses.clone()))?;
        metrics.registry.register(Box::new(metrics.missing_credentials.clone()))?;
        metrics.registry.register(Box::new(metrics.sessions_issued.clone()))?;
        metrics.registry.register(Box::new(metrics.login_failures.clone()))?;
        metrics.registry.register(Box::new(metrics.events_stored.clone()))?;
        metrics.registry.register(Box::new(metrics.audit_entries.clone()))?;

        Ok(metrics)
    }

    /// Encodes all metrics in the Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = Vec::new();
        if let Err(e) = TextEncoder::new().encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_counters() {
        let metrics = RelayMetrics::new().unwrap();
        metrics.device_mismatches.inc();
        metrics.sync_batches.with_label_values(&["acknowledged"]).inc();

        let text = metrics.encode();
        assert!(text.contains("trialsync_relay_device_mismatches_total 1"));
        assert!(text.contains("outcome=\"acknowledged\""));
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = RelayMetrics::new().unwrap();
        let clone = metrics.clone();
        clone.events_acknowledged.inc_by(3);
        assert_eq!(metrics.events_acknowledged.get(), 3);
    }
}
