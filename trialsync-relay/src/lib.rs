// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! TrialSync Relay
//!
//! Central sync endpoint for patient devices:
//! - device binding at enrollment, re-verified on every sync request
//! - append-only audit log of refused requests
//! - idempotent event ingest keyed by event id
//! - study start approval read back by devices to open their sync gate
//! - health checks and Prometheus metrics

pub mod audit;
pub mod binder;
pub mod config;
pub mod credentials;
pub mod db;
pub mod error;
pub mod http;
pub mod ingest;
pub mod metrics;
pub mod tokens;

use std::sync::Arc;
use std::time::Instant;

use trialsync_core::temporal::Clock;

use audit::{create_audit_store, AuditStore};
use binder::DeviceBinder;
use config::{RelayConfig, StorageBackend};
use credentials::CredentialStore;
use db::RelayDb;
use error::RelayError;
use http::HttpState;
use ingest::IngestStore;
use metrics::RelayMetrics;
use tokens::TokenRegistry;

/// Opens the configured stores and wires them into the HTTP state.
pub fn build_state(config: &RelayConfig, clock: Arc<dyn Clock>) -> Result<HttpState, RelayError> {
    let db = Arc::new(match config.storage_backend {
        StorageBackend::Memory => RelayDb::in_memory()?,
        StorageBackend::Sqlite => {
            std::fs::create_dir_all(&config.data_dir)?;
            RelayDb::open(config.data_dir.join("relay.db"))?
        }
    });
    let audit: Arc<dyn AuditStore> =
        Arc::from(create_audit_store(config.storage_backend, &config.data_dir)?);
    let binder = DeviceBinder::new(
        db.clone(),
        TokenRegistry::new(db.clone()),
        audit,
        clock.clone(),
    );

    Ok(HttpState {
        metrics: RelayMetrics::new()?,
        db: db.clone(),
        binder: Arc::new(binder),
        credentials: CredentialStore::new(db.clone()),
        ingest: IngestStore::new(db),
        clock,
        start_time: Instant::now(),
        metrics_token: config.metrics_token.clone(),
        admin_token: config.admin_token.clone(),
        max_batch: config.max_batch,
    })
}
