// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Common Test Utilities
//!
//! In-memory relay state on a fixed clock.

#![allow(dead_code)]

use std::sync::Arc;

use time::macros::datetime;
use time::OffsetDateTime;
use trialsync_core::temporal::FixedClock;
use trialsync_relay::audit::{AuditStore, MemoryAuditStore};
use trialsync_relay::binder::DeviceBinder;
use trialsync_relay::config::{RelayConfig, StorageBackend};
use trialsync_relay::db::RelayDb;
use trialsync_relay::http::HttpState;
use trialsync_relay::tokens::TokenRegistry;

pub const PATIENT: &str = "patient-001";
pub const DEVICE: &str = "device-aaa";
pub const OTHER_DEVICE: &str = "device-bbb";
pub const ADMIN_TOKEN: &str = "admin-secret";

pub const NOW: OffsetDateTime = datetime!(2026-01-05 18:00 UTC);

pub fn test_clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(NOW))
}

pub fn memory_config() -> RelayConfig {
    RelayConfig {
        storage_backend: StorageBackend::Memory,
        admin_token: Some(ADMIN_TOKEN.into()),
        ..RelayConfig::default()
    }
}

/// Relay state over in-memory stores.
pub fn test_state(clock: Arc<FixedClock>) -> HttpState {
    trialsync_relay::build_state(&memory_config(), clock).unwrap()
}

pub struct BinderFixture {
    pub binder: DeviceBinder,
    pub audit: Arc<MemoryAuditStore>,
    pub clock: Arc<FixedClock>,
}

pub fn binder_fixture() -> BinderFixture {
    let db = Arc::new(RelayDb::in_memory().unwrap());
    let audit = Arc::new(MemoryAuditStore::new());
    let clock = test_clock();
    let binder = DeviceBinder::new(
        db.clone(),
        TokenRegistry::new(db),
        audit.clone() as Arc<dyn AuditStore>,
        clock.clone(),
    );
    BinderFixture {
        binder,
        audit,
        clock,
    }
}
