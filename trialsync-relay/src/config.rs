// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Configuration
//!
//! Read from `TRIALSYNC_*` environment variables with defaults.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Where relay state is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Lost on restart; for tests and demos.
    Memory,
    /// SQLite files under `data_dir`.
    Sqlite,
}

impl StorageBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Some(StorageBackend::Memory),
            "sqlite" => Some(StorageBackend::Sqlite),
            _ => None,
        }
    }
}

/// Relay server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub storage_backend: StorageBackend,
    /// Bearer token required by `/metrics`; open when unset.
    pub metrics_token: Option<String>,
    /// Bearer token of the enrollment and revocation endpoints; those
    /// endpoints refuse every request when unset.
    pub admin_token: Option<String>,
    /// Maximum events per upload.
    pub max_batch: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            data_dir: PathBuf::from("./data"),
            storage_backend: StorageBackend::Sqlite,
            metrics_token: None,
            admin_token: None,
            max_batch: 500,
        }
    }
}

impl RelayConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = RelayConfig::default();

        let listen_addr = lookup("TRIALSYNC_LISTEN_ADDR")
            .and_then(|v| parse_or_warn("TRIALSYNC_LISTEN_ADDR", &v, |v| v.parse().ok()))
            .unwrap_or(defaults.listen_addr);
        let data_dir = lookup("TRIALSYNC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let storage_backend = lookup("TRIALSYNC_STORAGE")
            .and_then(|v| parse_or_warn("TRIALSYNC_STORAGE", &v, StorageBackend::parse))
            .unwrap_or(defaults.storage_backend);
        let max_batch = lookup("TRIALSYNC_MAX_BATCH")
            .and_then(|v| {
                parse_or_warn("TRIALSYNC_MAX_BATCH", &v, |v| {
                    v.parse::<usize>().ok().filter(|n| *n > 0)
                })
            })
            .unwrap_or(defaults.max_batch);

        RelayConfig {
            listen_addr,
            data_dir,
            storage_backend,
            metrics_token: lookup("TRIALSYNC_METRICS_TOKEN").filter(|t| !t.is_empty()),
            admin_token: lookup("TRIALSYNC_ADMIN_TOKEN").filter(|t| !t.is_empty()),
            max_batch,
        }
    }
}

fn parse_or_warn<T>(key: &str, value: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let parsed = parse(value);
    if parsed.is_none() {
        tracing::warn!(key, value, "ignoring invalid configuration value");
    }
    parsed
}
