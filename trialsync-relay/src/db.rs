// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Relay Database
//!
//! One SQLite database for credentials, tokens, enrollment bindings and
//! ingested events. The audit log lives in its own store.

use std::path::Path;

use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use time::OffsetDateTime;
use trialsync_core::storage::migration::{Migration, MigrationAction, MigrationRunner};

use crate::error::RelayError;

/// Serialized access to the relay database.
pub struct RelayDb {
    conn: Mutex<Connection>,
}

impl RelayDb {
    /// Opens or creates the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    /// Creates an in-memory database.
    pub fn in_memory() -> Result<Self, RelayError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, RelayError> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        MigrationRunner::run(&conn, &relay_migrations())?;
        Ok(RelayDb {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Cheap liveness probe for `/ready`.
    pub fn is_healthy(&self) -> bool {
        self.conn()
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

pub(crate) fn to_instant(unix: i64) -> Result<OffsetDateTime, RelayError> {
    OffsetDateTime::from_unix_timestamp(unix)
        .map_err(|e| RelayError::Corrupt(format!("timestamp {unix}: {e}")))
}

fn relay_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        name: "relay_state",
        action: MigrationAction::Sql(MIGRATION_V1_RELAY_STATE),
    }]
}

/// Migration v1: credentials, tokens, bindings and ingested events.
const MIGRATION_V1_RELAY_STATE: &str = "
    CREATE TABLE IF NOT EXISTS credentials (
        user_id TEXT PRIMARY KEY,
        salt TEXT NOT NULL,
        hash TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tokens (
        token_id TEXT PRIMARY KEY,
        patient_id TEXT NOT NULL,
        issued_at INTEGER NOT NULL,
        revoked_at INTEGER
    );

    CREATE INDEX IF NOT EXISTS idx_tokens_patient ON tokens(patient_id);

    CREATE TABLE IF NOT EXISTS bindings (
        patient_id TEXT PRIMARY KEY,
        device_id TEXT NOT NULL,
        token_id TEXT NOT NULL REFERENCES tokens(token_id),
        bound_at INTEGER NOT NULL,
        study_start_approved_at INTEGER
    );

    CREATE TRIGGER IF NOT EXISTS bindings_device_fixed BEFORE UPDATE OF device_id ON bindings
    BEGIN
        SELECT RAISE(ABORT, 'bound device is immutable');
    END;

    CREATE TABLE IF NOT EXISTS ingested_events (
        event_id TEXT PRIMARY KEY,
        patient_id TEXT NOT NULL,
        device_id TEXT NOT NULL,
        payload TEXT NOT NULL,
        received_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_ingested_patient ON ingested_events(patient_id);
";
