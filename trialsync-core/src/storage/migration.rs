// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Database Schema Migration Framework
//!
//! Versioned schema migrations with transactional safety. Each migration has
//! a version number, a name, and either SQL or a Rust callback. The runner
//! tracks applied versions in a `schema_version` table and runs pending
//! migrations in order within a single transaction.

use rusqlite::Connection;
use time::OffsetDateTime;

use super::StorageError;

/// A single schema migration step.
pub struct Migration {
    /// Monotonically increasing version number (starting at 1).
    pub version: u32,
    /// Human-readable name for this migration.
    pub name: &'static str,
    /// The migration action: either SQL or a Rust callback.
    pub action: MigrationAction,
}

/// The action a migration performs.
pub enum MigrationAction {
    /// Pure SQL migration.
    Sql(&'static str),
    /// Rust callback migration, for data transformations SQL cannot express.
    Callback(fn(&Connection) -> Result<(), StorageError>),
}

/// Runs schema migrations against a database connection.
pub struct MigrationRunner;

impl MigrationRunner {
    /// Runs all pending migrations in a transaction.
    ///
    /// Creates the `schema_version` table if it doesn't exist, then applies
    /// any migrations whose version is greater than the current schema version.
    /// If any migration fails, all changes are rolled back.
    pub fn run(conn: &Connection, migrations: &[Migration]) -> Result<(), StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );",
        )?;

        let current_version = Self::current_version(conn)?;

        let pending: Vec<&Migration> = migrations
            .iter()
            .filter(|m| m.version > current_version)
            .collect();

        if pending.is_empty() {
            return Ok(());
        }

        for window in pending.windows(2) {
            if window[0].version >= window[1].version {
                return Err(StorageError::Migration(format!(
                    "Migrations are not in order: v{} before v{}",
                    window[0].version, window[1].version
                )));
            }
        }

        conn.execute_batch("BEGIN EXCLUSIVE TRANSACTION;")?;

        for migration in &pending {
            let outcome = match &migration.action {
                MigrationAction::Sql(sql) => conn
                    .execute_batch(sql)
                    .map_err(|e| format!("Migration v{} '{}' failed: {}", migration.version, migration.name, e)),
                MigrationAction::Callback(cb) => cb(conn).map_err(|e| {
                    format!(
                        "Migration v{} '{}' callback failed: {}",
                        migration.version, migration.name, e
                    )
                }),
            };

            if let Err(message) = outcome {
                conn.execute_batch("ROLLBACK;")?;
                return Err(StorageError::Migration(message));
            }

            let now = OffsetDateTime::now_utc().unix_timestamp();
            if let Err(e) = conn.execute(
                "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![migration.version, now],
            ) {
                conn.execute_batch("ROLLBACK;")?;
                return Err(StorageError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e
                )));
            }
        }

        conn.execute_batch("COMMIT;")?;
        Ok(())
    }

    /// Returns the current schema version, or 0 if no migrations have been applied.
    pub fn current_version(conn: &Connection) -> Result<u32, StorageError> {
        let table_exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )?;

        if !table_exists {
            return Ok(0);
        }

        let version: Option<u32> =
            conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
                row.get(0)
            })?;

        Ok(version.unwrap_or(0))
    }
}

/// Returns all registered migrations in version order.
///
/// This is the single source of truth for the database schema.
/// New migrations are appended to the end of this list.
pub fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "event_log",
            action: MigrationAction::Sql(MIGRATION_V1_EVENT_LOG),
        },
        Migration {
            version: 2,
            name: "sync_gate",
            action: MigrationAction::Sql(MIGRATION_V2_SYNC_GATE),
        },
    ]
}

/// Migration v1: append-only event log and its sync bookkeeping.
const MIGRATION_V1_EVENT_LOG: &str = "
    CREATE TABLE IF NOT EXISTS events (
        sequence INTEGER PRIMARY KEY,
        id TEXT NOT NULL UNIQUE,
        patient_id TEXT NOT NULL,
        device_id TEXT NOT NULL,
        event_type TEXT NOT NULL,
        start_at INTEGER NOT NULL,
        end_at INTEGER,
        utc_offset INTEGER NOT NULL,
        local_date TEXT NOT NULL,
        severity INTEGER CHECK (severity IS NULL OR severity BETWEEN 1 AND 6),
        notes TEXT,
        supersedes TEXT REFERENCES events(id),
        recorded_at INTEGER NOT NULL,
        duration_minutes INTEGER CHECK (duration_minutes IS NULL OR duration_minutes > 0),
        CHECK (end_at IS NULL OR end_at > start_at),
        CHECK (supersedes IS NULL OR supersedes <> id)
    );

    CREATE INDEX IF NOT EXISTS idx_events_patient_day ON events(patient_id, local_date);
    CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_at, sequence);
    CREATE INDEX IF NOT EXISTS idx_events_patient_start ON events(patient_id, start_at);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_events_supersedes ON events(supersedes)
        WHERE supersedes IS NOT NULL;

    CREATE TRIGGER IF NOT EXISTS events_no_update BEFORE UPDATE ON events
    BEGIN
        SELECT RAISE(ABORT, 'events are append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS events_no_delete BEFORE DELETE ON events
    BEGIN
        SELECT RAISE(ABORT, 'events are append-only');
    END;

    CREATE TABLE IF NOT EXISTS event_sync (
        event_id TEXT PRIMARY KEY REFERENCES events(id),
        status TEXT NOT NULL DEFAULT 'pending',
        attempts INTEGER NOT NULL DEFAULT 0,
        last_attempt_at INTEGER,
        last_error TEXT,
        next_attempt_at INTEGER,
        stalled INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_event_sync_status ON event_sync(status, stalled, next_attempt_at);
";

/// Migration v2: per-patient sync gate.
const MIGRATION_V2_SYNC_GATE: &str = "
    CREATE TABLE IF NOT EXISTS sync_gate (
        patient_id TEXT PRIMARY KEY,
        state TEXT NOT NULL,
        questionnaire_submitted_at INTEGER,
        approved_at INTEGER,
        updated_at INTEGER NOT NULL
    );
";
