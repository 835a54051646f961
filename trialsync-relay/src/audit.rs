// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Audit Log
//!
//! Append-only record of refused sync requests. Entries hold the expected
//! device id and are never exposed through the HTTP surface.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::Serialize;
use time::OffsetDateTime;
use trialsync_core::storage::migration::{Migration, MigrationAction, MigrationRunner};

use crate::config::StorageBackend;
use crate::db::to_instant;
use crate::error::RelayError;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditKind {
    DeviceMismatch,
    TokenRevoked,
}

impl AuditKind {
    fn as_str(&self) -> &'static str {
        match self {
            AuditKind::DeviceMismatch => "DEVICE_MISMATCH",
            AuditKind::TokenRevoked => "TOKEN_REVOKED",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "DEVICE_MISMATCH" => Some(AuditKind::DeviceMismatch),
            "TOKEN_REVOKED" => Some(AuditKind::TokenRevoked),
            _ => None,
        }
    }
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub kind: AuditKind,
    pub token_id: String,
    pub presented_device_id: String,
    /// Bound device of the patient, when the token resolved to one.
    pub expected_device_id: Option<String>,
    pub patient_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

/// Trait for audit log backends.
pub trait AuditStore: Send + Sync {
    /// Durably appends an entry. Entries are never updated or removed.
    fn append(&self, record: &AuditRecord) -> Result<(), RelayError>;

    /// All entries in append order.
    fn records(&self) -> Result<Vec<AuditRecord>, RelayError>;

    fn count(&self) -> usize;
}

/// Audit log kept in memory.
#[derive(Default)]
pub struct MemoryAuditStore {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditStore for MemoryAuditStore {
    fn append(&self, record: &AuditRecord) -> Result<(), RelayError> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    fn records(&self) -> Result<Vec<AuditRecord>, RelayError> {
        Ok(self.records.lock().clone())
    }

    fn count(&self) -> usize {
        self.records.lock().len()
    }
}

/// Audit log in its own SQLite file.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn in_memory() -> Result<Self, RelayError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, RelayError> {
        MigrationRunner::run(&conn, &audit_migrations())?;
        Ok(SqliteAuditStore {
            conn: Mutex::new(conn),
        })
    }
}

impl AuditStore for SqliteAuditStore {
    fn append(&self, record: &AuditRecord) -> Result<(), RelayError> {
        self.conn.lock().execute(
            "INSERT INTO audit_log
                (kind, token_id, presented_device_id, expected_device_id, patient_id, at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.kind.as_str(),
                record.token_id,
                record.presented_device_id,
                record.expected_device_id,
                record.patient_id,
                record.at.unix_timestamp(),
            ],
        )?;
        Ok(())
    }

    fn records(&self) -> Result<Vec<AuditRecord>, RelayError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT kind, token_id, presented_device_id, expected_device_id, patient_id, at
             FROM audit_log ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (kind, token_id, presented_device_id, expected_device_id, patient_id, at) = row?;
            let kind = AuditKind::parse(&kind)
                .ok_or_else(|| RelayError::Corrupt(format!("audit kind {kind}")))?;
            records.push(AuditRecord {
                kind,
                token_id,
                presented_device_id,
                expected_device_id,
                patient_id,
                at: to_instant(at)?,
            });
        }
        Ok(records)
    }

    fn count(&self) -> usize {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .unwrap_or(0)
    }
}

/// Creates the audit store for the configured backend.
pub fn create_audit_store(
    backend: StorageBackend,
    data_dir: &Path,
) -> Result<Box<dyn AuditStore>, RelayError> {
    match backend {
        StorageBackend::Memory => Ok(Box::new(MemoryAuditStore::new())),
        StorageBackend::Sqlite => Ok(Box::new(SqliteAuditStore::open(
            data_dir.join("audit.db"),
        )?)),
    }
}

fn audit_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        name: "audit_log",
        action: MigrationAction::Sql(MIGRATION_V1_AUDIT_LOG),
    }]
}

const MIGRATION_V1_AUDIT_LOG: &str = "
    CREATE TABLE IF NOT EXISTS audit_log (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        kind TEXT NOT NULL,
        token_id TEXT NOT NULL,
        presented_device_id TEXT NOT NULL,
        expected_device_id TEXT,
        patient_id TEXT,
        at INTEGER NOT NULL
    );

    CREATE TRIGGER IF NOT EXISTS audit_log_no_update BEFORE UPDATE ON audit_log
    BEGIN
        SELECT RAISE(ABORT, 'audit log is append-only');
    END;

    CREATE TRIGGER IF NOT EXISTS audit_log_no_delete BEFORE DELETE ON audit_log
    BEGIN
        SELECT RAISE(ABORT, 'audit log is append-only');
    END;
";
