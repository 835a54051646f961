// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Persistent Storage Module
//!
//! Local SQLite store for captured events, their sync bookkeeping and the
//! per-patient sync gate. Event rows are append-only: triggers abort any
//! UPDATE or DELETE against them.

mod error;
mod events;
mod gate;
pub mod migration;
mod sync_records;

pub use error::StorageError;
pub use events::{NewEvent, QueryCursor};
pub use gate::GateRow;

use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;

/// Storage shared by the event store, the sync gate and the sync engine of
/// one device. The lock is the single-writer discipline for the log.
pub type SharedStorage = Arc<Mutex<Storage>>;

/// SQLite-based storage implementation.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Opens or creates a storage database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let storage = Storage { conn };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Creates an in-memory storage (for testing).
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        let storage = Storage { conn };
        storage.run_migrations()?;
        Ok(storage)
    }

    /// Wraps the storage for sharing between components.
    pub fn shared(self) -> SharedStorage {
        Arc::new(Mutex::new(self))
    }

    /// Runs all pending schema migrations.
    fn run_migrations(&self) -> Result<(), StorageError> {
        let migrations = migration::all_migrations();
        migration::MigrationRunner::run(&self.conn, &migrations)
    }

    /// Runs `f` inside an immediate write transaction.
    ///
    /// The write lock is taken before `f` reads anything, so a check and the
    /// insert that depends on it commit as one unit. Any error rolls back.
    pub fn write_transaction<T, E>(
        &self,
        f: impl FnOnce(&Storage) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<StorageError>,
    {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        let value = f(self)?;
        tx.commit().map_err(StorageError::from)?;
        Ok(value)
    }

    /// Returns the current schema version.
    pub fn schema_version(&self) -> Result<u32, StorageError> {
        migration::MigrationRunner::current_version(&self.conn)
    }
}
