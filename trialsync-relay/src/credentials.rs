// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Credential Store
//!
//! Server-side password credentials, hashed with the same Argon2id
//! parameter set as the devices.

use std::sync::Arc;

use rusqlite::{params, OptionalExtension};
use time::OffsetDateTime;
use trialsync_core::crypto::{self, Credential, CredentialError};

use crate::db::RelayDb;
use crate::error::RelayError;

#[derive(Clone)]
pub struct CredentialStore {
    db: Arc<RelayDb>,
}

impl CredentialStore {
    pub fn new(db: Arc<RelayDb>) -> Self {
        CredentialStore { db }
    }

    /// Hashes `password` under a fresh salt and stores it for `user_id`,
    /// replacing any previous credential.
    pub fn register(
        &self,
        user_id: &str,
        password: &str,
        at: OffsetDateTime,
    ) -> Result<Credential, CredentialStoreError> {
        let credential = Credential::create(user_id, password)?;
        self.put(&credential, at)?;
        Ok(credential)
    }

    pub fn put(&self, credential: &Credential, at: OffsetDateTime) -> Result<(), RelayError> {
        self.db.conn().execute(
            "INSERT INTO credentials (user_id, salt, hash, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                salt = excluded.salt, hash = excluded.hash, updated_at = excluded.updated_at",
            params![
                credential.user_id,
                credential.salt,
                credential.hash,
                at.unix_timestamp()
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, user_id: &str) -> Result<Option<Credential>, RelayError> {
        let row = self
            .db
            .conn()
            .query_row(
                "SELECT salt, hash FROM credentials WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        Ok(row.map(|(salt, hash)| Credential {
            user_id: user_id.to_string(),
            salt,
            hash,
        }))
    }

    /// Checks `password` for `user_id`. Unknown users still pay for one
    /// derivation so timing does not reveal which ids exist.
    pub fn verify(&self, user_id: &str, password: &str) -> Result<bool, RelayError> {
        match self.get(user_id)? {
            Some(credential) => Ok(credential.verify(password)),
            None => {
                let salt = crypto::generate_salt();
                let _ = crypto::hash(password, &salt);
                Ok(false)
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialStoreError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Storage(#[from] RelayError),
}
