// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Credential Hashing
//!
//! Argon2id password hashing shared bit-for-bit with every other service
//! that authenticates patients. The parameter set is fixed:
//! m=64MB, t=3, p=4, 32-byte output, Argon2 version 0x13.
//!
//! Passwords are hashed as their UTF-8 bytes. Salts travel as base64 and are
//! always decoded to raw bytes before use.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Decoded salt length in bytes.
pub const SALT_LEN: usize = 16;
/// Decoded hash length in bytes.
pub const HASH_LEN: usize = 32;

/// Argon2id memory cost in KiB (64 MB).
const ARGON2_M_COST: u32 = 65536;
/// Argon2id time cost (iterations).
const ARGON2_T_COST: u32 = 3;
/// Argon2id parallelism.
const ARGON2_P_COST: u32 = 4;

/// The parameter set every participating implementation must use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CredentialParams {
    pub algorithm: &'static str,
    pub version: u32,
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub output_len: usize,
}

pub const CREDENTIAL_PARAMS: CredentialParams = CredentialParams {
    algorithm: "argon2id",
    version: 0x13,
    memory_kib: ARGON2_M_COST,
    iterations: ARGON2_T_COST,
    parallelism: ARGON2_P_COST,
    output_len: HASH_LEN,
};

/// Credential error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("salt is not valid base64")]
    MalformedSalt,

    #[error("salt must decode to {SALT_LEN} bytes, got {0}")]
    SaltLength(usize),

    #[error("stored hash is corrupt")]
    CorruptHash,

    #[error("Key derivation failed: {0}")]
    DerivationFailed(String),
}

/// Generates 16 random bytes from the OS generator, base64-encoded.
pub fn generate_salt() -> String {
    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    STANDARD.encode(salt)
}

/// Decodes a base64 salt, insisting on exactly [`SALT_LEN`] bytes.
pub fn decode_salt(salt_b64: &str) -> Result<[u8; SALT_LEN], CredentialError> {
    let bytes = STANDARD
        .decode(salt_b64)
        .map_err(|_| CredentialError::MalformedSalt)?;
    <[u8; SALT_LEN]>::try_from(bytes.as_slice())
        .map_err(|_| CredentialError::SaltLength(bytes.len()))
}

/// Decodes a base64 hash, insisting on exactly [`HASH_LEN`] bytes.
pub fn decode_hash(hash_b64: &str) -> Result<[u8; HASH_LEN], CredentialError> {
    let bytes = STANDARD
        .decode(hash_b64)
        .map_err(|_| CredentialError::CorruptHash)?;
    <[u8; HASH_LEN]>::try_from(bytes.as_slice()).map_err(|_| CredentialError::CorruptHash)
}

/// Derives the base64 Argon2id hash of `password` under `salt_b64`.
pub fn hash(password: &str, salt_b64: &str) -> Result<String, CredentialError> {
    let salt = decode_salt(salt_b64)?;
    let mut derived = derive(password.as_bytes(), &salt)?;
    let encoded = STANDARD.encode(derived);
    derived.zeroize();
    Ok(encoded)
}

/// Recomputes the hash and compares it in constant time.
///
/// A malformed salt, or a stored hash that is not base64 or not
/// [`HASH_LEN`] bytes, is a failed verification rather than an error.
pub fn verify(password: &str, hash_b64: &str, salt_b64: &str) -> bool {
    let Ok(expected) = decode_hash(hash_b64) else {
        return false;
    };
    let Ok(salt) = decode_salt(salt_b64) else {
        return false;
    };
    let Ok(mut derived) = derive(password.as_bytes(), &salt) else {
        return false;
    };

    let matches: bool = derived.as_slice().ct_eq(expected.as_slice()).into();
    derived.zeroize();
    matches
}

fn derive(password: &[u8], salt: &[u8; SALT_LEN]) -> Result<[u8; HASH_LEN], CredentialError> {
    let params = argon2::Params::new(ARGON2_M_COST, ARGON2_T_COST, ARGON2_P_COST, Some(HASH_LEN))
        .map_err(|e| CredentialError::DerivationFailed(e.to_string()))?;

    let argon2 = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let mut output = [0u8; HASH_LEN];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CredentialError::DerivationFailed(e.to_string()))?;
    Ok(output)
}

/// A stored user credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub user_id: String,
    /// Base64 of [`SALT_LEN`] bytes.
    pub salt: String,
    /// Base64 of [`HASH_LEN`] bytes.
    pub hash: String,
}

impl Credential {
    /// Hashes `password` under a fresh salt.
    pub fn create(user_id: impl Into<String>, password: &str) -> Result<Self, CredentialError> {
        let salt = generate_salt();
        let hash = hash(password, &salt)?;
        Ok(Credential {
            user_id: user_id.into(),
            salt,
            hash,
        })
    }

    /// Rebuilds a credential read from the wire, rejecting salts and hashes
    /// that do not decode to their exact lengths.
    pub fn from_wire(
        user_id: impl Into<String>,
        salt: impl Into<String>,
        hash: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        let salt = salt.into();
        let hash = hash.into();
        decode_salt(&salt)?;
        decode_hash(&hash)?;
        Ok(Credential {
            user_id: user_id.into(),
            salt,
            hash,
        })
    }

    pub fn verify(&self, password: &str) -> bool {
        verify(password, &self.hash, &self.salt)
    }
}
