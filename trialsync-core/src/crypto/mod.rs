// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Cryptography Module
//!
//! Password hashing for patient credentials.

pub mod credential;

pub use credential::{
    decode_hash, decode_salt, generate_salt, hash, verify, Credential, CredentialError,
    CredentialParams, CREDENTIAL_PARAMS, HASH_LEN, SALT_LEN,
};
