// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for crypto::credential

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use trialsync_core::crypto::*;

#[derive(Deserialize)]
struct VectorFile {
    params: serde_json::Value,
    vectors: Vec<Vector>,
}

#[derive(Deserialize)]
struct Vector {
    password: String,
    salt: String,
    hash: String,
}

fn vector_file() -> VectorFile {
    serde_json::from_str(include_str!("vectors/credential_vectors.json")).unwrap()
}

const SALT_A: &str = "AAECAwQFBgcICQoLDA0ODw==";
const SALT_B: &str = "AQIDBAUGBwgJCgsMDQ4PEA==";

// === Conformance Vectors ===

#[test]
fn test_conformance_vectors_reproduce_exactly() {
    let file = vector_file();
    assert!(!file.vectors.is_empty());

    for vector in &file.vectors {
        let hash = hash(&vector.password, &vector.salt).unwrap();
        assert_eq!(hash, vector.hash, "password {:?}", vector.password);
    }
}

#[test]
fn test_conformance_vectors_verify() {
    for vector in &vector_file().vectors {
        assert!(verify(&vector.password, &vector.hash, &vector.salt));
        assert!(!verify("not the password", &vector.hash, &vector.salt));
    }
}

#[test]
fn test_vector_params_match_implementation() {
    let file = vector_file();
    assert_eq!(file.params, serde_json::to_value(CREDENTIAL_PARAMS).unwrap());
}

// === Hash Properties ===

#[test]
fn test_hash_is_deterministic() {
    let first = hash("hunter2", SALT_A).unwrap();
    let second = hash("hunter2", SALT_A).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_different_passwords_give_different_hashes() {
    assert_ne!(
        hash("hunter2", SALT_A).unwrap(),
        hash("hunter3", SALT_A).unwrap()
    );
}

#[test]
fn test_different_salts_give_different_hashes() {
    assert_ne!(
        hash("hunter2", SALT_A).unwrap(),
        hash("hunter2", SALT_B).unwrap()
    );
}

#[test]
fn test_hash_decodes_to_32_bytes() {
    let hash = hash("hunter2", SALT_A).unwrap();
    assert_eq!(STANDARD.decode(hash).unwrap().len(), HASH_LEN);
}

#[test]
fn test_salt_is_decoded_not_used_as_text() {
    // The same 24 characters used as raw text would be a different salt.
    let text_salt = STANDARD.encode(SALT_A.as_bytes());
    assert!(hash("hunter2", &text_salt).is_err());
}

// === Salt Handling ===

#[test]
fn test_generate_salt_is_16_random_bytes() {
    let first = generate_salt();
    let second = generate_salt();

    assert_eq!(decode_salt(&first).unwrap().len(), SALT_LEN);
    assert_ne!(first, second);
}

#[test]
fn test_wrong_length_salt_is_rejected() {
    let short = STANDARD.encode([7u8; 8]);
    assert_eq!(hash("pw", &short), Err(CredentialError::SaltLength(8)));

    let empty = STANDARD.encode([]);
    assert_eq!(hash("pw", &empty), Err(CredentialError::SaltLength(0)));
}

#[test]
fn test_malformed_salt_is_rejected() {
    assert_eq!(hash("pw", "not base64!"), Err(CredentialError::MalformedSalt));
}

// === Verification ===

#[test]
fn test_verify_roundtrip() {
    let hash = hash("hunter2", SALT_A).unwrap();
    assert!(verify("hunter2", &hash, SALT_A));
    assert!(!verify("hunter3", &hash, SALT_A));
}

#[test]
fn test_single_bit_flip_fails_verification() {
    let stored = hash("hunter2", SALT_A).unwrap();
    let bytes = STANDARD.decode(&stored).unwrap();

    for bit in [0usize, 7, 128, 255] {
        let mut flipped = bytes.clone();
        flipped[bit / 8] ^= 1 << (bit % 8);
        assert!(!verify("hunter2", &STANDARD.encode(&flipped), SALT_A));
    }
}

#[test]
fn test_corrupt_hash_is_failed_verification() {
    assert!(!verify("hunter2", "%%%", SALT_A));
    assert!(!verify("hunter2", "", SALT_A));
    assert!(!verify("hunter2", &STANDARD.encode([0u8; 31]), SALT_A));
    assert!(!verify("hunter2", &STANDARD.encode([0u8; 33]), SALT_A));
}

#[test]
fn test_malformed_salt_is_failed_verification() {
    let stored = hash("hunter2", SALT_A).unwrap();
    assert!(!verify("hunter2", &stored, "AAEC"));
}

// === Credential Record ===

#[test]
fn test_credential_create_and_verify() {
    let credential = Credential::create("patient-1", "hunter2").unwrap();
    assert!(credential.verify("hunter2"));
    assert!(!credential.verify("hunter"));
}

#[test]
fn test_credential_from_wire_rejects_bad_lengths() {
    let good_hash = hash("hunter2", SALT_A).unwrap();

    assert!(Credential::from_wire("u", SALT_A, &good_hash).is_ok());
    assert_eq!(
        Credential::from_wire("u", STANDARD.encode([1u8; 15]), &good_hash),
        Err(CredentialError::SaltLength(15))
    );
    assert_eq!(
        Credential::from_wire("u", SALT_A, STANDARD.encode([1u8; 16])),
        Err(CredentialError::CorruptHash)
    );
}
