// ABOUTME: Random credential generation and secret hashing helpers
// ABOUTME: Shared by the client registry, code store, and token store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Xstar Mail

//! Cryptographic helpers for the authorization server.
//!
//! Authorization codes, access tokens, and refresh tokens are opaque random
//! values produced by the system RNG. Client secrets are stored as Argon2id
//! hashes. Bearer-token values are never persisted in plaintext; stores index
//! them by SHA-256 digest.

use crate::errors::{AppError, AppResult};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// Generate a URL-safe random string carrying `length` bytes of entropy
///
/// # Errors
///
/// Returns an error if the system RNG fails - the server cannot operate
/// securely without working RNG, so callers must not paper over this.
pub fn generate_random_string(length: usize) -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];

    rng.fill(&mut bytes).map_err(|e| {
        tracing::error!("CRITICAL: SystemRandom failed - cannot generate secure random bytes: {e}");
        AppError::internal("System RNG failure - server cannot operate securely")
    })?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
}

/// Hash a client secret for storage using Argon2id with a random salt
///
/// # Errors
///
/// Returns an error if Argon2 hashing fails.
pub fn hash_secret(secret: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    let hash = argon2
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| AppError::internal(format!("Argon2 password hashing failed: {e}")))?;

    Ok(hash.to_string())
}

/// Verify a presented secret against a stored Argon2id hash
///
/// Argon2 verification recomputes the hash over the presented secret, so the
/// comparison cost does not depend on where the values diverge.
#[must_use]
pub fn verify_secret(presented: &str, stored_hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(stored_hash) else {
        tracing::error!("Stored secret hash is not a valid PHC string");
        return false;
    };

    Argon2::default()
        .verify_password(presented.as_bytes(), &parsed_hash)
        .is_ok()
}

/// SHA-256 digest of a bearer-token value, hex encoded, for at-rest storage
#[must_use]
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Constant-time equality over two byte strings
#[must_use]
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
