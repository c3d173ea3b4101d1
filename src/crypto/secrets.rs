// ABOUTME: Argon2id hashing and verification for client secrets and registration tokens
// ABOUTME: Provides constant-time verification and a dummy hash for timing-uniform lookups
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! Secret hashing for client credentials
//!
//! Secrets are hashed with Argon2id (1 lane, 64 MiB, 3 iterations) and
//! stored as `$argon2id$<base64 salt>$<base64 hash>`. Verification
//! re-derives the hash with the stored salt and compares in constant time.
//!
//! Hashing holds a 64 MiB working set per call, so concurrent operations
//! are bounded by a semaphore to keep memory use predictable under load.

use crate::errors::{AppError, AppResult};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::Semaphore;

const SALT_SIZE: usize = 16;
const HASH_SIZE: usize = 32;
const LANES: u32 = 1;
const MEMORY_KIB: u32 = 65536; // 64 MiB
const ITERATIONS: u32 = 3;

/// Pre-computed hash of no real secret (all-zero salt and digest).
///
/// Callers verify against this when no matching record exists, so a lookup
/// miss costs the same as a secret mismatch and client ids cannot be
/// enumerated through response timing.
pub const DUMMY_HASH: &str =
    "$argon2id$AAAAAAAAAAAAAAAAAAAAAA==$AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

/// Hashes and verifies client secrets and registration access tokens
pub struct SecretHasher {
    permits: Arc<Semaphore>,
    rng: SystemRandom,
}

impl SecretHasher {
    /// Create a hasher allowing at most `max_concurrent` in-flight hash
    /// operations.
    #[must_use]
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            rng: SystemRandom::new(),
        }
    }

    /// Hash a plaintext secret with a fresh random salt.
    ///
    /// # Errors
    /// Returns an error if the system RNG fails or the hashing task is
    /// cancelled.
    pub async fn hash(&self, plaintext: &str) -> AppResult<String> {
        let mut salt = [0u8; SALT_SIZE];
        self.rng
            .fill(&mut salt)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("system RNG failure")))?;

        let plaintext = plaintext.to_owned();
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| AppError::Internal(anyhow::anyhow!("hasher semaphore closed")))?;

        tokio::task::spawn_blocking(move || {
            let digest = compute_hash(plaintext.as_bytes(), &salt)?;
            Ok(format!(
                "$argon2id${}${}",
                STANDARD.encode(salt),
                STANDARD.encode(digest)
            ))
        })
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("hash task failed: {e}")))?
    }

    /// Verify a plaintext secret against a stored hash.
    ///
    /// Returns `false` for malformed stored values. The digest comparison is
    /// constant-time and never short-circuits on an early byte mismatch.
    pub async fn verify(&self, plaintext: &str, stored: &str) -> bool {
        let plaintext = plaintext.to_owned();
        let stored = stored.to_owned();

        let Ok(_permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return false;
        };

        tokio::task::spawn_blocking(move || verify_blocking(&plaintext, &stored))
            .await
            .unwrap_or(false)
    }

    /// Generate a public client identifier (32 bytes of entropy)
    ///
    /// # Errors
    /// Returns an error if the system RNG fails.
    pub fn generate_client_id(&self) -> AppResult<String> {
        self.random_urlsafe(32)
    }

    /// Generate a client secret (48 bytes of entropy)
    ///
    /// # Errors
    /// Returns an error if the system RNG fails.
    pub fn generate_client_secret(&self) -> AppResult<String> {
        self.random_urlsafe(48)
    }

    /// Generate a registration access token (32 bytes of entropy)
    ///
    /// # Errors
    /// Returns an error if the system RNG fails.
    pub fn generate_registration_access_token(&self) -> AppResult<String> {
        self.random_urlsafe(32)
    }

    fn random_urlsafe(&self, len: usize) -> AppResult<String> {
        let mut bytes = vec![0u8; len];
        self.rng.fill(&mut bytes).map_err(|_| {
            tracing::error!("system RNG failure while generating credential");
            AppError::Internal(anyhow::anyhow!("system RNG failure"))
        })?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

/// Synchronous verification; exposed for call sites already off the
/// async executor.
#[must_use]
pub fn verify_blocking(plaintext: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').filter(|p| !p.is_empty()).collect();
    if parts.len() != 3 || parts[0] != "argon2id" {
        return false;
    }

    let Ok(salt) = STANDARD.decode(parts[1]) else {
        return false;
    };
    let Ok(expected) = STANDARD.decode(parts[2]) else {
        return false;
    };
    let Ok(computed) = compute_hash(plaintext.as_bytes(), &salt) else {
        return false;
    };

    if expected.len() != computed.len() {
        return false;
    }
    computed.ct_eq(&expected).into()
}

fn compute_hash(plaintext: &[u8], salt: &[u8]) -> AppResult<[u8; HASH_SIZE]> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, LANES, Some(HASH_SIZE))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("argon2 params: {e}")))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut out = [0u8; HASH_SIZE];
    argon2
        .hash_password_into(plaintext, salt, &mut out)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("argon2 hashing failed: {e}")))?;
    Ok(out)
}
