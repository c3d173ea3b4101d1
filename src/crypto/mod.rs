// ABOUTME: Cryptographic primitives for the authorization server
// ABOUTME: Argon2id secret hashing and RS256 signing key management
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

/// RS256 signing key management and JWKS representation
pub mod keys;
/// Argon2id secret hashing and credential generation
pub mod secrets;

pub use keys::{JsonWebKey, JsonWebKeySet, SigningKeyManager};
pub use secrets::{SecretHasher, DUMMY_HASH};
