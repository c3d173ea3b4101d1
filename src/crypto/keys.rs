// ABOUTME: RS256 signing key management and JWKS public key distribution
// ABOUTME: Holds the process-lifetime RSA key pair used to sign access tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! Signing key management
//!
//! The server holds exactly one RSA key pair for the process lifetime:
//! generated at startup, or loaded from a PKCS#8 PEM file when configured.
//! The private key never leaves the process; the public half is published
//! through `/.well-known/jwks.json`. Key material is read-only after
//! startup and safe for unsynchronized concurrent reads.

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// RSA key size in bits for RS256
const RSA_KEY_SIZE: usize = 2048;

/// JWK (JSON Web Key) representation for the JWKS endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKey {
    /// Key type (always "RSA")
    pub kty: String,
    /// Public key use (always "sig")
    #[serde(rename = "use")]
    pub key_use: String,
    /// Key ID
    pub kid: String,
    /// Algorithm (RS256)
    pub alg: String,
    /// RSA modulus (base64url encoded, no padding)
    pub n: String,
    /// RSA exponent (base64url encoded, no padding)
    pub e: String,
}

/// JWKS (JSON Web Key Set) container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonWebKeySet {
    /// Array of public keys
    pub keys: Vec<JsonWebKey>,
}

/// Process-lifetime RS256 signing key
pub struct SigningKeyManager {
    kid: String,
    public_key: RsaPublicKey,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl SigningKeyManager {
    /// Generate a fresh RSA key pair.
    ///
    /// # Errors
    /// Returns an error if key generation or PEM encoding fails.
    pub fn generate() -> Result<Self> {
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, RSA_KEY_SIZE)
            .map_err(|e| anyhow!("failed to generate RSA private key: {e}"))?;
        Self::from_private_key(private_key)
    }

    /// Load the signing key from a PKCS#8 PEM file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or does not contain a
    /// valid PKCS#8 RSA private key.
    pub fn from_pem_file(path: &Path) -> Result<Self> {
        let pem = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read signing key from {}", path.display()))?;
        let private_key = RsaPrivateKey::from_pkcs8_pem(&pem)
            .map_err(|e| anyhow!("failed to parse signing key PEM: {e}"))?;
        Self::from_private_key(private_key)
    }

    fn from_private_key(private_key: RsaPrivateKey) -> Result<Self> {
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| anyhow!("failed to encode private key as PEM: {e}"))?;
        let encoding_key = EncodingKey::from_rsa_pem(private_pem.as_bytes())
            .map_err(|e| anyhow!("failed to build RS256 encoding key: {e}"))?;

        let public_pem = public_key
            .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
            .map_err(|e| anyhow!("failed to encode public key as PEM: {e}"))?;
        let decoding_key = DecodingKey::from_rsa_pem(public_pem.as_bytes())
            .map_err(|e| anyhow!("failed to build RS256 decoding key: {e}"))?;

        let mut kid_bytes = [0u8; 8];
        rand::rngs::OsRng.fill_bytes(&mut kid_bytes);

        Ok(Self {
            kid: hex::encode(kid_bytes),
            public_key,
            encoding_key,
            decoding_key,
        })
    }

    /// The key id carried in token headers and the JWKS document
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Encoding key for RS256 signing
    #[must_use]
    pub const fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    /// Decoding key for verifying tokens this server issued
    #[must_use]
    pub const fn decoding_key(&self) -> &DecodingKey {
        &self.decoding_key
    }

    /// Public key in JWK format
    #[must_use]
    pub fn to_jwk(&self) -> JsonWebKey {
        let n = self.public_key.n().to_bytes_be();
        let e = self.public_key.e().to_bytes_be();

        JsonWebKey {
            kty: "RSA".to_owned(),
            key_use: "sig".to_owned(),
            kid: self.kid.clone(),
            alg: "RS256".to_owned(),
            n: URL_SAFE_NO_PAD.encode(n),
            e: URL_SAFE_NO_PAD.encode(e),
        }
    }

    /// The published JWKS document (a single-key set)
    #[must_use]
    pub fn jwks(&self) -> JsonWebKeySet {
        JsonWebKeySet {
            keys: vec![self.to_jwk()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_exposes_consistent_jwks() {
        let manager = SigningKeyManager::generate().unwrap();
        let jwks = manager.jwks();

        assert_eq!(jwks.keys.len(), 1);
        let jwk = &jwks.keys[0];
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.key_use, "sig");
        assert_eq!(jwk.kid, manager.kid());
        assert_eq!(manager.kid().len(), 16);
        // base64url without padding
        assert!(!jwk.n.contains('='));
        assert!(!jwk.e.contains('='));
        // standard RSA exponent 65537 -> "AQAB"
        assert_eq!(jwk.e, "AQAB");
    }

    #[test]
    fn pem_round_trip_preserves_public_key() {
        let manager = SigningKeyManager::generate().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signing.pem");

        // Re-derive a PEM from a fresh key to exercise the file loader
        let private_key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
        let pem = private_key.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        std::fs::write(&path, pem.as_bytes()).unwrap();

        let loaded = SigningKeyManager::from_pem_file(&path).unwrap();
        assert_eq!(loaded.to_jwk().e, "AQAB");
        // Different keys, different moduli
        assert_ne!(loaded.to_jwk().n, manager.to_jwk().n);
    }
}
