// ABOUTME: Signed access-token construction for both grant types
// ABOUTME: Builds RS256 JWTs with issuer, audience, scope, and lifetime claims
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! Access token generation
//!
//! Tokens are RS256 JWTs signed with the process signing key. The audience
//! is the target server's name, so a resource server can reject tokens
//! minted for its neighbors. User-exchange tokens carry the user's subject
//! and are marked `token_type: "user"`.

use crate::crypto::SigningKeyManager;
use crate::errors::{AppError, AppResult};
use chrono::{Duration, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Claims carried by every issued access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Token issuer
    pub iss: String,
    /// Audience: the target server's name
    pub aud: String,
    /// Subject: client id, or user subject for exchange tokens
    pub sub: String,
    /// Space-joined granted scopes
    pub scope: String,
    /// Unique token identifier
    pub jti: String,
    /// Issued-at, seconds since epoch
    pub iat: i64,
    /// Expiry, seconds since epoch
    pub exp: i64,
    /// "user" for exchange tokens; absent for client tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Target server id; exchange tokens only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,
    /// The user's preferred username, when the identity provider supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,
}

/// Builds and signs access tokens
pub struct TokenGenerator {
    issuer: String,
    keys: Arc<SigningKeyManager>,
}

impl TokenGenerator {
    /// Create a generator for the configured issuer
    #[must_use]
    pub fn new(issuer: impl Into<String>, keys: Arc<SigningKeyManager>) -> Self {
        Self {
            issuer: issuer.into(),
            keys,
        }
    }

    /// Issue a client-credentials access token.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn generate_access_token(
        &self,
        client_id: &str,
        server_name: &str,
        scopes: &[String],
        lifetime: Duration,
    ) -> AppResult<String> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            aud: server_name.to_owned(),
            sub: client_id.to_owned(),
            scope: scopes.join(" "),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            token_type: None,
            server_id: None,
            preferred_username: None,
        };

        self.sign(&claims)
    }

    /// Issue a user-scoped access token from a validated exchange.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn generate_user_access_token(
        &self,
        subject: &str,
        preferred_username: Option<&str>,
        server_id: Uuid,
        server_name: &str,
        scopes: &[String],
        lifetime: Duration,
    ) -> AppResult<String> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            aud: server_name.to_owned(),
            sub: subject.to_owned(),
            scope: scopes.join(" "),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            token_type: Some("user".to_owned()),
            server_id: Some(server_id.to_string()),
            preferred_username: preferred_username.map(str::to_owned),
        };

        self.sign(&claims)
    }

    fn sign(&self, claims: &AccessTokenClaims) -> AppResult<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.keys.kid().to_owned());

        encode(&header, claims, self.keys.encoding_key())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to sign access token: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{decode, decode_header, Validation};

    fn generator() -> (TokenGenerator, Arc<SigningKeyManager>) {
        let keys = Arc::new(SigningKeyManager::generate().unwrap());
        (
            TokenGenerator::new("https://mcpd.example.com", Arc::clone(&keys)),
            keys,
        )
    }

    #[test]
    fn client_token_round_trips_with_expected_claims() {
        let (generator, keys) = generator();

        let token = generator
            .generate_access_token(
                "client-abc",
                "weather-server",
                &["read".to_owned(), "write".to_owned()],
                Duration::minutes(60),
            )
            .unwrap();

        let header = decode_header(&token).unwrap();
        assert_eq!(header.kid.as_deref(), Some(keys.kid()));

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["weather-server"]);
        validation.set_issuer(&["https://mcpd.example.com"]);

        let data =
            decode::<AccessTokenClaims>(&token, keys.decoding_key(), &validation).unwrap();
        assert_eq!(data.claims.sub, "client-abc");
        assert_eq!(data.claims.scope, "read write");
        assert!(data.claims.token_type.is_none());
        assert!(data.claims.exp - data.claims.iat >= 3590);
    }

    #[test]
    fn user_token_carries_exchange_claims() {
        let (generator, keys) = generator();
        let server_id = Uuid::new_v4();

        let token = generator
            .generate_user_access_token(
                "user-123",
                Some("alice"),
                server_id,
                "weather-server",
                &["read".to_owned()],
                Duration::minutes(60),
            )
            .unwrap();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["weather-server"]);
        validation.set_issuer(&["https://mcpd.example.com"]);

        let data =
            decode::<AccessTokenClaims>(&token, keys.decoding_key(), &validation).unwrap();
        assert_eq!(data.claims.sub, "user-123");
        assert_eq!(data.claims.token_type.as_deref(), Some("user"));
        assert_eq!(data.claims.server_id.as_deref(), Some(server_id.to_string().as_str()));
        assert_eq!(data.claims.preferred_username.as_deref(), Some("alice"));
    }

    #[test]
    fn each_token_gets_a_fresh_jti() {
        let (generator, keys) = generator();

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_audience(&["s"]);
        validation.set_issuer(&["https://mcpd.example.com"]);

        let first = generator
            .generate_access_token("c", "s", &[], Duration::minutes(5))
            .unwrap();
        let second = generator
            .generate_access_token("c", "s", &[], Duration::minutes(5))
            .unwrap();

        let a = decode::<AccessTokenClaims>(&first, keys.decoding_key(), &validation).unwrap();
        let b = decode::<AccessTokenClaims>(&second, keys.decoding_key(), &validation).unwrap();
        assert_ne!(a.claims.jti, b.claims.jti);
    }
}
