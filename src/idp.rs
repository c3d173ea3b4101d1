// ABOUTME: Upstream identity-provider token validation for the JWT-bearer grant
// ABOUTME: Fetches and caches OIDC signing-key metadata, then validates user assertions
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! Identity-provider assertion validation
//!
//! The JWT-bearer exchange grant accepts a token minted by an upstream
//! identity provider. This module fetches the provider's OIDC discovery
//! document and JWKS over HTTPS with a bounded timeout, caches the keys
//! for a TTL window, and validates assertions for signature, issuer,
//! audience, and lifetime.
//!
//! Metadata fetch failures are transient infrastructure errors, surfaced
//! distinctly from policy rejections — they must never read as
//! `invalid_client` to the caller.

use crate::config::AuthServerConfig;
use crate::constants::IDP_CLOCK_SKEW_SECS;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use rsa::pkcs8::EncodePublicKey;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// A validated user assertion
#[derive(Debug, Clone)]
pub struct UserTokenValidation {
    /// The user's stable subject identifier
    pub subject: String,
    /// Preferred username, when the provider supplied one
    pub preferred_username: Option<String>,
    /// Values of the configured server-access claim
    pub claims: Vec<String>,
}

/// Validates identity-provider assertions
#[async_trait]
pub trait IdpTokenValidator: Send + Sync {
    /// Validate an assertion and extract the user's identity.
    ///
    /// # Errors
    /// `invalid_grant` for rejected assertions; an upstream error when the
    /// provider's metadata cannot be fetched.
    async fn validate(&self, assertion: &str) -> AppResult<UserTokenValidation>;
}

#[derive(Debug, Deserialize)]
struct OidcMetadata {
    jwks_uri: String,
}

#[derive(Debug, Deserialize)]
struct RemoteJwks {
    keys: Vec<RemoteJwk>,
}

#[derive(Debug, Deserialize)]
struct RemoteJwk {
    #[serde(default)]
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

struct CachedKeys {
    keys: HashMap<String, DecodingKey>,
    expires_at: DateTime<Utc>,
}

/// OIDC-discovery-backed implementation of [`IdpTokenValidator`]
pub struct OidcTokenValidator {
    config: AuthServerConfig,
    http: reqwest::Client,
    cache: RwLock<Option<CachedKeys>>,
}

impl OidcTokenValidator {
    /// Create a validator for the configured upstream provider.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: AuthServerConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            config,
            http,
            cache: RwLock::new(None),
        })
    }

    fn metadata_url(&self, authority: &str) -> String {
        self.config.metadata_url.clone().unwrap_or_else(|| {
            format!(
                "{}/.well-known/openid-configuration",
                authority.trim_end_matches('/')
            )
        })
    }

    async fn signing_keys(&self, authority: &str) -> AppResult<HashMap<String, DecodingKey>> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Utc::now() {
                    return Ok(cached.keys.clone());
                }
            }
        }

        let keys = self.fetch_signing_keys(authority).await?;

        let ttl = Duration::seconds(self.config.key_cache_ttl_secs as i64);
        let mut cache = self.cache.write().await;
        *cache = Some(CachedKeys {
            keys: keys.clone(),
            expires_at: Utc::now() + ttl,
        });

        Ok(keys)
    }

    async fn fetch_signing_keys(
        &self,
        authority: &str,
    ) -> AppResult<HashMap<String, DecodingKey>> {
        let metadata_url = self.metadata_url(authority);
        tracing::debug!(url = %metadata_url, "fetching identity-provider metadata");

        let metadata: OidcMetadata = self
            .http
            .get(&metadata_url)
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("failed to fetch auth server metadata: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::upstream(format!("auth server metadata request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::upstream(format!("malformed auth server metadata: {e}")))?;

        let jwks: RemoteJwks = self
            .http
            .get(&metadata.jwks_uri)
            .send()
            .await
            .map_err(|e| AppError::upstream(format!("failed to fetch auth server JWKS: {e}")))?
            .error_for_status()
            .map_err(|e| AppError::upstream(format!("auth server JWKS request failed: {e}")))?
            .json()
            .await
            .map_err(|e| AppError::upstream(format!("malformed auth server JWKS: {e}")))?;

        let mut keys = HashMap::new();
        for jwk in jwks.keys {
            if jwk.kty != "RSA" {
                continue;
            }
            let (Some(kid), Some(n), Some(e)) = (jwk.kid, jwk.n, jwk.e) else {
                continue;
            };
            match decoding_key_from_components(&n, &e) {
                Ok(key) => {
                    keys.insert(kid, key);
                }
                Err(err) => {
                    tracing::warn!(kid = %kid, error = %err, "skipping unusable JWK");
                }
            }
        }

        if keys.is_empty() {
            return Err(AppError::upstream(
                "auth server JWKS contained no usable RSA keys",
            ));
        }

        tracing::debug!(count = keys.len(), "cached identity-provider signing keys");
        Ok(keys)
    }

    fn extract_identity(&self, claims: &Value) -> AppResult<UserTokenValidation> {
        extract_identity(&self.config, claims)
    }
}

/// Rebuild a verification key from a JWK's base64url modulus and exponent
fn decoding_key_from_components(n: &str, e: &str) -> anyhow::Result<DecodingKey> {
    let n_bytes = URL_SAFE_NO_PAD.decode(n)?;
    let e_bytes = URL_SAFE_NO_PAD.decode(e)?;

    let public_key = rsa::RsaPublicKey::new(
        rsa::BigUint::from_bytes_be(&n_bytes),
        rsa::BigUint::from_bytes_be(&e_bytes),
    )
    .map_err(|err| anyhow::anyhow!("invalid RSA components: {err}"))?;

    let pem = public_key
        .to_public_key_pem(rsa::pkcs8::LineEnding::LF)
        .map_err(|err| anyhow::anyhow!("failed to encode JWK as PEM: {err}"))?;

    DecodingKey::from_rsa_pem(pem.as_bytes())
        .map_err(|err| anyhow::anyhow!("failed to build decoding key: {err}"))
}

fn extract_identity(config: &AuthServerConfig, claims: &Value) -> AppResult<UserTokenValidation> {
    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .or_else(|| claims.get("oid").and_then(Value::as_str))
        .ok_or_else(|| AppError::invalid_grant("Token does not contain a subject claim."))?
        .to_owned();

    let preferred_username = claims
        .get("preferred_username")
        .and_then(Value::as_str)
        .or_else(|| claims.get("name").and_then(Value::as_str))
        .map(str::to_owned);

    let role_claims = match claims.get(&config.server_access_claim_type) {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_owned)
            .collect(),
        _ => Vec::new(),
    };

    Ok(UserTokenValidation {
        subject,
        preferred_username,
        claims: role_claims,
    })
}

#[async_trait]
impl IdpTokenValidator for OidcTokenValidator {
    async fn validate(&self, assertion: &str) -> AppResult<UserTokenValidation> {
        let Some(authority) = self.config.authority.clone() else {
            return Err(AppError::invalid_grant("Auth server is not configured."));
        };

        let header = decode_header(assertion)
            .map_err(|e| AppError::invalid_grant(format!("Malformed assertion: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::invalid_grant("Assertion header is missing a key id."))?;

        let keys = self.signing_keys(&authority).await?;
        let key = keys.get(&kid).ok_or_else(|| {
            AppError::invalid_grant("Assertion was signed with an unknown key.")
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[authority.trim_end_matches('/')]);
        if self.config.audience.is_empty() {
            validation.validate_aud = false;
        } else {
            validation.set_audience(&[self.config.audience.as_str()]);
        }
        validation.leeway = IDP_CLOCK_SKEW_SECS;

        let data = decode::<Value>(assertion, key, &validation)
            .map_err(|e| AppError::invalid_grant(format!("User token validation failed: {e}")))?;

        self.extract_identity(&data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(claim_type: &str) -> OidcTokenValidator {
        OidcTokenValidator::new(AuthServerConfig {
            authority: Some("https://idp.example.com".to_owned()),
            audience: "mcpd".to_owned(),
            server_access_claim_type: claim_type.to_owned(),
            ..AuthServerConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn identity_extraction_prefers_sub_over_oid() {
        let v = validator("roles");
        let claims = serde_json::json!({
            "sub": "user-1",
            "oid": "object-9",
            "preferred_username": "alice",
            "roles": ["mcp.user", "mcp.admin"]
        });
        let identity = v.extract_identity(&claims).unwrap();
        assert_eq!(identity.subject, "user-1");
        assert_eq!(identity.preferred_username.as_deref(), Some("alice"));
        assert_eq!(identity.claims, vec!["mcp.user", "mcp.admin"]);
    }

    #[test]
    fn identity_extraction_falls_back_to_oid_and_name() {
        let v = validator("roles");
        let claims = serde_json::json!({
            "oid": "object-9",
            "name": "Alice Adams",
            "roles": "mcp.user"
        });
        let identity = v.extract_identity(&claims).unwrap();
        assert_eq!(identity.subject, "object-9");
        assert_eq!(identity.preferred_username.as_deref(), Some("Alice Adams"));
        assert_eq!(identity.claims, vec!["mcp.user"]);
    }

    #[test]
    fn missing_subject_is_rejected() {
        let v = validator("roles");
        let claims = serde_json::json!({ "roles": ["mcp.user"] });
        let err = v.extract_identity(&claims).unwrap_err();
        assert_eq!(
            err.oauth_code(),
            Some(crate::errors::OAuthErrorCode::InvalidGrant)
        );
    }

    #[tokio::test]
    async fn unconfigured_authority_is_invalid_grant() {
        let v = OidcTokenValidator::new(AuthServerConfig::default()).unwrap();
        let err = v.validate("header.payload.signature").await.unwrap_err();
        assert_eq!(
            err.oauth_code(),
            Some(crate::errors::OAuthErrorCode::InvalidGrant)
        );
    }
}
