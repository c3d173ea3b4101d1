// ABOUTME: Token issuance engine for the client-credentials and JWT-bearer grants
// ABOUTME: Runs the ordered credential and authorization checks before signing tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! Token issuance
//!
//! Two independent protocols hang off the grant-type dispatch:
//!
//! - **client_credentials**: confidential clients authenticate with their
//!   secret and receive a token scoped by their grant for one server.
//! - **jwt-bearer**: end users exchange an identity-provider token for an
//!   MCP-scoped token, authorized through the claim mapping.
//!
//! Policy rejections are encoded in [`TokenValidationResult`] with a
//! taxonomy code; only infrastructure failures surface as `Err`. Lookup
//! misses burn a verification against the dummy hash so response timing
//! does not reveal whether a client id exists.

use crate::constants::{audit_actions, grant_types};
use crate::crypto::{SecretHasher, DUMMY_HASH};
use crate::database::{
    AuditLogRepository, ClientRegistrationRepository, ClientServerGrantRepository,
    McpServerRepository,
};
use crate::errors::{AppError, AppResult, OAuthErrorCode};
use crate::idp::IdpTokenValidator;
use crate::models::AuditLogEntry;
use crate::token_generator::TokenGenerator;
use crate::user_access::UserServerAuthorization;
use chrono::Duration;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// A parsed token endpoint request
#[derive(Debug, Default)]
pub struct TokenIssuanceRequest {
    /// `grant_type` form field
    pub grant_type: Option<String>,
    /// `client_id`, from the form body or HTTP Basic credentials
    pub client_id: Option<String>,
    /// `client_secret`, from the form body or HTTP Basic credentials
    pub client_secret: Option<String>,
    /// Target server id
    pub server_id: Option<String>,
    /// Requested scopes, already split on whitespace
    pub scopes: Option<Vec<String>>,
    /// IdP assertion for the jwt-bearer grant
    pub assertion: Option<String>,
    /// How the credentials arrived; see [`crate::constants::auth_methods`]
    pub auth_method: String,
}

/// Outcome of a token issuance attempt
#[derive(Debug)]
pub struct TokenValidationResult {
    /// Whether a token was issued
    pub is_authorized: bool,
    /// Taxonomy code on rejection
    pub error: Option<OAuthErrorCode>,
    /// Human-readable rejection description
    pub error_description: Option<String>,
    /// The signed access token on success
    pub access_token: Option<String>,
    /// Scopes embedded in the token
    pub granted_scopes: Option<Vec<String>>,
    /// Token lifetime in seconds
    pub expires_in: Option<i64>,
}

impl TokenValidationResult {
    fn fail(error: OAuthErrorCode, description: impl Into<String>) -> Self {
        Self {
            is_authorized: false,
            error: Some(error),
            error_description: Some(description.into()),
            access_token: None,
            granted_scopes: None,
            expires_in: None,
        }
    }

    fn authorized(access_token: String, granted_scopes: Vec<String>, expires_in: i64) -> Self {
        Self {
            is_authorized: true,
            error: None,
            error_description: None,
            access_token: Some(access_token),
            granted_scopes: Some(granted_scopes),
            expires_in: Some(expires_in),
        }
    }
}

/// Successful token endpoint response body
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// The signed access token
    pub access_token: String,
    /// Always "Bearer"
    pub token_type: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    /// Granted scopes
    pub scope: Vec<String>,
}

/// Runs the token issuance decision procedures
pub struct TokenIssuanceEngine {
    clients: Arc<dyn ClientRegistrationRepository>,
    servers: Arc<dyn McpServerRepository>,
    grants: Arc<dyn ClientServerGrantRepository>,
    audit: Arc<dyn AuditLogRepository>,
    hasher: Arc<SecretHasher>,
    token_generator: Arc<TokenGenerator>,
    idp_validator: Arc<dyn IdpTokenValidator>,
    user_authorization: Arc<UserServerAuthorization>,
    token_lifetime: Duration,
}

impl TokenIssuanceEngine {
    /// Wire the engine with its collaborators
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        clients: Arc<dyn ClientRegistrationRepository>,
        servers: Arc<dyn McpServerRepository>,
        grants: Arc<dyn ClientServerGrantRepository>,
        audit: Arc<dyn AuditLogRepository>,
        hasher: Arc<SecretHasher>,
        token_generator: Arc<TokenGenerator>,
        idp_validator: Arc<dyn IdpTokenValidator>,
        user_authorization: Arc<UserServerAuthorization>,
        token_lifetime_minutes: i64,
    ) -> Self {
        Self {
            clients,
            servers,
            grants,
            audit,
            hasher,
            token_generator,
            idp_validator,
            user_authorization,
            token_lifetime: Duration::minutes(token_lifetime_minutes),
        }
    }

    /// Dispatch a token request to the matching grant protocol.
    ///
    /// # Errors
    /// Returns an error only for infrastructure failures (storage, IdP
    /// metadata fetch); every policy rejection is encoded in the result.
    pub async fn issue(&self, request: TokenIssuanceRequest) -> AppResult<TokenValidationResult> {
        let Some(grant_type) = request.grant_type.as_deref().filter(|g| !g.is_empty()) else {
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::InvalidRequest,
                "grant_type is required.",
            ));
        };

        match grant_type {
            grant_types::CLIENT_CREDENTIALS => self.client_credentials(request).await,
            grant_types::JWT_BEARER => self.jwt_bearer(request).await,
            other => {
                tracing::debug!(grant_type = %other, "unsupported grant type requested");
                Ok(TokenValidationResult::fail(
                    OAuthErrorCode::UnsupportedGrantType,
                    format!(
                        "Supported grant types: {}, {}.",
                        grant_types::CLIENT_CREDENTIALS,
                        grant_types::JWT_BEARER
                    ),
                ))
            }
        }
    }

    async fn client_credentials(
        &self,
        request: TokenIssuanceRequest,
    ) -> AppResult<TokenValidationResult> {
        let (Some(client_id), Some(client_secret)) = (
            request.client_id.as_deref().filter(|v| !v.is_empty()),
            request.client_secret.as_deref().filter(|v| !v.is_empty()),
        ) else {
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::InvalidClient,
                "Client credentials are required.",
            ));
        };

        let Some(server_id) = parse_server_id(request.server_id.as_deref()) else {
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::InvalidRequest,
                "server_id must be a valid UUID.",
            ));
        };

        // Step 1: the client must exist and be active. A miss still costs
        // one hash verification so client ids cannot be enumerated by
        // timing the response.
        let registration = self.clients.get_by_client_id(client_id).await?;
        let Some(registration) = registration.filter(crate::models::ClientRegistration::is_active)
        else {
            self.hasher.verify("dummy", DUMMY_HASH).await;
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::InvalidClient,
                "Client not found or inactive.",
            ));
        };

        // Step 2: the caller's transport must match the registered method
        if registration.token_endpoint_auth_method != request.auth_method {
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::InvalidClient,
                "Authentication method does not match registered method.",
            ));
        }

        // Step 3: verify the secret against the stored Argon2id hash
        if !self
            .hasher
            .verify(client_secret, &registration.client_secret_hash)
            .await
        {
            tracing::warn!(client_id = %client_id, "client secret verification failed");
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::InvalidClient,
                "Invalid client credentials.",
            ));
        }

        // Step 4: the client must hold an active grant for the server
        let Some(grant) = self.grants.get_active(registration.id, server_id).await? else {
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::UnauthorizedClient,
                "Client is not authorized for the requested server.",
            ));
        };

        let Some(server) = self
            .servers
            .get_by_id(server_id)
            .await?
            .filter(|s| s.is_active)
        else {
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::UnauthorizedClient,
                "Client is not authorized for the requested server.",
            ));
        };

        // Step 5: requested scopes must be a subset of the grant's set
        let requested = request.scopes.unwrap_or_default();
        if !requested.is_empty() && !requested.iter().all(|s| grant.scopes.contains(s)) {
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::InvalidScope,
                "Requested scopes exceed granted scopes.",
            ));
        }
        let effective_scopes = if requested.is_empty() {
            grant.scopes.clone()
        } else {
            requested
        };

        // Step 6: issue the token
        let access_token = self.token_generator.generate_access_token(
            client_id,
            &server.name,
            &effective_scopes,
            self.token_lifetime,
        )?;

        self.audit
            .add(&AuditLogEntry::new(
                audit_actions::TOKEN_ISSUED,
                client_id,
                Some(registration.id),
                Some(server.id),
                Some(format!("scopes: {}", effective_scopes.join(" "))),
            ))
            .await?;

        tracing::info!(client_id = %client_id, server = %server.name, "access token issued");

        Ok(TokenValidationResult::authorized(
            access_token,
            effective_scopes,
            self.token_lifetime.num_seconds(),
        ))
    }

    async fn jwt_bearer(&self, request: TokenIssuanceRequest) -> AppResult<TokenValidationResult> {
        let Some(assertion) = request.assertion.as_deref().filter(|a| !a.is_empty()) else {
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::InvalidRequest,
                "assertion is required for the jwt-bearer grant type.",
            ));
        };

        let Some(server_id) = parse_server_id(request.server_id.as_deref()) else {
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::InvalidRequest,
                "server_id must be a valid UUID.",
            ));
        };

        // Step 1: the identity provider vouches for the user
        let identity = match self.idp_validator.validate(assertion).await {
            Ok(identity) => identity,
            Err(AppError::OAuth { code, description }) => {
                return Ok(TokenValidationResult::fail(code, description));
            }
            // Metadata fetch failures and the like are not policy decisions
            Err(other) => return Err(other),
        };

        // Step 2: the target server must exist and be active
        let Some(server) = self
            .servers
            .get_by_id(server_id)
            .await?
            .filter(|s| s.is_active)
        else {
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::InvalidTarget,
                "Target server not found or inactive.",
            ));
        };

        // Step 3: claim mapping decides access and scopes
        let authorization = self.user_authorization.authorize(
            &server.name,
            &identity.claims,
            request.scopes.as_deref(),
        );
        if !authorization.is_authorized {
            return Ok(TokenValidationResult::fail(
                OAuthErrorCode::UnauthorizedClient,
                authorization
                    .error
                    .unwrap_or_else(|| "User is not authorized for the requested server.".into()),
            ));
        }

        // Step 4: issue the user-scoped token
        let access_token = self.token_generator.generate_user_access_token(
            &identity.subject,
            identity.preferred_username.as_deref(),
            server.id,
            &server.name,
            &authorization.granted_scopes,
            self.token_lifetime,
        )?;

        self.audit
            .add(&AuditLogEntry::new(
                audit_actions::USER_TOKEN_ISSUED,
                &identity.subject,
                None,
                Some(server.id),
                Some(format!("scopes: {}", authorization.granted_scopes.join(" "))),
            ))
            .await?;

        tracing::info!(subject = %identity.subject, server = %server.name, "user token issued");

        Ok(TokenValidationResult::authorized(
            access_token,
            authorization.granted_scopes,
            self.token_lifetime.num_seconds(),
        ))
    }
}

fn parse_server_id(raw: Option<&str>) -> Option<Uuid> {
    raw.filter(|v| !v.is_empty())
        .and_then(|v| Uuid::parse_str(v).ok())
}
