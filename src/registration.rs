// ABOUTME: Client registration lifecycle service
// ABOUTME: Orchestrates register, update, rotate-secret, revoke, and grant administration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! Registration lifecycle
//!
//! Every operation re-reads current state from the repositories, mutates in
//! memory, and writes back; nothing is cached across requests. The
//! plaintext client secret and registration access token appear exactly
//! once, in the response to `register` (and the new secret in
//! `rotate_secret`) — only their Argon2id hashes are stored.

use crate::callback::CallbackValidator;
use crate::constants::audit_actions;
use crate::crypto::SecretHasher;
use crate::database::{
    AuditLogRepository, ClientRegistrationRepository, ClientServerGrantRepository,
    McpServerRepository,
};
use crate::errors::{AppError, AppResult};
use crate::models::{AuditLogEntry, ClientRegistration, ClientServerGrant, McpServer};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Registration request body (RFC 7591 style, snake_case)
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterClientRequest {
    /// Display name
    pub client_name: String,
    /// Redirect URIs to register
    pub redirect_uris: Vec<String>,
    /// Grant types the client will use
    pub grant_types: Vec<String>,
    /// Token endpoint authentication method
    pub token_endpoint_auth_method: String,
    /// Servers the client requests access to
    pub requested_server_ids: Vec<Uuid>,
    /// Requested scopes per server; missing entries default to an empty set
    #[serde(default)]
    pub requested_scopes: HashMap<Uuid, Vec<String>>,
}

/// Update request body for `PUT /register/{client_id}`
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateClientRequest {
    /// Display name
    pub client_name: String,
    /// Replacement redirect URI list
    pub redirect_uris: Vec<String>,
    /// Replacement grant type list
    pub grant_types: Vec<String>,
    /// Token endpoint authentication method
    pub token_endpoint_auth_method: String,
    /// Servers to additionally grant; already-granted ids are a no-op
    #[serde(default)]
    pub additional_server_ids: Vec<Uuid>,
    /// Requested scopes for the additional servers
    #[serde(default)]
    pub additional_scopes: HashMap<Uuid, Vec<String>>,
}

/// One granted server in a registration response
#[derive(Debug, Clone, Serialize)]
pub struct ServerGrantSummary {
    /// Server id
    pub server_id: Uuid,
    /// Server name
    pub server_name: String,
    /// Scopes of the grant
    pub scopes: Vec<String>,
    /// Whether the grant is active
    pub is_active: bool,
}

/// Registration response body
#[derive(Debug, Serialize)]
pub struct ClientRegistrationResponse {
    /// Public client identifier
    pub client_id: String,
    /// Plaintext secret; present only in the initial registration response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Display name
    pub client_name: String,
    /// Registered redirect URIs
    pub redirect_uris: Vec<String>,
    /// Registered grant types
    pub grant_types: Vec<String>,
    /// Token endpoint authentication method
    pub token_endpoint_auth_method: String,
    /// Plaintext registration access token; initial response only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_access_token: Option<String>,
    /// When the current secret expires
    pub client_secret_expires_at: Option<DateTime<Utc>>,
    /// The client's server grants
    pub granted_servers: Vec<ServerGrantSummary>,
}

/// Response to a secret rotation
#[derive(Debug, Serialize)]
pub struct RotateSecretResponse {
    /// The new plaintext secret; shown exactly once
    pub client_secret: String,
    /// When the new secret expires
    pub client_secret_expires_at: Option<DateTime<Utc>>,
}

/// Client registration lifecycle operations
pub struct RegistrationService {
    clients: Arc<dyn ClientRegistrationRepository>,
    servers: Arc<dyn McpServerRepository>,
    grants: Arc<dyn ClientServerGrantRepository>,
    audit: Arc<dyn AuditLogRepository>,
    hasher: Arc<SecretHasher>,
    callback_validator: Arc<CallbackValidator>,
    secret_lifetime: Duration,
}

impl RegistrationService {
    /// Wire the service with its collaborators
    #[must_use]
    pub fn new(
        clients: Arc<dyn ClientRegistrationRepository>,
        servers: Arc<dyn McpServerRepository>,
        grants: Arc<dyn ClientServerGrantRepository>,
        audit: Arc<dyn AuditLogRepository>,
        hasher: Arc<SecretHasher>,
        callback_validator: Arc<CallbackValidator>,
        secret_lifetime_days: i64,
    ) -> Self {
        Self {
            clients,
            servers,
            grants,
            audit,
            hasher,
            callback_validator,
            secret_lifetime: Duration::days(secret_lifetime_days),
        }
    }

    /// Register a new client with grants for the requested servers.
    ///
    /// # Errors
    /// `invalid_request` when a requested server is missing or inactive,
    /// `invalid_redirect_uri` when any URI fails whitelist validation, or a
    /// storage error.
    pub async fn register(
        &self,
        request: RegisterClientRequest,
    ) -> AppResult<ClientRegistrationResponse> {
        // Every requested server must exist and be active
        let mut requested_servers: Vec<McpServer> = Vec::with_capacity(
            request.requested_server_ids.len(),
        );
        for server_id in &request.requested_server_ids {
            let server = self
                .servers
                .get_by_id(*server_id)
                .await?
                .filter(|s| s.is_active)
                .ok_or_else(|| {
                    AppError::invalid_request(format!("Server {server_id} not found or inactive."))
                })?;
            requested_servers.push(server);
        }

        // Callback URIs must pass every requested server's whitelist
        for server in &requested_servers {
            let result = self
                .callback_validator
                .validate(server.id, &request.redirect_uris)
                .await?;
            if !result.is_valid {
                return Err(AppError::invalid_redirect_uri(result.errors.join("; ")));
            }
        }

        // Independent cryptographically random credentials
        let client_id = self.hasher.generate_client_id()?;
        let client_secret = self.hasher.generate_client_secret()?;
        let registration_access_token = self.hasher.generate_registration_access_token()?;

        let secret_hash = self.hasher.hash(&client_secret).await?;
        let rat_hash = self.hasher.hash(&registration_access_token).await?;

        let mut registration = ClientRegistration::new(
            client_id.clone(),
            secret_hash,
            request.client_name.clone(),
            request.token_endpoint_auth_method.clone(),
            request.grant_types.clone(),
            request.redirect_uris.clone(),
            rat_hash,
        );
        registration.secret_expires_at = Some(Utc::now() + self.secret_lifetime);

        self.clients.add(&registration).await?;

        let mut granted_servers = Vec::with_capacity(requested_servers.len());
        for server in &requested_servers {
            let scopes = request
                .requested_scopes
                .get(&server.id)
                .cloned()
                .unwrap_or_default();
            let grant = ClientServerGrant::new(registration.id, server.id, scopes.clone());
            self.grants.add(&grant).await?;
            granted_servers.push(ServerGrantSummary {
                server_id: server.id,
                server_name: server.name.clone(),
                scopes,
                is_active: true,
            });
        }

        self.audit
            .add(&AuditLogEntry::new(
                audit_actions::CLIENT_REGISTERED,
                &client_id,
                Some(registration.id),
                None,
                Some(format!(
                    "Registered with access to servers: {}",
                    requested_servers
                        .iter()
                        .map(|s| s.name.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
            ))
            .await?;

        tracing::info!(client_id = %client_id, servers = requested_servers.len(), "client registered");

        Ok(ClientRegistrationResponse {
            client_id,
            client_secret: Some(client_secret),
            client_name: request.client_name,
            redirect_uris: request.redirect_uris,
            grant_types: request.grant_types,
            token_endpoint_auth_method: request.token_endpoint_auth_method,
            registration_access_token: Some(registration_access_token),
            client_secret_expires_at: registration.secret_expires_at,
            granted_servers,
        })
    }

    /// Current registration metadata, without secrets.
    ///
    /// # Errors
    /// `NotFound` when the client does not exist, or a storage error.
    pub async fn get(&self, client_id: &str) -> AppResult<ClientRegistrationResponse> {
        let registration = self
            .clients
            .get_by_client_id(client_id)
            .await?
            .ok_or_else(|| AppError::not_found("Client not found."))?;

        let granted_servers = self.grant_summaries(registration.id).await?;
        Ok(Self::metadata_response(&registration, granted_servers))
    }

    /// Update registration metadata and optionally grant additional servers.
    ///
    /// Re-requesting an already-granted server is a no-op, not an error.
    ///
    /// # Errors
    /// `NotFound` for an unknown client, `invalid_request` for an unknown
    /// additional server, `invalid_redirect_uri` on whitelist failure, or a
    /// storage error.
    pub async fn update(
        &self,
        client_id: &str,
        request: UpdateClientRequest,
    ) -> AppResult<ClientRegistrationResponse> {
        let mut registration = self
            .clients
            .get_by_client_id(client_id)
            .await?
            .ok_or_else(|| AppError::not_found("Client not found."))?;

        // Redirect URIs must satisfy every currently-granted server plus
        // every newly-requested one
        let existing_grants = self.grants.get_for_client(registration.id).await?;
        let mut server_ids: Vec<Uuid> = existing_grants
            .iter()
            .filter(|g| g.is_active)
            .map(|g| g.mcp_server_id)
            .collect();
        for server_id in &request.additional_server_ids {
            if !server_ids.contains(server_id) {
                server_ids.push(*server_id);
            }
        }

        for server_id in &server_ids {
            let result = self
                .callback_validator
                .validate(*server_id, &request.redirect_uris)
                .await?;
            if !result.is_valid {
                return Err(AppError::invalid_redirect_uri(result.errors.join("; ")));
            }
        }

        registration.update_metadata(
            request.client_name,
            request.redirect_uris,
            request.token_endpoint_auth_method,
            request.grant_types,
        );
        self.clients.update(&registration).await?;

        for server_id in &request.additional_server_ids {
            if self
                .grants
                .get_active(registration.id, *server_id)
                .await?
                .is_some()
            {
                continue;
            }

            let server = self
                .servers
                .get_by_id(*server_id)
                .await?
                .filter(|s| s.is_active)
                .ok_or_else(|| {
                    AppError::invalid_request(format!("Server {server_id} not found or inactive."))
                })?;

            let scopes = request
                .additional_scopes
                .get(server_id)
                .cloned()
                .unwrap_or_default();
            self.grants
                .add(&ClientServerGrant::new(registration.id, server.id, scopes))
                .await?;
        }

        self.audit
            .add(&AuditLogEntry::new(
                audit_actions::CLIENT_UPDATED,
                client_id,
                Some(registration.id),
                None,
                Some("Client metadata updated".to_owned()),
            ))
            .await?;

        let granted_servers = self.grant_summaries(registration.id).await?;
        Ok(Self::metadata_response(&registration, granted_servers))
    }

    /// Rotate the client's secret; the previous secret becomes permanently
    /// unverifiable.
    ///
    /// # Errors
    /// `NotFound` for an unknown client, or a storage error.
    pub async fn rotate_secret(&self, client_id: &str) -> AppResult<RotateSecretResponse> {
        let mut registration = self
            .clients
            .get_by_client_id(client_id)
            .await?
            .ok_or_else(|| AppError::not_found("Client not found."))?;

        let new_secret = self.hasher.generate_client_secret()?;
        let new_hash = self.hasher.hash(&new_secret).await?;
        let new_expiry = Some(Utc::now() + self.secret_lifetime);

        registration.rotate_secret(new_hash, new_expiry);
        self.clients.update(&registration).await?;

        self.audit
            .add(&AuditLogEntry::new(
                audit_actions::SECRET_ROTATED,
                client_id,
                Some(registration.id),
                None,
                Some("Client secret rotated".to_owned()),
            ))
            .await?;

        tracing::info!(client_id = %client_id, "client secret rotated");

        Ok(RotateSecretResponse {
            client_secret: new_secret,
            client_secret_expires_at: new_expiry,
        })
    }

    /// Revoke the registration and cascade to every active grant.
    /// Irreversible.
    ///
    /// # Errors
    /// `NotFound` for an unknown client, or a storage error.
    pub async fn revoke(&self, client_id: &str) -> AppResult<()> {
        let mut registration = self
            .clients
            .get_by_client_id(client_id)
            .await?
            .ok_or_else(|| AppError::not_found("Client not found."))?;

        registration.revoke();

        let grants = self.grants.get_for_client(registration.id).await?;
        for mut grant in grants.into_iter().filter(|g| g.is_active) {
            grant.revoke();
            self.grants.update(&grant).await?;
        }

        self.clients.update(&registration).await?;

        self.audit
            .add(&AuditLogEntry::new(
                audit_actions::CLIENT_REVOKED,
                client_id,
                Some(registration.id),
                None,
                Some("Client registration revoked".to_owned()),
            ))
            .await?;

        tracing::info!(client_id = %client_id, "client registration revoked");
        Ok(())
    }

    /// Grant a client access to one server (admin operation).
    ///
    /// # Errors
    /// `NotFound` for an unknown client or server, `Conflict` when an
    /// active grant already exists, or a storage error.
    pub async fn grant_server_access(
        &self,
        client_id: &str,
        server_id: Uuid,
        scopes: Vec<String>,
    ) -> AppResult<ServerGrantSummary> {
        let registration = self
            .clients
            .get_by_client_id(client_id)
            .await?
            .ok_or_else(|| AppError::not_found("Client not found."))?;

        let server = self
            .servers
            .get_by_id(server_id)
            .await?
            .ok_or_else(|| AppError::not_found("Server not found."))?;

        if self
            .grants
            .get_active(registration.id, server_id)
            .await?
            .is_some()
        {
            return Err(AppError::conflict("Grant already exists."));
        }

        let grant = ClientServerGrant::new(registration.id, server_id, scopes.clone());
        self.grants.add(&grant).await?;

        self.audit
            .add(&AuditLogEntry::new(
                audit_actions::SERVER_ACCESS_GRANTED,
                client_id,
                Some(registration.id),
                Some(server_id),
                Some(format!("Granted access to server {}", server.name)),
            ))
            .await?;

        Ok(ServerGrantSummary {
            server_id,
            server_name: server.name,
            scopes,
            is_active: true,
        })
    }

    /// Deactivate a client's grant for one server (admin operation).
    ///
    /// # Errors
    /// `NotFound` for an unknown client or when no active grant exists,
    /// or a storage error.
    pub async fn revoke_server_access(&self, client_id: &str, server_id: Uuid) -> AppResult<()> {
        let registration = self
            .clients
            .get_by_client_id(client_id)
            .await?
            .ok_or_else(|| AppError::not_found("Client not found."))?;

        let mut grant = self
            .grants
            .get_active(registration.id, server_id)
            .await?
            .ok_or_else(|| AppError::not_found("Grant not found."))?;

        grant.revoke();
        self.grants.update(&grant).await?;

        self.audit
            .add(&AuditLogEntry::new(
                audit_actions::SERVER_ACCESS_REVOKED,
                client_id,
                Some(registration.id),
                Some(server_id),
                Some("Server access revoked".to_owned()),
            ))
            .await?;

        Ok(())
    }

    async fn grant_summaries(&self, registration_id: Uuid) -> AppResult<Vec<ServerGrantSummary>> {
        let grants = self.grants.get_for_client(registration_id).await?;
        let mut summaries = Vec::with_capacity(grants.len());
        for grant in grants {
            let server_name = self
                .servers
                .get_by_id(grant.mcp_server_id)
                .await?
                .map_or_else(|| "unknown".to_owned(), |s| s.name);
            summaries.push(ServerGrantSummary {
                server_id: grant.mcp_server_id,
                server_name,
                scopes: grant.scopes,
                is_active: grant.is_active,
            });
        }
        Ok(summaries)
    }

    fn metadata_response(
        registration: &ClientRegistration,
        granted_servers: Vec<ServerGrantSummary>,
    ) -> ClientRegistrationResponse {
        ClientRegistrationResponse {
            client_id: registration.client_id.clone(),
            client_secret: None,
            client_name: registration.client_name.clone(),
            redirect_uris: registration.redirect_uris.clone(),
            grant_types: registration.grant_types.clone(),
            token_endpoint_auth_method: registration.token_endpoint_auth_method.clone(),
            registration_access_token: None,
            client_secret_expires_at: registration.secret_expires_at,
            granted_servers,
        }
    }
}
