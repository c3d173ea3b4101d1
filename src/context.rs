// ABOUTME: Explicit constructor-style wiring of the server's components
// ABOUTME: Builds the repositories, crypto services, and engines behind one shared context
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use crate::callback::CallbackValidator;
use crate::config::ServerConfig;
use crate::crypto::{SecretHasher, SigningKeyManager};
use crate::database::{
    AuditLogRepository, CallbackWhitelistRepository, ClientRegistrationRepository,
    ClientServerGrantRepository, Database, McpServerRepository,
};
use crate::errors::AppResult;
use crate::idp::{IdpTokenValidator, OidcTokenValidator};
use crate::registration::RegistrationService;
use crate::token_generator::TokenGenerator;
use crate::token_issuance::TokenIssuanceEngine;
use crate::user_access::UserServerAuthorization;
use std::sync::Arc;

/// Shared state handed to every route handler
pub struct AppContext {
    /// Server configuration
    pub config: Arc<ServerConfig>,
    /// The signing key, read-only after startup
    pub keys: Arc<SigningKeyManager>,
    /// Secret hashing with bounded concurrency
    pub hasher: Arc<SecretHasher>,
    /// Client registration lifecycle
    pub registration: Arc<RegistrationService>,
    /// Token issuance engine
    pub token_engine: Arc<TokenIssuanceEngine>,
    /// Client registration storage
    pub clients: Arc<dyn ClientRegistrationRepository>,
    /// MCP server storage
    pub servers: Arc<dyn McpServerRepository>,
    /// Whitelist storage, used by seeding
    pub whitelist: Arc<dyn CallbackWhitelistRepository>,
}

impl AppContext {
    /// Wire all components against the given database and signing key.
    ///
    /// # Errors
    /// Returns an error if the identity-provider HTTP client cannot be
    /// constructed.
    pub fn new(
        config: Arc<ServerConfig>,
        database: Arc<Database>,
        keys: Arc<SigningKeyManager>,
    ) -> AppResult<Self> {
        let clients: Arc<dyn ClientRegistrationRepository> = database.clone();
        let servers: Arc<dyn McpServerRepository> = database.clone();
        let grants: Arc<dyn ClientServerGrantRepository> = database.clone();
        let whitelist: Arc<dyn CallbackWhitelistRepository> = database.clone();
        let audit: Arc<dyn AuditLogRepository> = database;

        let hasher = Arc::new(SecretHasher::new(config.max_concurrent_hashes));
        let callback_validator = Arc::new(CallbackValidator::new(whitelist.clone()));
        let token_generator = Arc::new(TokenGenerator::new(config.issuer_base(), keys.clone()));
        let idp_validator: Arc<dyn IdpTokenValidator> =
            Arc::new(OidcTokenValidator::new(config.auth_server.clone())?);
        let user_authorization = Arc::new(UserServerAuthorization::new(&config.auth_server));

        let registration = Arc::new(RegistrationService::new(
            clients.clone(),
            servers.clone(),
            grants.clone(),
            audit.clone(),
            hasher.clone(),
            callback_validator,
            config.secret_lifetime_days,
        ));

        let token_engine = Arc::new(TokenIssuanceEngine::new(
            clients.clone(),
            servers.clone(),
            grants,
            audit,
            hasher.clone(),
            token_generator,
            idp_validator,
            user_authorization,
            config.token_lifetime_minutes,
        ));

        Ok(Self {
            config,
            keys,
            hasher,
            registration,
            token_engine,
            clients,
            servers,
            whitelist,
        })
    }
}
