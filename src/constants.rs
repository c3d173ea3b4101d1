// ABOUTME: Shared protocol constants and the process-wide configuration handle
// ABOUTME: Centralizes grant type tags, auth method names, and default lifetimes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use crate::config::ServerConfig;
use std::sync::{Arc, OnceLock};

/// Grant type tags recognized by the token endpoint
pub mod grant_types {
    /// OAuth 2.0 client credentials grant
    pub const CLIENT_CREDENTIALS: &str = "client_credentials";
    /// RFC 7523 JWT bearer token exchange grant
    pub const JWT_BEARER: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
}

/// Token endpoint client authentication methods
pub mod auth_methods {
    /// Credentials in the form body
    pub const CLIENT_SECRET_POST: &str = "client_secret_post";
    /// Credentials in the HTTP Basic authorization header
    pub const CLIENT_SECRET_BASIC: &str = "client_secret_basic";
}

/// Audit action tags written by the lifecycle and issuance services
pub mod audit_actions {
    /// A new client registration was created
    pub const CLIENT_REGISTERED: &str = "client_registered";
    /// Client metadata was updated
    pub const CLIENT_UPDATED: &str = "client_updated";
    /// A client secret was rotated
    pub const SECRET_ROTATED: &str = "secret_rotated";
    /// A client registration was revoked
    pub const CLIENT_REVOKED: &str = "client_revoked";
    /// A server grant was created for a client
    pub const SERVER_ACCESS_GRANTED: &str = "server_access_granted";
    /// A server grant was deactivated
    pub const SERVER_ACCESS_REVOKED: &str = "server_access_revoked";
    /// A client-credentials access token was issued
    pub const TOKEN_ISSUED: &str = "token_issued";
    /// A user token exchange produced an access token
    pub const USER_TOKEN_ISSUED: &str = "user_token_issued";
}

/// Default access token lifetime in minutes
pub const DEFAULT_TOKEN_LIFETIME_MINUTES: i64 = 60;

/// Default client secret lifetime in days
pub const DEFAULT_SECRET_LIFETIME_DAYS: i64 = 90;

/// Maximum accepted `client_name` length
pub const MAX_CLIENT_NAME_LENGTH: usize = 256;

/// Clock skew tolerance when validating upstream identity-provider tokens
pub const IDP_CLOCK_SKEW_SECS: u64 = 120;

static SERVER_CONFIG: OnceLock<Arc<ServerConfig>> = OnceLock::new();

/// Install the process-wide configuration at startup.
///
/// Later calls are no-ops; the first configuration wins. Components that
/// cannot carry injected state (error response rendering) read it through
/// [`try_get_server_config`].
pub fn init_server_config(config: Arc<ServerConfig>) {
    let _ = SERVER_CONFIG.set(config);
}

/// Get the process-wide configuration, if initialized
#[must_use]
pub fn try_get_server_config() -> Option<Arc<ServerConfig>> {
    SERVER_CONFIG.get().cloned()
}
