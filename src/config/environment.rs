// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables and runtime configuration parsing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! Environment-based configuration management for production deployment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

/// Strongly typed log level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Errors only
    Error,
    /// Warnings and errors
    Warn,
    /// Default operational level
    #[default]
    Info,
    /// Verbose debugging
    Debug,
    /// Full tracing
    Trace,
}

impl LogLevel {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "error" => Self::Error,
            "warn" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warn => write!(f, "warn"),
            Self::Info => write!(f, "info"),
            Self::Debug => write!(f, "debug"),
            Self::Trace => write!(f, "trace"),
        }
    }
}

/// Log output format options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// `JSON` format for production logging
    Json,
    /// Pretty format for development
    #[default]
    Pretty,
}

/// Per-server claim mapping for user token exchange
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerClaimMapping {
    /// Roles a user must hold (any one suffices); empty means everyone
    #[serde(default)]
    pub required_roles: Vec<String>,
    /// Scopes granted when the user does not request a narrower set
    #[serde(default)]
    pub default_scopes: Vec<String>,
}

/// Upstream identity-provider settings for the JWT-bearer exchange grant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthServerConfig {
    /// Issuer URL of the upstream identity provider
    pub authority: Option<String>,
    /// Expected audience of user assertions
    #[serde(default)]
    pub audience: String,
    /// Explicit metadata URL; defaults to `{authority}/.well-known/openid-configuration`
    pub metadata_url: Option<String>,
    /// Claim type carrying the user's server-access roles
    #[serde(default = "default_claim_type")]
    pub server_access_claim_type: String,
    /// Role marking a user as an Mcpd administrator
    #[serde(default = "default_admin_role")]
    pub admin_role: String,
    /// How long fetched signing-key metadata stays cached, in seconds
    #[serde(default = "default_key_cache_ttl")]
    pub key_cache_ttl_secs: u64,
    /// Timeout for metadata and key fetches, in seconds
    #[serde(default = "default_http_timeout")]
    pub http_timeout_secs: u64,
    /// Claim mapping per MCP server name
    #[serde(default)]
    pub server_mappings: HashMap<String, ServerClaimMapping>,
}

fn default_claim_type() -> String {
    "roles".to_owned()
}

fn default_admin_role() -> String {
    "mcpd.admin".to_owned()
}

const fn default_key_cache_ttl() -> u64 {
    3600
}

const fn default_http_timeout() -> u64 {
    10
}

/// One MCP server seeded at startup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedServerConfig {
    /// Unique server name
    pub name: String,
    /// Human-readable description
    #[serde(default)]
    pub description: String,
    /// Base URI of the resource server
    pub base_uri: String,
    /// Redirect-URI patterns whitelisted for this server
    #[serde(default)]
    pub callback_whitelist: Vec<String>,
}

/// Server configuration assembled from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Database connection string
    pub database_url: String,
    /// Token issuer URL, also the server's external base URL
    pub issuer: String,
    /// Optional PKCS#8 PEM file holding the RSA signing key
    pub signing_key_path: Option<PathBuf>,
    /// API key guarding the admin surface; unset disables admin routes
    pub admin_api_key: Option<String>,
    /// Access token lifetime in minutes
    pub token_lifetime_minutes: i64,
    /// Client secret lifetime in days
    pub secret_lifetime_days: i64,
    /// Upper bound on concurrent Argon2 hash operations
    pub max_concurrent_hashes: usize,
    /// Log level
    pub log_level: LogLevel,
    /// Log output format
    pub log_format: LogFormat,
    /// Upstream identity-provider settings
    pub auth_server: AuthServerConfig,
    /// Servers seeded into the database at startup
    pub seed_servers: Vec<SeedServerConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns an error when a numeric variable fails to parse or a
    /// JSON-valued variable (`MCPD_SERVER_MAPPINGS`, `MCPD_SEED_SERVERS`)
    /// is malformed.
    pub fn from_env() -> Result<Self> {
        let http_port = parse_env("MCPD_HTTP_PORT", 8080_u16)?;
        let database_url =
            env::var("MCPD_DATABASE_URL").unwrap_or_else(|_| "sqlite:mcpd.db".to_owned());
        let issuer = env::var("MCPD_ISSUER")
            .unwrap_or_else(|_| format!("http://localhost:{http_port}"));

        let auth_server = AuthServerConfig {
            authority: env::var("MCPD_AUTH_AUTHORITY").ok(),
            audience: env::var("MCPD_AUTH_AUDIENCE").unwrap_or_default(),
            metadata_url: env::var("MCPD_AUTH_METADATA_URL").ok(),
            server_access_claim_type: env::var("MCPD_AUTH_CLAIM_TYPE")
                .unwrap_or_else(|_| default_claim_type()),
            admin_role: env::var("MCPD_AUTH_ADMIN_ROLE").unwrap_or_else(|_| default_admin_role()),
            key_cache_ttl_secs: parse_env("MCPD_AUTH_KEY_CACHE_TTL_SECS", default_key_cache_ttl())?,
            http_timeout_secs: parse_env("MCPD_AUTH_HTTP_TIMEOUT_SECS", default_http_timeout())?,
            server_mappings: parse_json_env("MCPD_SERVER_MAPPINGS")?,
        };

        Ok(Self {
            http_port,
            database_url,
            issuer,
            auth_server,
            signing_key_path: env::var("MCPD_SIGNING_KEY_PATH").ok().map(PathBuf::from),
            admin_api_key: env::var("MCPD_ADMIN_API_KEY").ok().filter(|k| !k.is_empty()),
            token_lifetime_minutes: parse_env(
                "MCPD_TOKEN_LIFETIME_MINUTES",
                crate::constants::DEFAULT_TOKEN_LIFETIME_MINUTES,
            )?,
            secret_lifetime_days: parse_env(
                "MCPD_SECRET_LIFETIME_DAYS",
                crate::constants::DEFAULT_SECRET_LIFETIME_DAYS,
            )?,
            max_concurrent_hashes: parse_env("MCPD_MAX_CONCURRENT_HASHES", 8_usize)?,
            log_level: LogLevel::from_str_or_default(
                &env::var("MCPD_LOG_LEVEL").unwrap_or_default(),
            ),
            log_format: match env::var("MCPD_LOG_FORMAT").as_deref() {
                Ok("json") => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
            seed_servers: parse_json_env("MCPD_SEED_SERVERS")?,
        })
    }

    /// The issuer URL without a trailing slash
    #[must_use]
    pub fn issuer_base(&self) -> &str {
        self.issuer.trim_end_matches('/')
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw}")),
        Err(_) => Ok(default),
    }
}

fn parse_json_env<T: serde::de::DeserializeOwned + Default>(name: &str) -> Result<T> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => {
            serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {name}"))
        }
        _ => Ok(T::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_parses_known_values() {
        assert_eq!(LogLevel::from_str_or_default("warn"), LogLevel::Warn);
        assert_eq!(LogLevel::from_str_or_default("TRACE"), LogLevel::Trace);
        assert_eq!(LogLevel::from_str_or_default("bogus"), LogLevel::Info);
    }

    #[test]
    fn claim_mapping_deserializes_with_defaults() {
        let mapping: ServerClaimMapping = serde_json::from_str("{}").unwrap();
        assert!(mapping.required_roles.is_empty());
        assert!(mapping.default_scopes.is_empty());
    }
}
