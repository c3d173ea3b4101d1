// ABOUTME: Main library entry point for the Mcpd authorization server
// ABOUTME: Provides dynamic client registration and token issuance for MCP resource servers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

#![deny(unsafe_code)]

//! # Mcpd
//!
//! A dynamic-client-registration and token-issuance authority for MCP
//! resource servers. Mcpd registers OAuth-style clients, tracks which
//! downstream MCP servers each client may call and under what scopes, and
//! issues RS256-signed access tokens after verifying credentials.
//!
//! ## Features
//!
//! - **RFC 7591-style registration**: self-service client registration with
//!   one-time plaintext credentials and a registration access token
//! - **Per-server grants**: every client/server edge carries its own bounded
//!   scope set
//! - **Two grant types**: `client_credentials` for confidential clients and
//!   JWT-bearer exchange for end users bringing an identity-provider token
//! - **JWKS publication**: resource servers verify tokens against
//!   `/.well-known/jwks.json`
//!
//! ## Architecture
//!
//! The server follows a modular architecture:
//! - **Registration**: client lifecycle (register, update, rotate, revoke)
//! - **Token issuance**: the two grant protocols and their decision procedures
//! - **Crypto**: Argon2id secret hashing and the RS256 signing key
//! - **Callback**: redirect-URI whitelist pattern matching
//! - **Database**: repository traits and the SQLite backing store
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mcpd::config::ServerConfig;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Mcpd configured with issuer: {}", config.issuer);
//!     Ok(())
//! }
//! ```

/// Redirect-URI whitelist pattern matching
pub mod callback;

/// Environment-based server configuration
pub mod config;

/// Shared constants and the process-wide configuration handle
pub mod constants;

/// Explicit constructor-style wiring of the server's components
pub mod context;

/// Argon2id secret hashing and RS256 signing key management
pub mod crypto;

/// Repository traits and the SQLite backing store
pub mod database;

/// Unified error handling with the OAuth error taxonomy
pub mod errors;

/// Upstream identity-provider token validation
pub mod idp;

/// Structured logging setup
pub mod logging;

/// Domain entities
pub mod models;

/// Client registration lifecycle service
pub mod registration;

/// `HTTP` route handlers
pub mod routes;

/// Startup seeding of MCP servers and callback whitelists
pub mod seed;

/// Signed access-token construction
pub mod token_generator;

/// Token issuance engine for both grant types
pub mod token_issuance;

/// Claim-to-scope authorization mapping for user token exchange
pub mod user_access;

/// Aggregated request validation for registration payloads
pub mod validation;
