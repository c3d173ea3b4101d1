// ABOUTME: Repository traits and the SQLite-backed database implementation
// ABOUTME: The core services depend on the traits only; SQLite is the backing-store choice
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! Persistence layer
//!
//! The authorization core is written against the narrow repository traits
//! in this module; [`Database`] is the SQLite implementation behind them.
//! Uniqueness of `client_id` and of active `(client, server)` grants is
//! enforced with unique indexes, so a concurrent insert racing past the
//! services' optimistic checks is rejected by storage rather than silently
//! duplicated. Entities are re-read per operation; nothing is cached
//! across requests.

mod audit;
mod clients;
mod grants;
mod servers;
mod whitelist;

use crate::errors::{AppError, AppResult};
use crate::models::{
    AuditLogEntry, CallbackWhitelistEntry, ClientRegistration, ClientServerGrant, McpServer,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use uuid::Uuid;

/// Storage for client registrations
#[async_trait]
pub trait ClientRegistrationRepository: Send + Sync {
    /// Insert a new registration; fails on duplicate `client_id`
    async fn add(&self, registration: &ClientRegistration) -> AppResult<()>;
    /// Look up by public client id
    async fn get_by_client_id(&self, client_id: &str) -> AppResult<Option<ClientRegistration>>;
    /// Look up by surrogate id
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ClientRegistration>>;
    /// Persist the current state of a registration
    async fn update(&self, registration: &ClientRegistration) -> AppResult<()>;
    /// All registrations holding an active grant for a server
    async fn list_for_server(&self, server_id: Uuid) -> AppResult<Vec<ClientRegistration>>;
}

/// Storage for MCP resource servers
#[async_trait]
pub trait McpServerRepository: Send + Sync {
    /// Insert a new server; fails on duplicate name
    async fn add(&self, server: &McpServer) -> AppResult<()>;
    /// Look up by id
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<McpServer>>;
    /// Look up by unique name
    async fn get_by_name(&self, name: &str) -> AppResult<Option<McpServer>>;
    /// All servers, active and deactivated
    async fn list(&self) -> AppResult<Vec<McpServer>>;
    /// Persist the current state of a server
    async fn update(&self, server: &McpServer) -> AppResult<()>;
}

/// Storage for client/server grants
#[async_trait]
pub trait ClientServerGrantRepository: Send + Sync {
    /// Insert a new grant; fails when an active grant already exists for
    /// the same `(client, server)` pair
    async fn add(&self, grant: &ClientServerGrant) -> AppResult<()>;
    /// The active grant for a `(client, server)` pair, if any
    async fn get_active(
        &self,
        client_registration_id: Uuid,
        mcp_server_id: Uuid,
    ) -> AppResult<Option<ClientServerGrant>>;
    /// All grants of a client, active and revoked
    async fn get_for_client(
        &self,
        client_registration_id: Uuid,
    ) -> AppResult<Vec<ClientServerGrant>>;
    /// Persist the current state of a grant
    async fn update(&self, grant: &ClientServerGrant) -> AppResult<()>;
}

/// Storage for callback whitelist entries
#[async_trait]
pub trait CallbackWhitelistRepository: Send + Sync {
    /// Insert a new whitelist entry
    async fn add(&self, entry: &CallbackWhitelistEntry) -> AppResult<()>;
    /// Active entries for a server
    async fn get_active_for_server(
        &self,
        server_id: Uuid,
    ) -> AppResult<Vec<CallbackWhitelistEntry>>;
}

/// Append-only audit log storage
#[async_trait]
pub trait AuditLogRepository: Send + Sync {
    /// Append one entry; entries are never mutated or deleted
    async fn add(&self, entry: &AuditLogEntry) -> AppResult<()>;
}

/// SQLite-backed implementation of every repository trait
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database at `database_url`.
    ///
    /// In-memory databases are pinned to a single connection so every
    /// query sees the same store.
    ///
    /// # Errors
    /// Returns an error when the URL is malformed or the database cannot
    /// be opened.
    pub async fn new(database_url: &str) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(AppError::Database)?
            .create_if_missing(true);

        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Run schema migration; idempotent.
    ///
    /// # Errors
    /// Returns an error if any DDL statement fails.
    pub async fn migrate(&self) -> AppResult<()> {
        self.migrate_clients().await?;
        self.migrate_servers().await?;
        self.migrate_grants().await?;
        self.migrate_whitelist().await?;
        self.migrate_audit().await?;
        tracing::debug!("database schema migrated");
        Ok(())
    }

    /// The underlying connection pool
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
