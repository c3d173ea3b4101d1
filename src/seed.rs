// ABOUTME: Startup seeding of MCP servers and their callback whitelists
// ABOUTME: Upserts configured servers; existing servers only gain new whitelist patterns
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use crate::config::SeedServerConfig;
use crate::database::{CallbackWhitelistRepository, McpServerRepository};
use crate::errors::AppResult;
use crate::models::{CallbackWhitelistEntry, McpServer};
use std::sync::Arc;

/// Seed the configured MCP servers and whitelist patterns.
///
/// Idempotent: servers are matched by name, and a whitelist pattern is only
/// added when the server does not already carry it.
///
/// # Errors
/// Returns an error on storage failure.
pub async fn seed_servers(
    servers: &Arc<dyn McpServerRepository>,
    whitelist: &Arc<dyn CallbackWhitelistRepository>,
    seed: &[SeedServerConfig],
) -> AppResult<()> {
    for config in seed {
        let server = match servers.get_by_name(&config.name).await? {
            Some(existing) => existing,
            None => {
                let server = McpServer::new(
                    config.name.clone(),
                    config.description.clone(),
                    config.base_uri.clone(),
                );
                servers.add(&server).await?;
                tracing::info!(server = %server.name, "seeded MCP server");
                server
            }
        };

        let existing_patterns: Vec<String> = whitelist
            .get_active_for_server(server.id)
            .await?
            .into_iter()
            .map(|e| e.pattern)
            .collect();

        for pattern in &config.callback_whitelist {
            if existing_patterns.contains(pattern) {
                continue;
            }
            whitelist
                .add(&CallbackWhitelistEntry::new(server.id, pattern.clone()))
                .await?;
            tracing::debug!(server = %server.name, pattern = %pattern, "seeded whitelist pattern");
        }
    }

    Ok(())
}
