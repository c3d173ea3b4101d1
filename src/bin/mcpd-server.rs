// ABOUTME: Server binary for the Mcpd authorization server
// ABOUTME: Wires configuration, storage, signing keys, and the HTTP listener
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! # Mcpd Server Binary
//!
//! Starts the dynamic-client-registration and token-issuance authority:
//! loads environment configuration, migrates and seeds the database,
//! prepares the RS256 signing key, and serves the HTTP API.

use anyhow::{Context, Result};
use clap::Parser;
use mcpd::{
    config::ServerConfig, constants, context::AppContext, crypto::SigningKeyManager,
    database::Database, logging, routes, seed,
};
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "mcpd-server")]
#[command(about = "Mcpd - dynamic client registration and token issuance for MCP servers")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Fall back to defaults when argument parsing fails (container entrypoints)
    let args = Args::try_parse().unwrap_or(Args { http_port: None });

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    let config = Arc::new(config);

    logging::init(&config);
    constants::init_server_config(config.clone());

    let database = Arc::new(Database::new(&config.database_url).await?);
    database.migrate().await?;

    let keys = match &config.signing_key_path {
        Some(path) => {
            info!(path = %path.display(), "loading signing key from PEM file");
            Arc::new(SigningKeyManager::from_pem_file(path)?)
        }
        None => {
            info!("generating ephemeral RSA signing key");
            Arc::new(SigningKeyManager::generate()?)
        }
    };

    let context = Arc::new(AppContext::new(config.clone(), database, keys)?);

    seed::seed_servers(&context.servers, &context.whitelist, &config.seed_servers).await?;

    let router = routes::router(context);

    let addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(addr = %addr, issuer = %config.issuer, "mcpd server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("mcpd server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install shutdown signal handler");
    }
}
