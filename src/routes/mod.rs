// ABOUTME: HTTP route composition for the authorization server
// ABOUTME: Assembles well-known, registration, token, admin, and health routes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! HTTP boundary
//!
//! Thin axum handlers over the core services: they bind request bodies,
//! run aggregated validation, and map typed errors to JSON responses. All
//! authorization decisions live in the services, not here.

/// Admin surface guarded by the API key
pub mod admin;
/// Liveness endpoints
pub mod health;
/// Registration endpoints (RFC 7591 style)
pub mod registration;
/// Token endpoint
pub mod token;
/// Discovery metadata and JWKS
pub mod well_known;

use crate::context::AppContext;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Build the full application router
pub fn router(context: Arc<AppContext>) -> Router {
    Router::new()
        .route("/register", post(registration::handle_register))
        .route(
            "/register/:client_id",
            get(registration::handle_get)
                .put(registration::handle_update)
                .delete(registration::handle_revoke),
        )
        .route("/token", post(token::handle_token))
        .route("/.well-known/jwks.json", get(well_known::handle_jwks))
        .route(
            "/.well-known/oauth-authorization-server",
            get(well_known::handle_metadata),
        )
        .route(
            "/.well-known/openid-configuration",
            get(well_known::handle_metadata),
        )
        .route("/admin/servers", get(admin::handle_list_servers))
        .route(
            "/admin/servers/:server_id/clients",
            get(admin::handle_list_server_clients),
        )
        .route(
            "/admin/clients/:client_id/servers/:server_id",
            post(admin::handle_grant_access).delete(admin::handle_revoke_access),
        )
        .route(
            "/admin/clients/:client_id/rotate-secret",
            post(admin::handle_rotate_secret),
        )
        .merge(health::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}
