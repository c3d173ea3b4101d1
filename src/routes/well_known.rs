// ABOUTME: Discovery metadata and JWKS route handlers
// ABOUTME: Publishes the signing keys and authorization-server metadata documents
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use crate::constants::{auth_methods, grant_types};
use crate::context::AppContext;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Handle `GET /.well-known/jwks.json`.
///
/// The document changes only on restart, so it is served with an ETag
/// derived from its content and honors `If-None-Match`.
pub async fn handle_jwks(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Response {
    let jwks = context.keys.jwks();
    tracing::debug!(keys = jwks.keys.len(), "JWKS endpoint accessed");

    let Ok(jwks_json) = serde_json::to_string(&jwks) else {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    };

    let mut hasher = Sha256::new();
    hasher.update(jwks_json.as_bytes());
    let hash = hasher.finalize();
    let etag = format!("\"{}\"", hex::encode(&hash[..16]));

    if let Some(client_etag) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
    {
        if client_etag == etag {
            return (
                StatusCode::NOT_MODIFIED,
                [(header::ETAG, etag)],
            )
                .into_response();
        }
    }

    (
        [
            (header::CACHE_CONTROL, "public, max-age=3600".to_owned()),
            (header::ETAG, etag),
        ],
        Json(jwks),
    )
        .into_response()
}

/// Handle `GET /.well-known/oauth-authorization-server` and
/// `GET /.well-known/openid-configuration` (RFC 8414).
pub async fn handle_metadata(State(context): State<Arc<AppContext>>) -> Json<serde_json::Value> {
    let issuer = context.config.issuer_base();

    // Advertise the union of all configured per-server scopes
    let scopes_supported: BTreeSet<&str> = context
        .config
        .auth_server
        .server_mappings
        .values()
        .flat_map(|m| m.default_scopes.iter().map(String::as_str))
        .collect();

    Json(serde_json::json!({
        "issuer": issuer,
        "token_endpoint": format!("{issuer}/token"),
        "registration_endpoint": format!("{issuer}/register"),
        "jwks_uri": format!("{issuer}/.well-known/jwks.json"),
        "grant_types_supported": [
            grant_types::CLIENT_CREDENTIALS,
            grant_types::JWT_BEARER
        ],
        "token_endpoint_auth_methods_supported": [
            auth_methods::CLIENT_SECRET_POST,
            auth_methods::CLIENT_SECRET_BASIC
        ],
        "scopes_supported": scopes_supported,
    }))
}
