// ABOUTME: Admin route handlers for server and grant administration
// ABOUTME: Guarded by a constant-time X-Api-Key check; disabled when no key is configured
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use crate::context::AppContext;
use crate::errors::{AppError, AppResult};
use crate::models::{ClientStatus, McpServer};
use crate::registration::{RotateSecretResponse, ServerGrantSummary};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use uuid::Uuid;

/// Body of a grant-access request
#[derive(Debug, Default, Deserialize)]
pub struct GrantAccessRequest {
    /// Scopes for the new grant; defaults to an empty set
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// One client in a server's client listing
#[derive(Debug, Serialize)]
pub struct ServerClientSummary {
    /// Public client identifier
    pub client_id: String,
    /// Display name
    pub client_name: String,
    /// Lifecycle status
    pub status: ClientStatus,
}

/// Handle `GET /admin/servers`
pub async fn handle_list_servers(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<McpServer>>> {
    require_admin(&context, &headers)?;
    Ok(Json(context.servers.list().await?))
}

/// Handle `GET /admin/servers/{server_id}/clients`
pub async fn handle_list_server_clients(
    State(context): State<Arc<AppContext>>,
    Path(server_id): Path<Uuid>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<ServerClientSummary>>> {
    require_admin(&context, &headers)?;

    let clients = context.clients.list_for_server(server_id).await?;
    Ok(Json(
        clients
            .into_iter()
            .map(|c| ServerClientSummary {
                client_id: c.client_id,
                client_name: c.client_name,
                status: c.status,
            })
            .collect(),
    ))
}

/// Handle `POST /admin/clients/{client_id}/servers/{server_id}`
pub async fn handle_grant_access(
    State(context): State<Arc<AppContext>>,
    Path((client_id, server_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    body: Option<Json<GrantAccessRequest>>,
) -> AppResult<Json<ServerGrantSummary>> {
    require_admin(&context, &headers)?;

    let scopes = body.map(|Json(b)| b.scopes).unwrap_or_default();
    let summary = context
        .registration
        .grant_server_access(&client_id, server_id, scopes)
        .await?;
    Ok(Json(summary))
}

/// Handle `DELETE /admin/clients/{client_id}/servers/{server_id}`
pub async fn handle_revoke_access(
    State(context): State<Arc<AppContext>>,
    Path((client_id, server_id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    require_admin(&context, &headers)?;
    context
        .registration
        .revoke_server_access(&client_id, server_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handle `POST /admin/clients/{client_id}/rotate-secret`.
///
/// Callable with no request body; rotation is idempotent in effect.
pub async fn handle_rotate_secret(
    State(context): State<Arc<AppContext>>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<RotateSecretResponse>> {
    require_admin(&context, &headers)?;
    Ok(Json(context.registration.rotate_secret(&client_id).await?))
}

/// Check the `X-Api-Key` header against the configured admin key in
/// constant time. Admin routes are disabled entirely when no key is set.
fn require_admin(context: &AppContext, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = context.config.admin_api_key.as_deref() else {
        return Err(AppError::unauthorized("Admin API is not configured."));
    };

    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if presented.as_bytes().ct_eq(expected.as_bytes()).into() {
        Ok(())
    } else {
        tracing::warn!("admin API key check failed");
        Err(AppError::unauthorized("Invalid admin API key."))
    }
}
