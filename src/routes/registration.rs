// ABOUTME: Registration endpoint handlers for RFC 7591-style client management
// ABOUTME: Self-service operations are authenticated with the registration access token
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use crate::context::AppContext;
use crate::errors::{AppError, AppResult};
use crate::registration::{
    ClientRegistrationResponse, RegisterClientRequest, UpdateClientRequest,
};
use crate::validation::{validate_register_request, validate_update_request};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use std::sync::Arc;

/// Handle `POST /register`
pub async fn handle_register(
    State(context): State<Arc<AppContext>>,
    Json(request): Json<RegisterClientRequest>,
) -> AppResult<impl IntoResponse> {
    let errors = validate_register_request(&request);
    if !errors.is_empty() {
        return Err(AppError::invalid_request(errors.join(" ")));
    }

    let response = context.registration.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Handle `GET /register/{client_id}`
pub async fn handle_get(
    State(context): State<Arc<AppContext>>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<Json<ClientRegistrationResponse>> {
    require_registration_access_token(&context, &client_id, &headers).await?;
    Ok(Json(context.registration.get(&client_id).await?))
}

/// Handle `PUT /register/{client_id}`
pub async fn handle_update(
    State(context): State<Arc<AppContext>>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<UpdateClientRequest>,
) -> AppResult<Json<ClientRegistrationResponse>> {
    require_registration_access_token(&context, &client_id, &headers).await?;

    let errors = validate_update_request(&request);
    if !errors.is_empty() {
        return Err(AppError::invalid_request(errors.join(" ")));
    }

    Ok(Json(context.registration.update(&client_id, request).await?))
}

/// Handle `DELETE /register/{client_id}`
pub async fn handle_revoke(
    State(context): State<Arc<AppContext>>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> AppResult<StatusCode> {
    require_registration_access_token(&context, &client_id, &headers).await?;
    context.registration.revoke(&client_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Verify the `Authorization: Bearer <registration_access_token>` header
/// against the stored hash for an Active client.
async fn require_registration_access_token(
    context: &AppContext,
    client_id: &str,
    headers: &HeaderMap,
) -> AppResult<()> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            // Case-insensitive scheme match per RFC 7235
            let (scheme, rest) = v.split_once(' ')?;
            scheme.eq_ignore_ascii_case("Bearer").then(|| rest.trim())
        })
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthorized("A registration access token is required."))?;

    let registration = context.clients.get_by_client_id(client_id).await?;
    let Some(registration) = registration.filter(crate::models::ClientRegistration::is_active)
    else {
        // Burn a verification so unknown client ids cost the same
        context
            .hasher
            .verify("dummy", crate::crypto::DUMMY_HASH)
            .await;
        return Err(AppError::unauthorized("Invalid registration access token."));
    };

    if !context
        .hasher
        .verify(token, &registration.registration_access_token_hash)
        .await
    {
        tracing::warn!(client_id = %client_id, "registration access token verification failed");
        return Err(AppError::unauthorized("Invalid registration access token."));
    }

    Ok(())
}
