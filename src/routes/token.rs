// ABOUTME: Token endpoint handler for both grant types
// ABOUTME: Parses form credentials (body or HTTP Basic) and maps issuance results to JSON
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use crate::constants::auth_methods;
use crate::context::AppContext;
use crate::errors::{AppError, AppResult, OAuthErrorCode};
use crate::token_issuance::{TokenIssuanceRequest, TokenResponse};
use axum::extract::{RawForm, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::sync::Arc;

/// Handle `POST /token` (form-encoded).
///
/// Credentials may arrive in the form body (`client_secret_post`) or in an
/// HTTP Basic authorization header (`client_secret_basic`); the transport
/// used becomes the declared auth method checked against the registration.
pub async fn handle_token(
    State(context): State<Arc<AppContext>>,
    headers: HeaderMap,
    RawForm(body): RawForm,
) -> AppResult<Json<TokenResponse>> {
    let mut request = parse_token_form(&body);

    if let Some((basic_id, basic_secret)) = parse_basic_credentials(&headers) {
        request.client_id = Some(basic_id);
        request.client_secret = Some(basic_secret);
        request.auth_method = auth_methods::CLIENT_SECRET_BASIC.to_owned();
    }

    tracing::debug!(
        grant_type = request.grant_type.as_deref().unwrap_or("<missing>"),
        auth_method = %request.auth_method,
        "token request received"
    );

    let result = context.token_engine.issue(request).await?;

    if result.is_authorized {
        return Ok(Json(TokenResponse {
            access_token: result.access_token.unwrap_or_default(),
            token_type: "Bearer".to_owned(),
            expires_in: result.expires_in.unwrap_or_default(),
            scope: result.granted_scopes.unwrap_or_default(),
        }));
    }

    Err(AppError::OAuth {
        code: result.error.unwrap_or(OAuthErrorCode::InvalidRequest),
        description: result
            .error_description
            .unwrap_or_else(|| "Token request rejected.".to_owned()),
    })
}

/// Parse the urlencoded form body. Repeated `scope` fields are joined, and
/// space-joined scope values are split, so both conventions are accepted.
fn parse_token_form(body: &[u8]) -> TokenIssuanceRequest {
    let mut request = TokenIssuanceRequest {
        auth_method: auth_methods::CLIENT_SECRET_POST.to_owned(),
        ..TokenIssuanceRequest::default()
    };
    let mut scopes: Vec<String> = Vec::new();

    for (key, value) in url::form_urlencoded::parse(body) {
        match key.as_ref() {
            "grant_type" => request.grant_type = Some(value.into_owned()),
            "client_id" => request.client_id = Some(value.into_owned()),
            "client_secret" => request.client_secret = Some(value.into_owned()),
            "server_id" => request.server_id = Some(value.into_owned()),
            "assertion" => request.assertion = Some(value.into_owned()),
            "scope" => scopes.extend(value.split_whitespace().map(str::to_owned)),
            _ => {}
        }
    }

    if !scopes.is_empty() {
        request.scopes = Some(scopes);
    }
    request
}

/// Extract `client_id`/`client_secret` from an HTTP Basic header
fn parse_basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("Basic") {
        return None;
    }

    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (client_id, client_secret) = decoded.split_once(':')?;
    Some((client_id.to_owned(), client_secret.to_owned()))
}
