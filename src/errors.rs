// ABOUTME: Unified error handling with the OAuth 2.0 error taxonomy
// ABOUTME: Maps typed domain errors to JSON error responses and HTTP status codes
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! # Unified Error Handling System
//!
//! Every policy rejection carries one of the stable OAuth taxonomy codes so
//! callers can switch on it exhaustively instead of string-matching
//! messages. Infrastructure failures (storage, upstream identity provider)
//! are kept distinct from policy rejections: they map to 5xx responses and
//! are retryable, never `invalid_client`.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result alias used throughout the crate
pub type AppResult<T> = Result<T, AppError>;

/// Stable OAuth 2.0 error codes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthErrorCode {
    /// Malformed or incomplete request
    InvalidRequest,
    /// Client authentication failed
    InvalidClient,
    /// Client is not authorized for the requested server
    UnauthorizedClient,
    /// The presented assertion is invalid
    InvalidGrant,
    /// Requested scopes exceed the governing grant
    InvalidScope,
    /// A redirect URI failed whitelist validation
    InvalidRedirectUri,
    /// The target server does not exist or is inactive
    InvalidTarget,
    /// The grant type is not supported
    UnsupportedGrantType,
}

impl OAuthErrorCode {
    /// The wire representation of this code
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::UnauthorizedClient => "unauthorized_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidScope => "invalid_scope",
            Self::InvalidRedirectUri => "invalid_redirect_uri",
            Self::InvalidTarget => "invalid_target",
            Self::UnsupportedGrantType => "unsupported_grant_type",
        }
    }

    /// HTTP status for this code per RFC 6749 §5.2
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::InvalidClient | Self::UnauthorizedClient | Self::InvalidGrant => {
                StatusCode::UNAUTHORIZED
            }
            Self::InvalidRequest
            | Self::InvalidScope
            | Self::InvalidRedirectUri
            | Self::InvalidTarget
            | Self::UnsupportedGrantType => StatusCode::BAD_REQUEST,
        }
    }
}

impl std::fmt::Display for OAuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// A policy rejection carrying a taxonomy code
    #[error("{code}: {description}")]
    OAuth {
        /// Taxonomy code surfaced to the caller
        code: OAuthErrorCode,
        /// Human-readable description
        description: String,
    },

    /// A referenced entity does not exist
    #[error("{0}")]
    NotFound(String),

    /// The operation conflicts with current state
    #[error("{0}")]
    Conflict(String),

    /// Caller is not authenticated for the requested operation
    #[error("{0}")]
    Unauthorized(String),

    /// Storage failure; transient, not a security decision
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Upstream service failure (identity-provider metadata fetch)
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Unexpected internal failure
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Create an `invalid_request` error
    #[must_use]
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::OAuth {
            code: OAuthErrorCode::InvalidRequest,
            description: description.into(),
        }
    }

    /// Create an `invalid_client` error with the standard description
    #[must_use]
    pub fn invalid_client() -> Self {
        Self::OAuth {
            code: OAuthErrorCode::InvalidClient,
            description: "Client authentication failed".into(),
        }
    }

    /// Create an `unauthorized_client` error
    #[must_use]
    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self::OAuth {
            code: OAuthErrorCode::UnauthorizedClient,
            description: description.into(),
        }
    }

    /// Create an `invalid_grant` error
    #[must_use]
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::OAuth {
            code: OAuthErrorCode::InvalidGrant,
            description: description.into(),
        }
    }

    /// Create an `invalid_scope` error
    #[must_use]
    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::OAuth {
            code: OAuthErrorCode::InvalidScope,
            description: description.into(),
        }
    }

    /// Create an `invalid_redirect_uri` error
    #[must_use]
    pub fn invalid_redirect_uri(description: impl Into<String>) -> Self {
        Self::OAuth {
            code: OAuthErrorCode::InvalidRedirectUri,
            description: description.into(),
        }
    }

    /// Create an `invalid_target` error
    #[must_use]
    pub fn invalid_target(description: impl Into<String>) -> Self {
        Self::OAuth {
            code: OAuthErrorCode::InvalidTarget,
            description: description.into(),
        }
    }

    /// Create an `unsupported_grant_type` error
    #[must_use]
    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::OAuth {
            code: OAuthErrorCode::UnsupportedGrantType,
            description: description.into(),
        }
    }

    /// Create a not-found error
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a conflict error
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create an unauthorized error
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    /// Create an upstream failure error
    #[must_use]
    pub fn upstream(message: impl Into<String>) -> Self {
        Self::Upstream(message.into())
    }

    /// The taxonomy code, when this is a policy rejection
    #[must_use]
    pub const fn oauth_code(&self) -> Option<OAuthErrorCode> {
        match self {
            Self::OAuth { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// JSON error body returned to callers
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Stable error code
    pub error: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// `WWW-Authenticate` challenge pointing at the protected-resource metadata
fn www_authenticate_challenge() -> String {
    let issuer = crate::constants::try_get_server_config()
        .map_or_else(|| "http://localhost:8080".to_owned(), |c| c.issuer.clone());
    format!(
        "Bearer resource_metadata=\"{}/.well-known/oauth-protected-resource\"",
        issuer.trim_end_matches('/')
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::OAuth { code, description } => (
                code.http_status(),
                ErrorResponse {
                    error: code.as_str().to_owned(),
                    error_description: Some(description.clone()),
                },
            ),
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "not_found".to_owned(),
                    error_description: Some(message.clone()),
                },
            ),
            Self::Conflict(message) => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error: "conflict".to_owned(),
                    error_description: Some(message.clone()),
                },
            ),
            Self::Unauthorized(message) => (
                StatusCode::UNAUTHORIZED,
                ErrorResponse {
                    error: "unauthorized".to_owned(),
                    error_description: Some(message.clone()),
                },
            ),
            Self::Database(e) => {
                tracing::error!(error = %e, "database failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "server_error".to_owned(),
                        error_description: Some("Storage temporarily unavailable".to_owned()),
                    },
                )
            }
            Self::Upstream(message) => {
                tracing::warn!(error = %message, "upstream failure");
                (
                    StatusCode::BAD_GATEWAY,
                    ErrorResponse {
                        error: "temporarily_unavailable".to_owned(),
                        error_description: Some(message.clone()),
                    },
                )
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "internal failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "server_error".to_owned(),
                        error_description: None,
                    },
                )
            }
        };

        if status == StatusCode::UNAUTHORIZED {
            (
                status,
                [(header::WWW_AUTHENTICATE, www_authenticate_challenge())],
                Json(body),
            )
                .into_response()
        } else {
            (status, Json(body)).into_response()
        }
    }
}
