// ABOUTME: Claim-to-scope authorization mapping for user token exchange
// ABOUTME: Decides which scopes a validated user receives for a target server
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! User-to-server authorization
//!
//! After the identity provider vouches for a user, this mapping decides
//! whether the user may reach the target server and which scopes apply.
//! Requested scopes constrain the defaults; asking for a scope outside the
//! allowed set is a failure, never a silent truncation.

use crate::config::{AuthServerConfig, ServerClaimMapping};
use std::collections::HashMap;

/// Outcome of the claim-mapping authorization step
#[derive(Debug, Clone)]
pub struct UserAuthorizationResult {
    /// Whether the user may receive a token for the server
    pub is_authorized: bool,
    /// Scopes granted when authorized
    pub granted_scopes: Vec<String>,
    /// Rejection reason when not authorized
    pub error: Option<String>,
}

impl UserAuthorizationResult {
    fn denied(error: impl Into<String>) -> Self {
        Self {
            is_authorized: false,
            granted_scopes: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Maps validated user claims onto per-server scope grants
pub struct UserServerAuthorization {
    server_mappings: HashMap<String, ServerClaimMapping>,
    admin_role: String,
}

impl UserServerAuthorization {
    /// Build the mapping from configuration
    #[must_use]
    pub fn new(config: &AuthServerConfig) -> Self {
        Self {
            server_mappings: config.server_mappings.clone(),
            admin_role: config.admin_role.clone(),
        }
    }

    /// Authorize a user, identified by their role claims, against a server.
    #[must_use]
    pub fn authorize(
        &self,
        server_name: &str,
        user_claims: &[String],
        requested_scopes: Option<&[String]>,
    ) -> UserAuthorizationResult {
        let Some(mapping) = self.server_mappings.get(server_name) else {
            return UserAuthorizationResult::denied(format!(
                "No claim mapping configured for server '{server_name}'."
            ));
        };

        let has_access = mapping.required_roles.is_empty()
            || mapping.required_roles.iter().any(|role| {
                user_claims
                    .iter()
                    .any(|claim| claim.eq_ignore_ascii_case(role))
            });

        if !has_access {
            return UserAuthorizationResult::denied(
                "User does not have the required role for this server.",
            );
        }

        let granted_scopes = match requested_scopes {
            Some(requested) if !requested.is_empty() => {
                let allowed: Vec<String> = requested
                    .iter()
                    .filter(|scope| {
                        mapping
                            .default_scopes
                            .iter()
                            .any(|allowed| allowed.eq_ignore_ascii_case(scope))
                    })
                    .cloned()
                    .collect();

                if allowed.len() < requested.len() {
                    return UserAuthorizationResult::denied(
                        "Requested scopes exceed allowed scopes for this server.",
                    );
                }
                allowed
            }
            _ => mapping.default_scopes.clone(),
        };

        UserAuthorizationResult {
            is_authorized: true,
            granted_scopes,
            error: None,
        }
    }

    /// Whether the user's claims carry the configured admin role
    #[must_use]
    pub fn is_admin(&self, user_claims: &[String]) -> bool {
        !self.admin_role.trim().is_empty()
            && user_claims
                .iter()
                .any(|claim| claim.eq_ignore_ascii_case(&self.admin_role))
    }
}
