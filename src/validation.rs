// ABOUTME: Aggregated request validation for registration payloads
// ABOUTME: Collects every violation into one error list instead of failing on the first
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! Request validation
//!
//! Plain functions returning the full list of violations, called by the
//! HTTP boundary before the lifecycle service runs. Structural checks only;
//! whitelist matching happens later in [`crate::callback`].

use crate::constants::{auth_methods, grant_types, MAX_CLIENT_NAME_LENGTH};
use crate::registration::{RegisterClientRequest, UpdateClientRequest};
use url::Url;

const ALLOWED_GRANT_TYPES: [&str; 2] = [grant_types::CLIENT_CREDENTIALS, grant_types::JWT_BEARER];
const ALLOWED_AUTH_METHODS: [&str; 2] = [
    auth_methods::CLIENT_SECRET_POST,
    auth_methods::CLIENT_SECRET_BASIC,
];

/// Validate a registration request, returning every violation found.
#[must_use]
pub fn validate_register_request(request: &RegisterClientRequest) -> Vec<String> {
    let mut errors = Vec::new();

    validate_client_name(&request.client_name, &mut errors);

    if request.requested_server_ids.is_empty() {
        errors.push("At least one server_id is required.".to_owned());
    }

    validate_redirect_uris(&request.redirect_uris, &mut errors);
    validate_grant_types(&request.grant_types, &mut errors);
    validate_auth_method(&request.token_endpoint_auth_method, &mut errors);

    errors
}

/// Validate an update request, returning every violation found.
#[must_use]
pub fn validate_update_request(request: &UpdateClientRequest) -> Vec<String> {
    let mut errors = Vec::new();

    validate_client_name(&request.client_name, &mut errors);
    validate_redirect_uris(&request.redirect_uris, &mut errors);
    validate_grant_types(&request.grant_types, &mut errors);
    validate_auth_method(&request.token_endpoint_auth_method, &mut errors);

    errors
}

fn validate_client_name(client_name: &str, errors: &mut Vec<String>) {
    if client_name.trim().is_empty() {
        errors.push("client_name is required.".to_owned());
    } else if client_name.len() > MAX_CLIENT_NAME_LENGTH {
        errors.push(format!(
            "client_name must not exceed {MAX_CLIENT_NAME_LENGTH} characters."
        ));
    }
}

fn validate_redirect_uris(redirect_uris: &[String], errors: &mut Vec<String>) {
    if redirect_uris.is_empty() {
        errors.push("At least one redirect_uri is required.".to_owned());
        return;
    }

    for uri in redirect_uris {
        if !is_valid_redirect_uri(uri) {
            errors.push(format!(
                "'{uri}' must be an absolute https URI (or http on localhost)."
            ));
        }
        if uri.contains('#') {
            errors.push(format!("'{uri}' must not contain a fragment component."));
        }
    }
}

fn validate_grant_types(requested: &[String], errors: &mut Vec<String>) {
    if requested.is_empty() {
        errors.push("grant_types is required.".to_owned());
        return;
    }

    for grant_type in requested {
        if !ALLOWED_GRANT_TYPES.contains(&grant_type.as_str()) {
            errors.push(format!(
                "grant_types must be a subset of [{}].",
                ALLOWED_GRANT_TYPES.join(", ")
            ));
            return;
        }
    }
}

fn validate_auth_method(method: &str, errors: &mut Vec<String>) {
    if !ALLOWED_AUTH_METHODS.contains(&method) {
        errors.push(format!(
            "token_endpoint_auth_method must be one of [{}].",
            ALLOWED_AUTH_METHODS.join(", ")
        ));
    }
}

/// Absolute URI over https, or http restricted to loopback hosts
fn is_valid_redirect_uri(uri: &str) -> bool {
    let Ok(parsed) = Url::parse(uri) else {
        return false;
    };

    let is_localhost = matches!(parsed.host_str(), Some("localhost" | "127.0.0.1"));
    match parsed.scheme() {
        "https" => true,
        "http" => is_localhost,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn valid_request() -> RegisterClientRequest {
        RegisterClientRequest {
            client_name: "Example App".to_owned(),
            redirect_uris: vec!["https://app.example.com/callback".to_owned()],
            grant_types: vec![grant_types::CLIENT_CREDENTIALS.to_owned()],
            token_endpoint_auth_method: auth_methods::CLIENT_SECRET_POST.to_owned(),
            requested_server_ids: vec![Uuid::new_v4()],
            requested_scopes: HashMap::new(),
        }
    }

    #[test]
    fn valid_request_has_no_errors() {
        assert!(validate_register_request(&valid_request()).is_empty());
    }

    #[test]
    fn violations_are_aggregated() {
        let request = RegisterClientRequest {
            client_name: String::new(),
            redirect_uris: vec![],
            grant_types: vec!["implicit".to_owned()],
            token_endpoint_auth_method: "private_key_jwt".to_owned(),
            requested_server_ids: vec![],
            requested_scopes: HashMap::new(),
        };
        let errors = validate_register_request(&request);
        assert_eq!(errors.len(), 5);
    }

    #[test]
    fn name_length_is_bounded() {
        let mut request = valid_request();
        request.client_name = "x".repeat(257);
        let errors = validate_register_request(&request);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("256"));
    }

    #[test]
    fn plain_http_is_only_allowed_on_localhost() {
        let mut request = valid_request();
        request.redirect_uris = vec!["http://localhost:3000/cb".to_owned()];
        assert!(validate_register_request(&request).is_empty());

        request.redirect_uris = vec!["http://app.example.com/cb".to_owned()];
        assert_eq!(validate_register_request(&request).len(), 1);
    }

    #[test]
    fn fragments_are_rejected() {
        let mut request = valid_request();
        request.redirect_uris = vec!["https://app.example.com/cb#frag".to_owned()];
        let errors = validate_register_request(&request);
        assert!(errors.iter().any(|e| e.contains("fragment")));
    }

    #[test]
    fn jwt_bearer_grant_type_is_accepted() {
        let mut request = valid_request();
        request.grant_types = vec![grant_types::JWT_BEARER.to_owned()];
        assert!(validate_register_request(&request).is_empty());
    }
}
