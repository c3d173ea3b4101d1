// ABOUTME: Redirect-URI validation against per-server whitelist patterns
// ABOUTME: Supports localhost wildcard-port, wildcard subdomain, and exact match grammars
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

//! Callback (redirect URI) whitelist validation
//!
//! Every redirect URI a client registers must match at least one active
//! whitelist entry for every server the client is granted against. Three
//! pattern grammars are supported, tried in order with first match winning:
//!
//! 1. `http://localhost:*/path` — any port on plain-HTTP localhost
//! 2. `https://*.domain.tld/path` — exactly one subdomain label
//! 3. exact match, trailing slash insensitive
//!
//! Pre-checks reject relative URIs, fragments, and embedded user-info
//! before any pattern is consulted (RFC 6749 §3.1.2 requirements).

use crate::database::CallbackWhitelistRepository;
use crate::errors::AppResult;
use regex::RegexBuilder;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

/// Outcome of validating a batch of redirect URIs for one server
#[derive(Debug, Clone)]
pub struct CallbackValidationResult {
    /// True when every URI matched a whitelist entry
    pub is_valid: bool,
    /// One message per failed URI
    pub errors: Vec<String>,
}

/// Validates redirect URIs against a server's callback whitelist
pub struct CallbackValidator {
    whitelist: Arc<dyn CallbackWhitelistRepository>,
}

impl CallbackValidator {
    /// Create a validator over the whitelist repository
    #[must_use]
    pub fn new(whitelist: Arc<dyn CallbackWhitelistRepository>) -> Self {
        Self { whitelist }
    }

    /// Validate all `redirect_uris` against the active whitelist entries of
    /// `server_id`. Failures are collected per URI rather than failing on
    /// the first.
    ///
    /// # Errors
    /// Returns an error only on storage failure; whitelist misses are
    /// reported through the result value.
    pub async fn validate(
        &self,
        server_id: Uuid,
        redirect_uris: &[String],
    ) -> AppResult<CallbackValidationResult> {
        let entries = self.whitelist.get_active_for_server(server_id).await?;
        let mut errors = Vec::new();

        for uri in redirect_uris {
            let Ok(parsed) = Url::parse(uri) else {
                errors.push(format!("'{uri}' is not a valid absolute URI."));
                continue;
            };

            if !parsed.has_host() {
                errors.push(format!("'{uri}' is not a valid absolute URI."));
                continue;
            }

            if parsed.fragment().is_some() {
                errors.push(format!("'{uri}' must not contain a fragment component."));
                continue;
            }

            if !parsed.username().is_empty() || parsed.password().is_some() {
                errors.push(format!("'{uri}' must not contain user information."));
                continue;
            }

            let matched = entries
                .iter()
                .any(|entry| matches_pattern(&parsed, &entry.pattern));
            if !matched {
                errors.push(format!(
                    "'{uri}' does not match any whitelisted pattern for this server."
                ));
            }
        }

        Ok(CallbackValidationResult {
            is_valid: errors.is_empty(),
            errors,
        })
    }
}

/// Match a parsed redirect URI against one whitelist pattern.
///
/// The grammars are tried as alternatives; the first that applies decides.
#[must_use]
pub fn matches_pattern(uri: &Url, pattern: &str) -> bool {
    // Localhost pattern: http://localhost:*/path
    if pattern
        .to_ascii_lowercase()
        .starts_with("http://localhost:")
        && pattern.contains('*')
    {
        if uri.scheme() != "http" || uri.host_str() != Some("localhost") {
            return false;
        }
        let pattern_path = localhost_pattern_path(pattern);
        return uri.path().eq_ignore_ascii_case(&pattern_path);
    }

    // Wildcard subdomain: https://*.domain.tld/path
    if pattern.contains("*.") {
        return matches_wildcard_subdomain(uri, pattern);
    }

    // Exact match, trailing slash stripped from both sides
    uri.as_str()
        .trim_end_matches('/')
        .eq_ignore_ascii_case(pattern.trim_end_matches('/'))
}

/// Extract the path component of a `http://localhost:*/path` pattern
fn localhost_pattern_path(pattern: &str) -> String {
    let Some(star) = pattern.find('*') else {
        return "/".to_owned();
    };
    pattern[star..]
        .find('/')
        .map_or_else(|| "/".to_owned(), |slash| pattern[star + slash..].to_owned())
}

fn matches_wildcard_subdomain(uri: &Url, pattern: &str) -> bool {
    // Substitute a placeholder label so the pattern parses as a URL
    let Ok(pattern_uri) = Url::parse(&pattern.replacen("*.", "x.", 1)) else {
        return false;
    };

    if !uri
        .scheme()
        .eq_ignore_ascii_case(pattern_uri.scheme())
    {
        return false;
    }

    if !uri.path().eq_ignore_ascii_case(pattern_uri.path()) {
        return false;
    }

    // Host must be exactly one label followed by the fixed suffix
    let Some(pattern_host) = pattern_uri.host_str() else {
        return false;
    };
    let Some(base_domain) = pattern_host.strip_prefix("x.") else {
        return false;
    };
    let Some(host) = uri.host_str() else {
        return false;
    };

    let Ok(host_regex) = RegexBuilder::new(&format!(
        "^[a-z0-9-]+\\.{}$",
        regex::escape(base_domain)
    ))
    .case_insensitive(true)
    .build() else {
        return false;
    };

    host_regex.is_match(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn exact_match_succeeds() {
        assert!(matches_pattern(
            &url("https://app.contoso.com/oauth/callback"),
            "https://app.contoso.com/oauth/callback"
        ));
    }

    #[test]
    fn exact_match_is_trailing_slash_insensitive() {
        assert!(matches_pattern(
            &url("https://app.contoso.com/oauth/callback"),
            "https://app.contoso.com/oauth/callback/"
        ));
        assert!(matches_pattern(
            &url("https://app.contoso.com/oauth/callback/"),
            "https://app.contoso.com/oauth/callback"
        ));
    }

    #[test]
    fn exact_match_rejects_different_path() {
        assert!(!matches_pattern(
            &url("https://app.contoso.com/other"),
            "https://app.contoso.com/oauth/callback"
        ));
    }

    #[test]
    fn wildcard_subdomain_matches_single_label() {
        assert!(matches_pattern(
            &url("https://myapp.contoso.com/oauth/callback"),
            "https://*.contoso.com/oauth/callback"
        ));
    }

    #[test]
    fn wildcard_subdomain_rejects_nested_subdomain() {
        assert!(!matches_pattern(
            &url("https://sub.myapp.contoso.com/oauth/callback"),
            "https://*.contoso.com/oauth/callback"
        ));
    }

    #[test]
    fn wildcard_subdomain_rejects_different_domain() {
        assert!(!matches_pattern(
            &url("https://evil.example.com/oauth/callback"),
            "https://*.contoso.com/oauth/callback"
        ));
    }

    #[test]
    fn wildcard_subdomain_rejects_scheme_mismatch() {
        assert!(!matches_pattern(
            &url("http://myapp.contoso.com/oauth/callback"),
            "https://*.contoso.com/oauth/callback"
        ));
    }

    #[test]
    fn localhost_matches_any_port() {
        assert!(matches_pattern(
            &url("http://localhost:8080/oauth/callback"),
            "http://localhost:*/oauth/callback"
        ));
        assert!(matches_pattern(
            &url("http://localhost:3000/oauth/callback"),
            "http://localhost:*/oauth/callback"
        ));
    }

    #[test]
    fn localhost_rejects_different_path() {
        assert!(!matches_pattern(
            &url("http://localhost:8080/other"),
            "http://localhost:*/oauth/callback"
        ));
    }

    #[test]
    fn localhost_rejects_https_scheme() {
        assert!(!matches_pattern(
            &url("https://localhost:8080/oauth/callback"),
            "http://localhost:*/oauth/callback"
        ));
    }

    #[test]
    fn localhost_rejects_other_hosts() {
        assert!(!matches_pattern(
            &url("http://evil.com:8080/oauth/callback"),
            "http://localhost:*/oauth/callback"
        ));
    }
}
