// ABOUTME: Domain entities for client registrations, servers, grants, and audit records
// ABOUTME: Entities reference each other by id only; repositories own persistence
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a client registration.
///
/// Transitions are forward-only: `Active -> Suspended` and
/// `Active -> Revoked`. A revoked client is never reactivated or deleted;
/// the row is retained for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    /// Registration is usable for token issuance
    Active,
    /// Temporarily disabled by an operator
    Suspended,
    /// Permanently disabled; terminal state
    Revoked,
}

impl ClientStatus {
    /// Stored string representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
        }
    }

    /// Parse the stored representation; unknown values read as `Revoked`
    /// so a corrupted row can never authenticate.
    #[must_use]
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "active" => Self::Active,
            "suspended" => Self::Suspended,
            _ => Self::Revoked,
        }
    }
}

/// A registered OAuth client
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    /// Surrogate primary key
    pub id: Uuid,
    /// Public opaque client identifier
    pub client_id: String,
    /// Argon2id hash of the client secret
    pub client_secret_hash: String,
    /// Display name
    pub client_name: String,
    /// Lifecycle status
    pub status: ClientStatus,
    /// Registered token endpoint authentication method
    pub token_endpoint_auth_method: String,
    /// Grant types the client may use
    pub grant_types: Vec<String>,
    /// Registered redirect URIs
    pub redirect_uris: Vec<String>,
    /// Argon2id hash of the registration access token
    pub registration_access_token_hash: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the current secret expires
    pub secret_expires_at: Option<DateTime<Utc>>,
    /// When the secret was last rotated
    pub secret_rotated_at: Option<DateTime<Utc>>,
}

impl ClientRegistration {
    /// Create a new active registration
    #[must_use]
    pub fn new(
        client_id: String,
        client_secret_hash: String,
        client_name: String,
        token_endpoint_auth_method: String,
        grant_types: Vec<String>,
        redirect_uris: Vec<String>,
        registration_access_token_hash: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_id,
            client_secret_hash,
            client_name,
            status: ClientStatus::Active,
            token_endpoint_auth_method,
            grant_types,
            redirect_uris,
            registration_access_token_hash,
            created_at: Utc::now(),
            secret_expires_at: None,
            secret_rotated_at: None,
        }
    }

    /// Whether the registration can authenticate and manage itself
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self.status, ClientStatus::Active)
    }

    /// Replace the secret hash; the previous secret becomes permanently
    /// unverifiable.
    pub fn rotate_secret(
        &mut self,
        new_secret_hash: String,
        new_expires_at: Option<DateTime<Utc>>,
    ) {
        self.client_secret_hash = new_secret_hash;
        self.secret_rotated_at = Some(Utc::now());
        self.secret_expires_at = new_expires_at;
    }

    /// Update mutable registration metadata
    pub fn update_metadata(
        &mut self,
        client_name: String,
        redirect_uris: Vec<String>,
        token_endpoint_auth_method: String,
        grant_types: Vec<String>,
    ) {
        self.client_name = client_name;
        self.redirect_uris = redirect_uris;
        self.token_endpoint_auth_method = token_endpoint_auth_method;
        self.grant_types = grant_types;
    }

    /// Move to the terminal revoked state
    pub fn revoke(&mut self) {
        self.status = ClientStatus::Revoked;
    }

    /// Suspend the registration
    pub fn suspend(&mut self) {
        self.status = ClientStatus::Suspended;
    }
}

/// A downstream MCP resource server clients can be granted access to
#[derive(Debug, Clone, Serialize)]
pub struct McpServer {
    /// Server identifier
    pub id: Uuid,
    /// Unique server name; used as the token audience
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Base URI of the resource server
    pub base_uri: String,
    /// Whether the server accepts new grants and tokens
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// When the server was deactivated
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl McpServer {
    /// Create a new active server
    #[must_use]
    pub fn new(name: String, description: String, base_uri: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            base_uri,
            is_active: true,
            created_at: Utc::now(),
            deactivated_at: None,
        }
    }

    /// Deactivate the server; servers are never deleted
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.deactivated_at = Some(Utc::now());
    }
}

/// The authorization edge between a client and a server
#[derive(Debug, Clone)]
pub struct ClientServerGrant {
    /// Grant identifier
    pub id: Uuid,
    /// Owning client registration
    pub client_registration_id: Uuid,
    /// Target server
    pub mcp_server_id: Uuid,
    /// Scopes the client may request for this server
    pub scopes: Vec<String>,
    /// Whether the grant currently authorizes token issuance
    pub is_active: bool,
    /// When the grant was created
    pub granted_at: DateTime<Utc>,
    /// When the grant was revoked
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ClientServerGrant {
    /// Create a new active grant
    #[must_use]
    pub fn new(client_registration_id: Uuid, mcp_server_id: Uuid, scopes: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            client_registration_id,
            mcp_server_id,
            scopes,
            is_active: true,
            granted_at: Utc::now(),
            revoked_at: None,
        }
    }

    /// Deactivate the grant
    pub fn revoke(&mut self) {
        self.is_active = false;
        self.revoked_at = Some(Utc::now());
    }
}

/// One allowed redirect-URI pattern for a server
#[derive(Debug, Clone)]
pub struct CallbackWhitelistEntry {
    /// Entry identifier
    pub id: Uuid,
    /// Owning server
    pub mcp_server_id: Uuid,
    /// Pattern string; see [`crate::callback`] for the grammar
    pub pattern: String,
    /// Whether the entry participates in matching
    pub is_active: bool,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl CallbackWhitelistEntry {
    /// Create a new active whitelist entry
    #[must_use]
    pub fn new(mcp_server_id: Uuid, pattern: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            mcp_server_id,
            pattern,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}

/// Append-only record of a security-relevant action
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogEntry {
    /// Entry identifier
    pub id: Uuid,
    /// Action tag; see [`crate::constants::audit_actions`]
    pub action: String,
    /// Who performed the action (client id, user subject, or "admin")
    pub actor_id: String,
    /// Affected client registration, when applicable
    pub client_registration_id: Option<Uuid>,
    /// Affected server, when applicable
    pub mcp_server_id: Option<Uuid>,
    /// Free-form detail
    pub detail: Option<String>,
    /// When the action happened
    pub timestamp: DateTime<Utc>,
}

impl AuditLogEntry {
    /// Create a new audit entry stamped with the current time
    #[must_use]
    pub fn new(
        action: &str,
        actor_id: impl Into<String>,
        client_registration_id: Option<Uuid>,
        mcp_server_id: Option<Uuid>,
        detail: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.to_owned(),
            actor_id: actor_id.into(),
            client_registration_id,
            mcp_server_id,
            detail,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn revoking_a_registration_is_terminal() {
        let mut reg = ClientRegistration::new(
            "cid".into(),
            "hash".into(),
            "Test".into(),
            "client_secret_post".into(),
            vec!["client_credentials".into()],
            vec!["https://app.example.com/cb".into()],
            "rat-hash".into(),
        );
        assert!(reg.is_active());
        reg.revoke();
        assert_eq!(reg.status, ClientStatus::Revoked);
        assert!(!reg.is_active());
    }

    #[test]
    fn rotate_secret_stamps_rotation_time() {
        let mut reg = ClientRegistration::new(
            "cid".into(),
            "old-hash".into(),
            "Test".into(),
            "client_secret_post".into(),
            vec![],
            vec![],
            "rat-hash".into(),
        );
        assert!(reg.secret_rotated_at.is_none());
        reg.rotate_secret("new-hash".into(), Some(Utc::now()));
        assert_eq!(reg.client_secret_hash, "new-hash");
        assert!(reg.secret_rotated_at.is_some());
    }

    #[test]
    fn grant_revocation_records_timestamp() {
        let mut grant = ClientServerGrant::new(Uuid::new_v4(), Uuid::new_v4(), vec!["read".into()]);
        assert!(grant.is_active);
        grant.revoke();
        assert!(!grant.is_active);
        assert!(grant.revoked_at.is_some());
    }

    #[test]
    fn unknown_status_reads_as_revoked() {
        assert_eq!(ClientStatus::from_str_lossy("garbage"), ClientStatus::Revoked);
    }
}
