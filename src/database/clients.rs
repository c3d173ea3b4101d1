// ABOUTME: Client registration persistence operations
// ABOUTME: Handles insert, lookup, and update of registered OAuth clients
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use super::{ClientRegistrationRepository, Database};
use crate::errors::{AppError, AppResult};
use crate::models::{ClientRegistration, ClientStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_clients(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS client_registrations (
                id TEXT PRIMARY KEY,
                client_id TEXT UNIQUE NOT NULL,
                client_secret_hash TEXT NOT NULL,
                client_name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'suspended', 'revoked')),
                token_endpoint_auth_method TEXT NOT NULL,
                grant_types TEXT NOT NULL,
                redirect_uris TEXT NOT NULL,
                registration_access_token_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                secret_expires_at TEXT,
                secret_rotated_at TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_client_registrations_status
             ON client_registrations(status)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_registration(row: &SqliteRow) -> AppResult<ClientRegistration> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let grant_types: String = row.try_get("grant_types")?;
    let redirect_uris: String = row.try_get("redirect_uris")?;

    Ok(ClientRegistration {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt registration id: {e}")))?,
        client_id: row.try_get("client_id")?,
        client_secret_hash: row.try_get("client_secret_hash")?,
        client_name: row.try_get("client_name")?,
        status: ClientStatus::from_str_lossy(&status),
        token_endpoint_auth_method: row.try_get("token_endpoint_auth_method")?,
        grant_types: serde_json::from_str(&grant_types)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt grant_types: {e}")))?,
        redirect_uris: serde_json::from_str(&redirect_uris)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt redirect_uris: {e}")))?,
        registration_access_token_hash: row.try_get("registration_access_token_hash")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        secret_expires_at: row.try_get::<Option<DateTime<Utc>>, _>("secret_expires_at")?,
        secret_rotated_at: row.try_get::<Option<DateTime<Utc>>, _>("secret_rotated_at")?,
    })
}

#[async_trait]
impl ClientRegistrationRepository for Database {
    async fn add(&self, registration: &ClientRegistration) -> AppResult<()> {
        let grant_types = serde_json::to_string(&registration.grant_types)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize grant_types: {e}")))?;
        let redirect_uris = serde_json::to_string(&registration.redirect_uris)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize redirect_uris: {e}")))?;

        sqlx::query(
            r"
            INSERT INTO client_registrations (
                id, client_id, client_secret_hash, client_name, status,
                token_endpoint_auth_method, grant_types, redirect_uris,
                registration_access_token_hash, created_at,
                secret_expires_at, secret_rotated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(registration.id.to_string())
        .bind(&registration.client_id)
        .bind(&registration.client_secret_hash)
        .bind(&registration.client_name)
        .bind(registration.status.as_str())
        .bind(&registration.token_endpoint_auth_method)
        .bind(grant_types)
        .bind(redirect_uris)
        .bind(&registration.registration_access_token_hash)
        .bind(registration.created_at)
        .bind(registration.secret_expires_at)
        .bind(registration.secret_rotated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
                AppError::conflict("A registration with this client_id already exists.")
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(())
    }

    async fn get_by_client_id(&self, client_id: &str) -> AppResult<Option<ClientRegistration>> {
        let row = sqlx::query("SELECT * FROM client_registrations WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_registration).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ClientRegistration>> {
        let row = sqlx::query("SELECT * FROM client_registrations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_registration).transpose()
    }

    async fn update(&self, registration: &ClientRegistration) -> AppResult<()> {
        let grant_types = serde_json::to_string(&registration.grant_types)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize grant_types: {e}")))?;
        let redirect_uris = serde_json::to_string(&registration.redirect_uris)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize redirect_uris: {e}")))?;

        let result = sqlx::query(
            r"
            UPDATE client_registrations SET
                client_secret_hash = ?,
                client_name = ?,
                status = ?,
                token_endpoint_auth_method = ?,
                grant_types = ?,
                redirect_uris = ?,
                secret_expires_at = ?,
                secret_rotated_at = ?
            WHERE id = ?
            ",
        )
        .bind(&registration.client_secret_hash)
        .bind(&registration.client_name)
        .bind(registration.status.as_str())
        .bind(&registration.token_endpoint_auth_method)
        .bind(grant_types)
        .bind(redirect_uris)
        .bind(registration.secret_expires_at)
        .bind(registration.secret_rotated_at)
        .bind(registration.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Client registration not found."));
        }
        Ok(())
    }

    async fn list_for_server(&self, server_id: Uuid) -> AppResult<Vec<ClientRegistration>> {
        let rows = sqlx::query(
            r"
            SELECT c.* FROM client_registrations c
            JOIN client_server_grants g ON g.client_registration_id = c.id
            WHERE g.mcp_server_id = ? AND g.is_active = 1
            ORDER BY c.created_at
            ",
        )
        .bind(server_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_registration).collect()
    }
}
