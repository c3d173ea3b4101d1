// ABOUTME: Client/server grant persistence operations
// ABOUTME: Enforces the single-active-grant rule with a partial unique index
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use super::{ClientServerGrantRepository, Database};
use crate::errors::{AppError, AppResult};
use crate::models::ClientServerGrant;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_grants(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS client_server_grants (
                id TEXT PRIMARY KEY,
                client_registration_id TEXT NOT NULL REFERENCES client_registrations(id),
                mcp_server_id TEXT NOT NULL REFERENCES mcp_servers(id),
                scopes TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                granted_at TEXT NOT NULL,
                revoked_at TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // The single-active-grant invariant: racing inserts past the
        // services' optimistic check are rejected here.
        sqlx::query(
            r"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_grants_active_pair
            ON client_server_grants(client_registration_id, mcp_server_id)
            WHERE is_active = 1
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_grants_client
             ON client_server_grants(client_registration_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_grant(row: &SqliteRow) -> AppResult<ClientServerGrant> {
    let id: String = row.try_get("id")?;
    let client_registration_id: String = row.try_get("client_registration_id")?;
    let mcp_server_id: String = row.try_get("mcp_server_id")?;
    let scopes: String = row.try_get("scopes")?;

    Ok(ClientServerGrant {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt grant id: {e}")))?,
        client_registration_id: Uuid::parse_str(&client_registration_id)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt grant client id: {e}")))?,
        mcp_server_id: Uuid::parse_str(&mcp_server_id)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt grant server id: {e}")))?,
        scopes: serde_json::from_str(&scopes)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt grant scopes: {e}")))?,
        is_active: row.try_get("is_active")?,
        granted_at: row.try_get::<DateTime<Utc>, _>("granted_at")?,
        revoked_at: row.try_get::<Option<DateTime<Utc>>, _>("revoked_at")?,
    })
}

#[async_trait]
impl ClientServerGrantRepository for Database {
    async fn add(&self, grant: &ClientServerGrant) -> AppResult<()> {
        let scopes = serde_json::to_string(&grant.scopes)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize scopes: {e}")))?;

        sqlx::query(
            r"
            INSERT INTO client_server_grants (
                id, client_registration_id, mcp_server_id, scopes,
                is_active, granted_at, revoked_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(grant.id.to_string())
        .bind(grant.client_registration_id.to_string())
        .bind(grant.mcp_server_id.to_string())
        .bind(scopes)
        .bind(grant.is_active)
        .bind(grant.granted_at)
        .bind(grant.revoked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
                AppError::conflict("An active grant already exists for this client and server.")
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(())
    }

    async fn get_active(
        &self,
        client_registration_id: Uuid,
        mcp_server_id: Uuid,
    ) -> AppResult<Option<ClientServerGrant>> {
        let row = sqlx::query(
            r"
            SELECT * FROM client_server_grants
            WHERE client_registration_id = ? AND mcp_server_id = ? AND is_active = 1
            ",
        )
        .bind(client_registration_id.to_string())
        .bind(mcp_server_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_grant).transpose()
    }

    async fn get_for_client(
        &self,
        client_registration_id: Uuid,
    ) -> AppResult<Vec<ClientServerGrant>> {
        let rows = sqlx::query(
            "SELECT * FROM client_server_grants WHERE client_registration_id = ? ORDER BY granted_at",
        )
        .bind(client_registration_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_grant).collect()
    }

    async fn update(&self, grant: &ClientServerGrant) -> AppResult<()> {
        let scopes = serde_json::to_string(&grant.scopes)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("serialize scopes: {e}")))?;

        let result = sqlx::query(
            r"
            UPDATE client_server_grants SET
                scopes = ?, is_active = ?, revoked_at = ?
            WHERE id = ?
            ",
        )
        .bind(scopes)
        .bind(grant.is_active)
        .bind(grant.revoked_at)
        .bind(grant.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Grant not found."));
        }
        Ok(())
    }
}
