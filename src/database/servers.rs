// ABOUTME: MCP server persistence operations
// ABOUTME: Handles insert, lookup, listing, and deactivation state for resource servers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use super::{Database, McpServerRepository};
use crate::errors::{AppError, AppResult};
use crate::models::McpServer;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_servers(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mcp_servers (
                id TEXT PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                base_uri TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                deactivated_at TEXT
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_server(row: &SqliteRow) -> AppResult<McpServer> {
    let id: String = row.try_get("id")?;

    Ok(McpServer {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt server id: {e}")))?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        base_uri: row.try_get("base_uri")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        deactivated_at: row.try_get::<Option<DateTime<Utc>>, _>("deactivated_at")?,
    })
}

#[async_trait]
impl McpServerRepository for Database {
    async fn add(&self, server: &McpServer) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO mcp_servers (id, name, description, base_uri, is_active, created_at, deactivated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(server.id.to_string())
        .bind(&server.name)
        .bind(&server.description)
        .bind(&server.base_uri)
        .bind(server.is_active)
        .bind(server.created_at)
        .bind(server.deactivated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error().is_some_and(|d| d.is_unique_violation()) {
                AppError::conflict(format!("A server named '{}' already exists.", server.name))
            } else {
                AppError::Database(e)
            }
        })?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<McpServer>> {
        let row = sqlx::query("SELECT * FROM mcp_servers WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_server).transpose()
    }

    async fn get_by_name(&self, name: &str) -> AppResult<Option<McpServer>> {
        let row = sqlx::query("SELECT * FROM mcp_servers WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_server).transpose()
    }

    async fn list(&self) -> AppResult<Vec<McpServer>> {
        let rows = sqlx::query("SELECT * FROM mcp_servers ORDER BY name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_server).collect()
    }

    async fn update(&self, server: &McpServer) -> AppResult<()> {
        let result = sqlx::query(
            r"
            UPDATE mcp_servers SET
                name = ?, description = ?, base_uri = ?, is_active = ?, deactivated_at = ?
            WHERE id = ?
            ",
        )
        .bind(&server.name)
        .bind(&server.description)
        .bind(&server.base_uri)
        .bind(server.is_active)
        .bind(server.deactivated_at)
        .bind(server.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found("Server not found."));
        }
        Ok(())
    }
}
