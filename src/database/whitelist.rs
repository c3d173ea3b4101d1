// ABOUTME: Callback whitelist entry persistence operations
// ABOUTME: Entries are immutable once created; deactivation is the only state change
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use super::{CallbackWhitelistRepository, Database};
use crate::errors::{AppError, AppResult};
use crate::models::CallbackWhitelistEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

impl Database {
    pub(super) async fn migrate_whitelist(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS callback_whitelist_entries (
                id TEXT PRIMARY KEY,
                mcp_server_id TEXT NOT NULL REFERENCES mcp_servers(id),
                pattern TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_whitelist_server
             ON callback_whitelist_entries(mcp_server_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn row_to_entry(row: &SqliteRow) -> AppResult<CallbackWhitelistEntry> {
    let id: String = row.try_get("id")?;
    let mcp_server_id: String = row.try_get("mcp_server_id")?;

    Ok(CallbackWhitelistEntry {
        id: Uuid::parse_str(&id)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt whitelist id: {e}")))?,
        mcp_server_id: Uuid::parse_str(&mcp_server_id)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("corrupt whitelist server id: {e}")))?,
        pattern: row.try_get("pattern")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
    })
}

#[async_trait]
impl CallbackWhitelistRepository for Database {
    async fn add(&self, entry: &CallbackWhitelistEntry) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO callback_whitelist_entries (id, mcp_server_id, pattern, is_active, created_at)
            VALUES (?, ?, ?, ?, ?)
            ",
        )
        .bind(entry.id.to_string())
        .bind(entry.mcp_server_id.to_string())
        .bind(&entry.pattern)
        .bind(entry.is_active)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_active_for_server(
        &self,
        server_id: Uuid,
    ) -> AppResult<Vec<CallbackWhitelistEntry>> {
        let rows = sqlx::query(
            r"
            SELECT * FROM callback_whitelist_entries
            WHERE mcp_server_id = ? AND is_active = 1
            ORDER BY created_at
            ",
        )
        .bind(server_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_entry).collect()
    }
}
