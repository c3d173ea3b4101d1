// ABOUTME: Append-only audit log persistence
// ABOUTME: Entries are written once and never mutated or deleted by the core
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use super::{AuditLogRepository, Database};
use crate::errors::AppResult;
use crate::models::AuditLogEntry;
use async_trait::async_trait;

impl Database {
    pub(super) async fn migrate_audit(&self) -> AppResult<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS audit_log (
                id TEXT PRIMARY KEY,
                action TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                client_registration_id TEXT,
                mcp_server_id TEXT,
                detail TEXT,
                timestamp TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_log(action)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl AuditLogRepository for Database {
    async fn add(&self, entry: &AuditLogEntry) -> AppResult<()> {
        sqlx::query(
            r"
            INSERT INTO audit_log (id, action, actor_id, client_registration_id, mcp_server_id, detail, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(entry.id.to_string())
        .bind(&entry.action)
        .bind(&entry.actor_id)
        .bind(entry.client_registration_id.map(|id| id.to_string()))
        .bind(entry.mcp_server_id.map(|id| id.to_string()))
        .bind(&entry.detail)
        .bind(entry.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
