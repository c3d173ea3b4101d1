// ABOUTME: Health check route handlers for service monitoring
// ABOUTME: Provides liveness and readiness endpoints for load balancers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

use crate::context::AppContext;
use axum::routing::get;
use axum::{Json, Router};
use std::sync::Arc;

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Health check routes
pub fn routes() -> Router<Arc<AppContext>> {
    Router::new().route("/health", get(health_handler))
}
