// ABOUTME: Configuration module for deployment-specific settings
// ABOUTME: Re-exports the environment-based server configuration
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Mcpd Contributors

/// Environment-based configuration management
pub mod environment;

pub use environment::{
    AuthServerConfig, LogFormat, LogLevel, SeedServerConfig, ServerClaimMapping, ServerConfig,
};
