// ABOUTME: Configuration module organization for the Xstar auth server
// ABOUTME: Centralizes environment-driven configuration types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Xstar Mail

//! Configuration management.
//!
//! All runtime configuration comes from environment variables; there is no
//! configuration file surface beyond an optional `.env` in development.

/// Environment configuration management for deployment-specific settings
pub mod environment;
