// ABOUTME: Core domain models shared across modules
// ABOUTME: Holds the resource-owner projection consumed by the userinfo endpoint
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Xstar Mail

//! Shared domain models.
//!
//! Mail accounts are owned by the account-management service; this crate only
//! holds the read-only projection needed to authorize clients and answer
//! userinfo requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resource owner (mail-account user) as seen by the authorization server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Stable user identifier; becomes the `sub` claim
    pub id: Uuid,
    /// Primary mail address
    pub email: String,
    /// Whether the mail address has been verified
    pub email_verified: bool,
    /// Optional display name; exposed under the `profile` scope
    pub display_name: Option<String>,
    /// Suspended accounts cannot authorize new clients
    pub is_active: bool,
    /// When the account record was created
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Create a new user projection with a fresh ID
    #[must_use]
    pub fn new(email: String, display_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            email_verified: false,
            display_name,
            is_active: true,
            created_at: Utc::now(),
        }
    }
}
