// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session record types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

/// Client software labels captured when the session was opened
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    /// Operating system label
    pub os: String,
    /// Application/browser label
    pub browser: String,
}

/// A single logged-in session's persisted attributes
///
/// One user key may own many concurrent session records; each record stores
/// its owner redundantly so it can be resolved without consulting the
/// per-user index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Unique session identifier
    pub id: String,
    /// Owning user key
    pub user_key: String,
    /// When the session was created
    pub created_at: DateTime<Utc>,
    /// When the session expires and the database deletes it
    pub expires_at: DateTime<Utc>,
    /// Originating network address, when known
    pub ip: Option<IpAddr>,
    /// Client software labels
    pub agent: Agent,
    /// Open string-to-string metadata
    pub meta: HashMap<String, String>,
}

impl SessionRecord {
    /// Create a new session for the given user with a fresh v4 UUID as its
    /// ID, valid for `lifetime` from now.
    pub fn new(user_key: impl Into<String>, lifetime: Duration) -> Self {
        let now = Utc::now();

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_key: user_key.into(),
            created_at: now,
            expires_at: now + lifetime,
            ip: None,
            agent: Agent::default(),
            meta: HashMap::new(),
        }
    }

    /// Set the originating network address
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Set the client software labels
    pub fn with_agent(mut self, os: impl Into<String>, browser: impl Into<String>) -> Self {
        self.agent = Agent {
            os: os.into(),
            browser: browser.into(),
        };
        self
    }

    /// Attach a metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Check whether the session's expiration time has passed
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}
