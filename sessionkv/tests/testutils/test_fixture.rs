//! Test fixture for SessionKV integration tests

// Not every test binary exercises every helper.
#![allow(dead_code)]

use chrono::{Duration, Utc};
use sessionkv::{Agent, KvBackend, MemoryBackend, SessionRecord, SessionStore, WriteCommand};
use std::collections::HashMap;
use std::sync::Arc;

/// Key namespace used by all fixtures
pub const PREFIX: &str = "test";

/// Test fixture with an isolated in-memory backend
pub struct TestFixture {
    pub backend: Arc<MemoryBackend>,
    pub store: SessionStore,
}

impl TestFixture {
    /// Create a fresh fixture with its own backend
    pub fn new() -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let backend = Arc::new(MemoryBackend::new());
        let store = SessionStore::new(backend.clone(), PREFIX);

        Self { backend, store }
    }

    /// Full key of the session hash for `id`
    pub fn session_key(id: &str) -> String {
        format!("{}:session:{}", PREFIX, id)
    }

    /// Full key of the per-user index for `user_key`
    pub fn user_key(user_key: &str) -> String {
        format!("{}:user:{}", PREFIX, user_key)
    }

    /// Apply writes directly against the backend, bypassing the store
    pub async fn raw_exec(&self, commands: Vec<WriteCommand>) {
        let mut conn = self.backend.acquire().await.expect("acquire connection");
        conn.exec(commands).await.expect("execute raw writes");
    }

    /// Whether a key currently exists in the backend
    pub async fn key_exists(&self, key: &str) -> bool {
        let mut conn = self.backend.acquire().await.expect("acquire connection");
        conn.exists(key).await.expect("check existence")
    }

    /// Members of the user's session index, in ascending score order
    pub async fn index_members(&self, user_key: &str) -> Vec<String> {
        let mut conn = self.backend.acquire().await.expect("acquire connection");
        conn.sorted_range(&Self::user_key(user_key))
            .await
            .expect("read index members")
    }

    /// Remaining TTL of the user's session index
    pub async fn index_ttl_millis(&self, user_key: &str) -> Option<i64> {
        let mut conn = self.backend.acquire().await.expect("acquire connection");
        conn.ttl_millis(&Self::user_key(user_key))
            .await
            .expect("read index ttl")
    }
}

/// A fully-populated session valid for 24 hours
pub fn sample_session(id: &str, user_key: &str) -> SessionRecord {
    let now = Utc::now();

    SessionRecord {
        id: id.to_string(),
        user_key: user_key.to_string(),
        created_at: now,
        expires_at: now + Duration::hours(24),
        ip: Some("127.0.0.1".parse().expect("valid test address")),
        agent: Agent {
            os: "gnu/linux".to_string(),
            browser: "firefox".to_string(),
        },
        meta: HashMap::new(),
    }
}
