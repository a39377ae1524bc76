// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Bounded-retry decorator for the session store
//!
//! Losing an optimistic-locking race is an expected outcome under concurrent
//! writers, and the core store deliberately surfaces it instead of retrying.
//! This decorator re-runs an operation a bounded number of times when it
//! failed with a transaction conflict, and nothing else: duplicate-ID,
//! decode, and unavailable errors pass through immediately.

use super::SessionStore;
use crate::error::StoreResult;
use crate::session::SessionRecord;
use std::future::Future;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per operation, including the first
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(20),
        }
    }
}

/// A session store that retries operations lost to optimistic-lock conflicts
///
/// Wraps a [`SessionStore`] without changing its contract; each attempt is a
/// full, independent store operation.
pub struct RetryingStore {
    inner: SessionStore,
    policy: RetryPolicy,
}

impl RetryingStore {
    /// Wrap a store with the given retry policy
    pub fn new(inner: SessionStore, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Unwrap the decorated store
    pub fn into_inner(self) -> SessionStore {
        self.inner
    }

    /// See [`SessionStore::create`]. A duplicate ID is reported immediately,
    /// never retried.
    pub async fn create(&self, record: &SessionRecord) -> StoreResult<()> {
        self.run(|| self.inner.create(record)).await
    }

    /// See [`SessionStore::fetch_by_id`]
    pub async fn fetch_by_id(&self, id: &str) -> StoreResult<Option<SessionRecord>> {
        self.run(|| self.inner.fetch_by_id(id)).await
    }

    /// See [`SessionStore::fetch_by_user_key`]
    pub async fn fetch_by_user_key(&self, user_key: &str) -> StoreResult<Vec<SessionRecord>> {
        self.run(|| self.inner.fetch_by_user_key(user_key)).await
    }

    /// See [`SessionStore::delete_by_id`]
    pub async fn delete_by_id(&self, id: &str) -> StoreResult<()> {
        self.run(|| self.inner.delete_by_id(id)).await
    }

    /// See [`SessionStore::delete_by_user_key`]
    pub async fn delete_by_user_key(&self, user_key: &str, except_ids: &[&str]) -> StoreResult<()> {
        self.run(|| self.inner.delete_by_user_key(user_key, except_ids))
            .await
    }

    async fn run<T, F, Fut>(&self, mut op: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 1;

        loop {
            match op().await {
                Err(err) if err.is_conflict() && attempt < self.policy.max_attempts => {
                    log::debug!(
                        "retrying after transaction conflict (attempt {}/{})",
                        attempt,
                        self.policy.max_attempts
                    );
                    tokio::time::sleep(self.policy.backoff).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
