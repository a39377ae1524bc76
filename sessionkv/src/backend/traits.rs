// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Backend capability traits
//!
//! These traits describe the subset of key-value database functionality the
//! session store needs: hash and sorted-set reads, remaining-TTL queries, and
//! optimistic transactions. A backend adapts a concrete client library (or an
//! in-process implementation) to this interface.

use super::types::{BackendResult, ExecOutcome, WriteCommand};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

/// Handle to a key-value backend that can hand out transactional connections
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Check a connection out of the backend's pool.
    ///
    /// Each store operation holds exactly one connection for its entire
    /// duration; dropping the connection returns it to the pool and discards
    /// any watches it still holds. Acquisition failure means no key was
    /// touched.
    async fn acquire(&self) -> BackendResult<Box<dyn KvConnection>>;
}

/// A single checked-out connection supporting optimistic transactions
///
/// Reads outside a transaction see the backend's current state. Writes only
/// happen through [`exec`](Self::exec), which applies a queued batch
/// atomically unless one of the watched keys changed in the meantime.
#[async_trait]
pub trait KvConnection: Send {
    /// Register `key` for optimistic-lock conflict detection. A later `exec`
    /// aborts if the key was modified (or expired) after this call.
    async fn watch(&mut self, key: &str) -> BackendResult<()>;

    /// Drop every watch held by this connection.
    async fn unwatch(&mut self) -> BackendResult<()>;

    /// Check whether `key` currently exists.
    async fn exists(&mut self, key: &str) -> BackendResult<bool>;

    /// Read every field of the hash at `key`. An absent key reads as an
    /// empty map.
    async fn hash_get_all(&mut self, key: &str) -> BackendResult<HashMap<String, String>>;

    /// Remaining lifetime of `key` in milliseconds, or `None` when the key
    /// is absent or carries no expiration.
    async fn ttl_millis(&mut self, key: &str) -> BackendResult<Option<i64>>;

    /// Every member of the sorted set at `key`, in ascending score order.
    /// An absent key reads as an empty list.
    async fn sorted_range(&mut self, key: &str) -> BackendResult<Vec<String>>;

    /// Atomically apply the queued writes, unless a watched key changed
    /// since it was watched. Always consumes this connection's watches.
    async fn exec(&mut self, commands: Vec<WriteCommand>) -> BackendResult<ExecOutcome>;
}

impl fmt::Debug for dyn KvConnection + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("dyn KvConnection")
    }
}
