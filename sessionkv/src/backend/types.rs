// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Backend command types and error handling

use thiserror::Error;

/// A write queued into a transaction
///
/// These are the only mutations the store performs. They are collected into a
/// batch and handed to [`exec`](super::KvConnection::exec) so the backend can
/// apply them atomically.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCommand {
    /// Set string fields on the hash at `key`, creating it if absent
    HashSet {
        key: String,
        fields: Vec<(String, String)>,
    },

    /// Delete `key` outright, whatever it holds
    Delete { key: String },

    /// Add `member` to the sorted set at `key` with the given score,
    /// re-scoring it if already present
    SortedAdd {
        key: String,
        score: i64,
        member: String,
    },

    /// Remove `member` from the sorted set at `key`
    SortedRemove { key: String, member: String },

    /// Remove every member of the sorted set at `key` scored at or before
    /// `cutoff`
    SortedTrimBefore { key: String, cutoff: i64 },

    /// Set the absolute expiration of `key`, in milliseconds since epoch
    ExpireAt { key: String, at_millis: i64 },
}

/// Result of executing a queued transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// Every queued write was applied
    Committed,
    /// A watched key changed since it was watched; nothing was applied
    Aborted,
}

/// Error type for backend operations
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    /// No connection could be obtained: the pool is exhausted past its
    /// acquire deadline, the backend is shut down, or the caller gave up.
    #[error("connection unavailable: {0}")]
    Unavailable(String),

    /// The transaction was atomically discarded because a watched key was
    /// modified by another client.
    #[error("transaction aborted by a concurrent write")]
    Aborted,

    /// A command failed on the backend.
    #[error("command failed: {0}")]
    Command(String),
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;
