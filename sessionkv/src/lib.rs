// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! SessionKV - A transactional session store over a key-value database
//!
//! SessionKV persists login sessions in a key-value database that supports
//! hashes, sorted sets, per-key expiration, and optimistic transactions
//! (watch / queue / execute).
//!
//! # Features
//!
//! - **Dual-index data model**: every session is stored as a hash keyed by its
//!   ID, and referenced from a per-user sorted set scored by expiration time
//! - **Optimistic locking**: multi-key writes run as watched transactions, so
//!   concurrent writers are detected by the database rather than by in-process
//!   locks
//! - **TTL synchronization**: both structures carry the database's native key
//!   expiration; abandoned records self-clean without a background sweeper
//! - **Pluggable backends**: the store depends on a small capability interface
//!   rather than a concrete client library; an in-memory backend with full
//!   transaction semantics is included
//! - **Optional bounded retries**: an opt-in decorator that re-runs an
//!   operation when it lost an optimistic-locking race
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use sessionkv::{MemoryBackend, SessionRecord, SessionStore};
//!
//! let backend = Arc::new(MemoryBackend::new());
//! let store = SessionStore::new(backend, "myapp");
//!
//! let session = SessionRecord::new("u123", chrono::Duration::hours(24))
//!     .with_ip("127.0.0.1".parse()?)
//!     .with_agent("gnu/linux", "firefox");
//!
//! store.create(&session).await?;
//! let fetched = store.fetch_by_id(&session.id).await?;
//! ```

pub mod backend;
pub mod error;
pub mod session;
pub mod store;

// Re-export the public API - SessionStore is the main entry point
pub use backend::{
    BackendError, BackendResult, ExecOutcome, KvBackend, KvConnection, MemoryBackend,
    MemoryOptions, WriteCommand,
};
pub use error::{StoreError, StoreResult};
pub use session::{Agent, SessionRecord};
pub use store::{RetryPolicy, RetryingStore, SessionStore};

/// SessionKV version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// SessionKV crate name
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
