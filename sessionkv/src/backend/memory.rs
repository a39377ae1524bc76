// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! In-memory backend implementation
//!
//! A complete in-process implementation of the backend traits, used by tests
//! and embedded deployments. It models the semantics the store relies on from
//! a real key-value database:
//!
//! - hash and sorted-set values with per-key absolute expiration, purged
//!   lazily when a key is touched
//! - per-key version counters backing watch/exec conflict detection; an
//!   expiry counts as a modification
//! - a bounded connection pool with an acquire deadline

use super::traits::{KvBackend, KvConnection};
use super::types::{BackendError, BackendResult, ExecOutcome, WriteCommand};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Configuration for the in-memory backend's connection pool
#[derive(Debug, Clone)]
pub struct MemoryOptions {
    /// Maximum number of concurrently checked-out connections
    pub capacity: usize,
    /// How long an acquire waits for a free connection before failing
    pub acquire_timeout: Duration,
}

impl Default for MemoryOptions {
    fn default() -> Self {
        Self {
            capacity: 16,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// In-memory key-value backend
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<State>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    versions: HashMap<String, u64>,
}

struct Entry {
    value: Value,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn hash() -> Self {
        Self {
            value: Value::Hash(HashMap::new()),
            expires_at_ms: None,
        }
    }

    fn sorted() -> Self {
        Self {
            value: Value::Sorted(Vec::new()),
            expires_at_ms: None,
        }
    }
}

enum Value {
    Hash(HashMap<String, String>),
    Sorted(Vec<(i64, String)>),
}

impl MemoryBackend {
    /// Create a backend with default pool options
    pub fn new() -> Self {
        Self::with_options(MemoryOptions::default())
    }

    /// Create a backend with the given pool options
    pub fn with_options(options: MemoryOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                permits: Arc::new(Semaphore::new(options.capacity)),
                acquire_timeout: options.acquire_timeout,
            }),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    async fn acquire(&self) -> BackendResult<Box<dyn KvConnection>> {
        let permit = tokio::time::timeout(
            self.shared.acquire_timeout,
            self.shared.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| BackendError::Unavailable("connection pool exhausted".to_string()))?
        .map_err(|_| BackendError::Unavailable("connection pool closed".to_string()))?;

        Ok(Box::new(MemoryConnection {
            shared: self.shared.clone(),
            watches: HashMap::new(),
            _permit: permit,
        }))
    }
}

/// A checked-out connection to a [`MemoryBackend`]
///
/// Dropping the connection releases its pool slot and discards its watches.
pub struct MemoryConnection {
    shared: Arc<Shared>,
    watches: HashMap<String, u64>,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl KvConnection for MemoryConnection {
    async fn watch(&mut self, key: &str) -> BackendResult<()> {
        let mut state = self.shared.state.lock();
        state.purge(key, now_ms());
        let version = state.version(key);
        self.watches.insert(key.to_string(), version);
        Ok(())
    }

    async fn unwatch(&mut self) -> BackendResult<()> {
        self.watches.clear();
        Ok(())
    }

    async fn exists(&mut self, key: &str) -> BackendResult<bool> {
        let mut state = self.shared.state.lock();
        state.purge(key, now_ms());
        Ok(state.entries.contains_key(key))
    }

    async fn hash_get_all(&mut self, key: &str) -> BackendResult<HashMap<String, String>> {
        let mut state = self.shared.state.lock();
        state.purge(key, now_ms());

        match state.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::Hash(fields) => Ok(fields.clone()),
                Value::Sorted(_) => Err(wrong_type(key)),
            },
            None => Ok(HashMap::new()),
        }
    }

    async fn ttl_millis(&mut self, key: &str) -> BackendResult<Option<i64>> {
        let now = now_ms();
        let mut state = self.shared.state.lock();
        state.purge(key, now);

        match state.entries.get(key) {
            Some(entry) => Ok(entry.expires_at_ms.map(|at| at - now)),
            None => Ok(None),
        }
    }

    async fn sorted_range(&mut self, key: &str) -> BackendResult<Vec<String>> {
        let mut state = self.shared.state.lock();
        state.purge(key, now_ms());

        match state.entries.get(key) {
            Some(entry) => match &entry.value {
                Value::Sorted(members) => {
                    let mut ordered = members.clone();
                    ordered.sort();
                    Ok(ordered.into_iter().map(|(_, member)| member).collect())
                }
                Value::Hash(_) => Err(wrong_type(key)),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn exec(&mut self, commands: Vec<WriteCommand>) -> BackendResult<ExecOutcome> {
        let now = now_ms();
        let mut state = self.shared.state.lock();

        // An expiry between watch and exec must count as a modification.
        let watched: Vec<String> = self.watches.keys().cloned().collect();
        for key in &watched {
            state.purge(key, now);
        }

        let conflicted = self
            .watches
            .iter()
            .any(|(key, version)| state.version(key) != *version);
        self.watches.clear();

        if conflicted {
            return Ok(ExecOutcome::Aborted);
        }

        for command in commands {
            state.apply(command);
        }

        Ok(ExecOutcome::Committed)
    }
}

impl State {
    fn version(&self, key: &str) -> u64 {
        self.versions.get(key).copied().unwrap_or(0)
    }

    fn bump(&mut self, key: &str) {
        *self.versions.entry(key.to_string()).or_insert(0) += 1;
    }

    /// Drop `key` if its expiration has passed.
    fn purge(&mut self, key: &str, now_ms: i64) {
        let expired = matches!(
            self.entries.get(key),
            Some(entry) if entry.expires_at_ms.is_some_and(|at| at <= now_ms)
        );

        if expired {
            self.entries.remove(key);
            self.bump(key);
        }
    }

    fn apply(&mut self, command: WriteCommand) {
        match command {
            WriteCommand::HashSet { key, fields } => {
                let entry = self.entries.entry(key.clone()).or_insert_with(Entry::hash);
                match &mut entry.value {
                    Value::Hash(existing) => existing.extend(fields),
                    other => *other = Value::Hash(fields.into_iter().collect()),
                }
                self.bump(&key);
            }

            WriteCommand::Delete { key } => {
                if self.entries.remove(&key).is_some() {
                    self.bump(&key);
                }
            }

            WriteCommand::SortedAdd { key, score, member } => {
                let entry = self
                    .entries
                    .entry(key.clone())
                    .or_insert_with(Entry::sorted);
                if let Value::Sorted(members) = &mut entry.value {
                    members.retain(|(_, m)| *m != member);
                    members.push((score, member));
                }
                self.bump(&key);
            }

            WriteCommand::SortedRemove { key, member } => {
                let mut changed = false;
                let mut emptied = false;

                if let Some(entry) = self.entries.get_mut(&key) {
                    if let Value::Sorted(members) = &mut entry.value {
                        let before = members.len();
                        members.retain(|(_, m)| *m != member);
                        changed = members.len() != before;
                        emptied = members.is_empty();
                    }
                }

                // A sorted set with no members ceases to exist.
                if emptied {
                    self.entries.remove(&key);
                }
                if changed {
                    self.bump(&key);
                }
            }

            WriteCommand::SortedTrimBefore { key, cutoff } => {
                let mut changed = false;
                let mut emptied = false;

                if let Some(entry) = self.entries.get_mut(&key) {
                    if let Value::Sorted(members) = &mut entry.value {
                        let before = members.len();
                        members.retain(|(score, _)| *score > cutoff);
                        changed = members.len() != before;
                        emptied = members.is_empty();
                    }
                }

                if emptied {
                    self.entries.remove(&key);
                }
                if changed {
                    self.bump(&key);
                }
            }

            WriteCommand::ExpireAt { key, at_millis } => {
                let mut changed = false;

                if let Some(entry) = self.entries.get_mut(&key) {
                    entry.expires_at_ms = Some(at_millis);
                    changed = true;
                }

                if changed {
                    self.bump(&key);
                }
            }
        }
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn wrong_type(key: &str) -> BackendError {
    BackendError::Command(format!("wrong value type at key {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash_set(key: &str, field: &str, value: &str) -> WriteCommand {
        WriteCommand::HashSet {
            key: key.to_string(),
            fields: vec![(field.to_string(), value.to_string())],
        }
    }

    #[tokio::test]
    async fn test_exec_applies_batch() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();

        let outcome = conn
            .exec(vec![
                hash_set("h", "a", "1"),
                WriteCommand::SortedAdd {
                    key: "z".to_string(),
                    score: 10,
                    member: "m1".to_string(),
                },
            ])
            .await
            .unwrap();

        assert_eq!(outcome, ExecOutcome::Committed);
        assert!(conn.exists("h").await.unwrap());
        assert_eq!(conn.sorted_range("z").await.unwrap(), vec!["m1"]);
    }

    #[tokio::test]
    async fn test_watched_write_aborts_exec() {
        let backend = MemoryBackend::new();
        let mut c1 = backend.acquire().await.unwrap();
        let mut c2 = backend.acquire().await.unwrap();

        c1.watch("contested").await.unwrap();
        c2.exec(vec![hash_set("contested", "winner", "c2")])
            .await
            .unwrap();

        let outcome = c1
            .exec(vec![hash_set("contested", "winner", "c1")])
            .await
            .unwrap();
        assert_eq!(outcome, ExecOutcome::Aborted);

        let fields = c1.hash_get_all("contested").await.unwrap();
        assert_eq!(fields.get("winner").map(String::as_str), Some("c2"));
    }

    #[tokio::test]
    async fn test_unrelated_write_does_not_abort() {
        let backend = MemoryBackend::new();
        let mut c1 = backend.acquire().await.unwrap();
        let mut c2 = backend.acquire().await.unwrap();

        c1.watch("watched").await.unwrap();
        c2.exec(vec![hash_set("unrelated", "x", "y")]).await.unwrap();

        let outcome = c1.exec(vec![hash_set("watched", "x", "y")]).await.unwrap();
        assert_eq!(outcome, ExecOutcome::Committed);
    }

    #[tokio::test]
    async fn test_unwatch_releases_locks() {
        let backend = MemoryBackend::new();
        let mut c1 = backend.acquire().await.unwrap();
        let mut c2 = backend.acquire().await.unwrap();

        c1.watch("contested").await.unwrap();
        c1.unwatch().await.unwrap();
        c2.exec(vec![hash_set("contested", "x", "y")]).await.unwrap();

        let outcome = c1.exec(vec![hash_set("contested", "x", "z")]).await.unwrap();
        assert_eq!(outcome, ExecOutcome::Committed);
    }

    #[tokio::test]
    async fn test_expired_key_reads_as_absent() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();

        conn.exec(vec![
            hash_set("short-lived", "a", "1"),
            WriteCommand::ExpireAt {
                key: "short-lived".to_string(),
                at_millis: now_ms() - 1,
            },
        ])
        .await
        .unwrap();

        assert!(!conn.exists("short-lived").await.unwrap());
        assert!(conn.hash_get_all("short-lived").await.unwrap().is_empty());
        assert_eq!(conn.ttl_millis("short-lived").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expiry_counts_as_modification_for_watch() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();

        conn.exec(vec![
            hash_set("fleeting", "a", "1"),
            WriteCommand::ExpireAt {
                key: "fleeting".to_string(),
                at_millis: now_ms() + 20,
            },
        ])
        .await
        .unwrap();

        conn.watch("fleeting").await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        let outcome = conn.exec(vec![hash_set("fleeting", "a", "2")]).await.unwrap();
        assert_eq!(outcome, ExecOutcome::Aborted);
    }

    #[tokio::test]
    async fn test_ttl_millis_reports_remaining_lifetime() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();

        conn.exec(vec![
            hash_set("timed", "a", "1"),
            WriteCommand::ExpireAt {
                key: "timed".to_string(),
                at_millis: now_ms() + 60_000,
            },
        ])
        .await
        .unwrap();

        let remaining = conn.ttl_millis("timed").await.unwrap().unwrap();
        assert!(remaining > 55_000 && remaining <= 60_000);

        // A key without expiration has no TTL.
        conn.exec(vec![hash_set("untimed", "a", "1")]).await.unwrap();
        assert_eq!(conn.ttl_millis("untimed").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sorted_range_orders_by_score() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();

        conn.exec(vec![
            WriteCommand::SortedAdd {
                key: "z".to_string(),
                score: 30,
                member: "c".to_string(),
            },
            WriteCommand::SortedAdd {
                key: "z".to_string(),
                score: 10,
                member: "a".to_string(),
            },
            WriteCommand::SortedAdd {
                key: "z".to_string(),
                score: 20,
                member: "b".to_string(),
            },
        ])
        .await
        .unwrap();

        assert_eq!(conn.sorted_range("z").await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_sorted_add_rescores_existing_member() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();

        conn.exec(vec![
            WriteCommand::SortedAdd {
                key: "z".to_string(),
                score: 10,
                member: "a".to_string(),
            },
            WriteCommand::SortedAdd {
                key: "z".to_string(),
                score: 20,
                member: "b".to_string(),
            },
            WriteCommand::SortedAdd {
                key: "z".to_string(),
                score: 30,
                member: "a".to_string(),
            },
        ])
        .await
        .unwrap();

        assert_eq!(conn.sorted_range("z").await.unwrap(), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_trim_before_removes_stale_members() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();

        conn.exec(vec![
            WriteCommand::SortedAdd {
                key: "z".to_string(),
                score: 10,
                member: "stale".to_string(),
            },
            WriteCommand::SortedAdd {
                key: "z".to_string(),
                score: 30,
                member: "live".to_string(),
            },
            WriteCommand::SortedTrimBefore {
                key: "z".to_string(),
                cutoff: 10,
            },
        ])
        .await
        .unwrap();

        assert_eq!(conn.sorted_range("z").await.unwrap(), vec!["live"]);
    }

    #[tokio::test]
    async fn test_removing_last_member_drops_key() {
        let backend = MemoryBackend::new();
        let mut conn = backend.acquire().await.unwrap();

        conn.exec(vec![
            WriteCommand::SortedAdd {
                key: "z".to_string(),
                score: 10,
                member: "only".to_string(),
            },
            WriteCommand::SortedRemove {
                key: "z".to_string(),
                member: "only".to_string(),
            },
        ])
        .await
        .unwrap();

        assert!(!conn.exists("z").await.unwrap());
    }

    #[tokio::test]
    async fn test_pool_exhaustion_times_out() {
        let backend = MemoryBackend::with_options(MemoryOptions {
            capacity: 1,
            acquire_timeout: Duration::from_millis(20),
        });

        let held = backend.acquire().await.unwrap();
        let err = backend.acquire().await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable(_)));

        // Returning the held connection frees the slot.
        drop(held);
        assert!(backend.acquire().await.is_ok());
    }
}
