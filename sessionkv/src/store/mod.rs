// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session store protocols
//!
//! This module provides the transactional read/write/delete protocols that
//! keep the two persisted structures consistent under concurrent writers:
//!
//! - the session hash at `<prefix>:session:<id>`
//! - the per-user sorted index at `<prefix>:user:<userKey>`, whose members
//!   are full session key strings scored by expiration time in nanoseconds
//!
//! Every multi-key write follows the same sequence: watch the affected keys,
//! read and validate, then either abort (releasing the watches) or queue the
//! writes and execute. A watched key changing concurrently makes the backend
//! discard the transaction atomically; the store performs no automatic
//! retries and surfaces the conflict to the caller. The opt-in
//! [`RetryingStore`] decorator layers bounded retries on top without changing
//! that contract.

pub mod retry;

pub use retry::{RetryPolicy, RetryingStore};

use crate::backend::{BackendError, ExecOutcome, KvBackend, KvConnection, WriteCommand};
use crate::error::{StoreError, StoreResult};
use crate::session::codec;
use crate::session::SessionRecord;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Transactional session store over a key-value backend
///
/// The store is a stateless, re-entrant facade: it holds only the namespace
/// prefix and a shared backend handle, and checks one connection out of the
/// backend for the duration of each operation.
pub struct SessionStore {
    backend: Arc<dyn KvBackend>,
    prefix: String,
}

impl SessionStore {
    /// Create a store over the given backend.
    ///
    /// `prefix` namespaces every key this store touches (it may be empty),
    /// which allows multiple session managers to share one database.
    pub fn new(backend: Arc<dyn KvBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    /// Insert the session into the store and schedule its deletion at its
    /// expiration time.
    ///
    /// Fails with [`StoreError::DuplicateId`] when a session with the same ID
    /// already exists; the existing record is left unmodified.
    pub async fn create(&self, record: &SessionRecord) -> StoreResult<()> {
        if record.id.is_empty() {
            return Err(StoreError::InvalidRecord("id"));
        }
        if record.user_key.is_empty() {
            return Err(StoreError::InvalidRecord("user_key"));
        }

        let s_key = self.session_key(&record.id);
        let u_key = self.user_key(&record.user_key);

        let mut conn = self.backend.acquire().await?;
        let out = self.create_locked(conn.as_mut(), record, &s_key, &u_key).await;
        if out.is_err() {
            let _ = conn.unwatch().await;
        }
        out
    }

    async fn create_locked(
        &self,
        conn: &mut dyn KvConnection,
        record: &SessionRecord,
        s_key: &str,
        u_key: &str,
    ) -> StoreResult<()> {
        conn.watch(s_key).await?;
        conn.watch(u_key).await?;

        if conn.exists(s_key).await? {
            return Err(StoreError::DuplicateId);
        }

        let remaining = conn.ttl_millis(u_key).await?;

        let now = Utc::now();
        let now_ns = epoch_nanos(&now);
        let s_exp_ms = record.expires_at.timestamp_millis();
        let s_exp_ns = epoch_nanos(&record.expires_at);

        // The index must outlive every session it still lists: keep the
        // previous expiration (re-anchored to now) unless the new session
        // lives longer.
        let mut u_exp_ms = now.timestamp_millis() + remaining.unwrap_or(0);
        if s_exp_ms > u_exp_ms {
            u_exp_ms = s_exp_ms;
        }

        let batch = vec![
            WriteCommand::SortedTrimBefore {
                key: u_key.to_string(),
                cutoff: now_ns,
            },
            WriteCommand::SortedAdd {
                key: u_key.to_string(),
                score: s_exp_ns,
                member: s_key.to_string(),
            },
            WriteCommand::ExpireAt {
                key: u_key.to_string(),
                at_millis: u_exp_ms,
            },
            WriteCommand::HashSet {
                key: s_key.to_string(),
                fields: codec::to_fields(record)?,
            },
            WriteCommand::ExpireAt {
                key: s_key.to_string(),
                at_millis: s_exp_ms,
            },
        ];

        match conn.exec(batch).await? {
            ExecOutcome::Committed => {
                log::debug!("created session {} for user {}", record.id, record.user_key);
                Ok(())
            }
            ExecOutcome::Aborted => Err(BackendError::Aborted.into()),
        }
    }

    /// Retrieve a session by its ID. Returns `None` when no session with
    /// that ID exists.
    pub async fn fetch_by_id(&self, id: &str) -> StoreResult<Option<SessionRecord>> {
        let mut conn = self.backend.acquire().await?;

        let fields = conn.hash_get_all(&self.session_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }

        Ok(Some(codec::from_fields(&fields)?))
    }

    /// Retrieve every session owned by the given user key, ordered by
    /// ascending expiration time. Returns an empty list when none exist.
    ///
    /// Index members whose session hash has already expired are skipped:
    /// index entries are best-effort pointers, reconciled lazily rather than
    /// kept strictly consistent.
    pub async fn fetch_by_user_key(&self, user_key: &str) -> StoreResult<Vec<SessionRecord>> {
        let mut conn = self.backend.acquire().await?;

        let members = conn.sorted_range(&self.user_key(user_key)).await?;
        let mut records = Vec::with_capacity(members.len());

        for member in &members {
            let fields = conn.hash_get_all(member).await?;
            if fields.is_empty() {
                log::debug!("skipping index entry for vanished session at {}", member);
                continue;
            }

            records.push(codec::from_fields(&fields)?);
        }

        Ok(records)
    }

    /// Delete the session with the given ID. A no-op when no such session
    /// exists.
    pub async fn delete_by_id(&self, id: &str) -> StoreResult<()> {
        let s_key = self.session_key(id);

        let mut conn = self.backend.acquire().await?;
        let out = self.delete_by_id_locked(conn.as_mut(), &s_key).await;
        if out.is_err() {
            let _ = conn.unwatch().await;
        }
        out
    }

    async fn delete_by_id_locked(&self, conn: &mut dyn KvConnection, s_key: &str) -> StoreResult<()> {
        conn.watch(s_key).await?;

        let fields = conn.hash_get_all(s_key).await?;
        if fields.is_empty() {
            conn.unwatch().await?;
            return Ok(());
        }

        let record = codec::from_fields(&fields)?;
        let u_key = self.user_key(&record.user_key);

        conn.watch(&u_key).await?;
        let members = conn.sorted_range(&u_key).await?;

        let mut batch = vec![WriteCommand::SortedRemove {
            key: u_key.clone(),
            member: s_key.to_string(),
        }];

        // Don't leave an empty index behind.
        if members.len() == 1 && members[0] == s_key {
            batch.push(WriteCommand::Delete { key: u_key.clone() });
        }

        batch.push(WriteCommand::Delete {
            key: s_key.to_string(),
        });

        match conn.exec(batch).await? {
            ExecOutcome::Committed => {
                log::debug!("deleted session {} of user {}", record.id, record.user_key);
                Ok(())
            }
            ExecOutcome::Aborted => Err(BackendError::Aborted.into()),
        }
    }

    /// Delete every session owned by the given user key, except those whose
    /// IDs appear in `except_ids`. A no-op when the user has no sessions.
    ///
    /// With an empty exception list the whole index key is deleted along
    /// with the sessions, which supports "log out everywhere" semantics;
    /// exceptions support "log out everywhere except the current session".
    pub async fn delete_by_user_key(&self, user_key: &str, except_ids: &[&str]) -> StoreResult<()> {
        let u_key = self.user_key(user_key);

        let mut conn = self.backend.acquire().await?;
        let out = self
            .delete_by_user_key_locked(conn.as_mut(), &u_key, except_ids)
            .await;
        if out.is_err() {
            let _ = conn.unwatch().await;
        }
        out
    }

    async fn delete_by_user_key_locked(
        &self,
        conn: &mut dyn KvConnection,
        u_key: &str,
        except_ids: &[&str],
    ) -> StoreResult<()> {
        conn.watch(u_key).await?;
        let members = conn.sorted_range(u_key).await?;

        let mut batch = Vec::new();

        for member in &members {
            if except_ids.contains(&self.session_id_of(member)) {
                continue;
            }

            batch.push(WriteCommand::Delete {
                key: member.clone(),
            });

            if !except_ids.is_empty() {
                batch.push(WriteCommand::SortedRemove {
                    key: u_key.to_string(),
                    member: member.clone(),
                });
            }
        }

        if except_ids.is_empty() || members.is_empty() {
            batch.push(WriteCommand::Delete {
                key: u_key.to_string(),
            });
        }

        match conn.exec(batch).await? {
            ExecOutcome::Committed => Ok(()),
            ExecOutcome::Aborted => Err(BackendError::Aborted.into()),
        }
    }

    /// Key of the session hash for `id`.
    fn session_key(&self, id: &str) -> String {
        format!("{}:session:{}", self.prefix, id)
    }

    /// Key of the per-user session index for `user_key`.
    fn user_key(&self, user_key: &str) -> String {
        format!("{}:user:{}", self.prefix, user_key)
    }

    /// Bare session ID of an index member (the member is the full session
    /// key string). A member this store did not produce yields "".
    fn session_id_of<'a>(&self, member: &'a str) -> &'a str {
        member
            .strip_prefix(self.prefix.as_str())
            .and_then(|rest| rest.strip_prefix(":session:"))
            .unwrap_or("")
    }
}

// Saturates for timestamps past the year 2262.
fn epoch_nanos(at: &DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}
