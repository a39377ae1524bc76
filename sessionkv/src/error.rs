// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Error types for the session store

use crate::backend::BackendError;
use thiserror::Error;

/// Error type for session store operations
///
/// Absent data is never an error: lookups report it through `Option` or an
/// empty result instead.
#[derive(Error, Debug)]
pub enum StoreError {
    /// A session with the same ID already exists. Returned only by create.
    #[error("session id already exists")]
    DuplicateId,

    /// The session record failed validation before any key was touched.
    #[error("invalid session record: {0} must not be empty")]
    InvalidRecord(&'static str),

    /// Session data could not be encoded for storage.
    #[error("failed to encode session data: {0}")]
    Encode(String),

    /// A stored session field is missing or malformed. This indicates data
    /// corruption rather than a race, and is always fatal to the containing
    /// operation.
    #[error("malformed session field {0:?}: {1}")]
    Decode(&'static str, String),

    /// The backend could not complete the operation. The underlying cause is
    /// preserved for diagnostics.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
}

impl StoreError {
    /// Whether this is the distinguished duplicate-ID condition from create.
    /// Callers retrying create treat it as "already exists", not as a
    /// transient failure.
    pub fn is_duplicate_id(&self) -> bool {
        matches!(self, StoreError::DuplicateId)
    }

    /// Whether the operation lost an optimistic-locking race and is safe to
    /// retry as-is.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Backend(BackendError::Aborted))
    }
}

/// Result type for session store operations
pub type StoreResult<T> = Result<T, StoreError>;
