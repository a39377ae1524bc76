// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Session record model and its persisted encoding
//!
//! This module provides:
//! - The session record type with identity, lifetime, and client metadata
//! - The hash-field codec used to persist records in the key-value database
//!
//! The persisted field names (`created_at`, `expires_at`, `id`, `user_key`,
//! `ip`, `agent_os`, `agent_browser`, `meta`) are part of the on-disk layout
//! and must not change.

pub(crate) mod codec;
pub mod record;

pub use record::{Agent, SessionRecord};
