// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Hash-field codec for session records
//!
//! A record is persisted as a flat string-to-string hash. Timestamps use
//! RFC 3339 with nanosecond precision so they round-trip losslessly. The
//! metadata map is stored as a JSON object under the `meta` field; an empty
//! map (like an unknown IP) is represented by an absent field.

use crate::error::{StoreError, StoreResult};
use crate::session::record::{Agent, SessionRecord};
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::net::IpAddr;

const CREATED_AT: &str = "created_at";
const EXPIRES_AT: &str = "expires_at";
const ID: &str = "id";
const USER_KEY: &str = "user_key";
const IP: &str = "ip";
const AGENT_OS: &str = "agent_os";
const AGENT_BROWSER: &str = "agent_browser";
const META: &str = "meta";

/// Encode a record into hash fields for storage.
pub(crate) fn to_fields(record: &SessionRecord) -> StoreResult<Vec<(String, String)>> {
    let mut fields = vec![
        (CREATED_AT.to_string(), encode_time(&record.created_at)),
        (EXPIRES_AT.to_string(), encode_time(&record.expires_at)),
        (ID.to_string(), record.id.clone()),
        (USER_KEY.to_string(), record.user_key.clone()),
        (AGENT_OS.to_string(), record.agent.os.clone()),
        (AGENT_BROWSER.to_string(), record.agent.browser.clone()),
    ];

    if let Some(ip) = record.ip {
        fields.push((IP.to_string(), ip.to_string()));
    }

    if !record.meta.is_empty() {
        let meta =
            serde_json::to_string(&record.meta).map_err(|e| StoreError::Encode(e.to_string()))?;
        fields.push((META.to_string(), meta));
    }

    Ok(fields)
}

/// Decode hash fields back into a record.
///
/// The caller is expected to have handled the zero-field case already; a
/// non-empty hash with missing or malformed required fields is corruption.
pub(crate) fn from_fields(fields: &HashMap<String, String>) -> StoreResult<SessionRecord> {
    let created_at = decode_time(fields, CREATED_AT)?;
    let expires_at = decode_time(fields, EXPIRES_AT)?;
    let id = required(fields, ID)?;
    let user_key = required(fields, USER_KEY)?;

    let ip = match fields.get(IP) {
        Some(raw) => Some(
            raw.parse::<IpAddr>()
                .map_err(|e| StoreError::Decode(IP, e.to_string()))?,
        ),
        None => None,
    };

    let agent = Agent {
        os: fields.get(AGENT_OS).cloned().unwrap_or_default(),
        browser: fields.get(AGENT_BROWSER).cloned().unwrap_or_default(),
    };

    let meta = match fields.get(META) {
        Some(raw) => {
            serde_json::from_str(raw).map_err(|e| StoreError::Decode(META, e.to_string()))?
        }
        None => HashMap::new(),
    };

    Ok(SessionRecord {
        id,
        user_key,
        created_at,
        expires_at,
        ip,
        agent,
        meta,
    })
}

fn encode_time(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(fields: &HashMap<String, String>, field: &'static str) -> StoreResult<DateTime<Utc>> {
    let raw = fields
        .get(field)
        .ok_or_else(|| StoreError::Decode(field, "missing".to_string()))?;

    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|e| StoreError::Decode(field, e.to_string()))?;

    Ok(parsed.with_timezone(&Utc))
}

fn required(fields: &HashMap<String, String>, field: &'static str) -> StoreResult<String> {
    match fields.get(field) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(StoreError::Decode(field, "missing".to_string())),
    }
}
