// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::session::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One versioned entry in the shared context store.
///
/// `namespace` + `key` is the addressable unit. Versions per (namespace, key)
/// increase strictly forever, even across deletes, so a stale reader can
/// detect staleness by comparing version numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub namespace: String,
    pub key: String,
    /// Opaque payload. Structure (e.g. JSON) is the tool layer's business.
    pub value: String,
    pub version: u64,
    pub written_by: AgentId,
    pub written_at: DateTime<Utc>,
    /// Entries past this instant are treated as absent on next read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl ContextEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Listing row for a namespace with at least one live entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSummary {
    pub name: String,
    pub entry_count: usize,
    pub last_updated_at: DateTime<Utc>,
}
