// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::session::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Advisory lock held by an agent on a shared resource.
///
/// Only one live lock may exist per `resource_key`. The lock is advisory:
/// it constrains only callers that check it, never the resource itself.
/// A lock past `expires_at` is treated as absent on next access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLock {
    /// Opaque identifier for the locked resource (e.g. file path, DB row key).
    pub resource_key: String,
    /// The agent currently holding the lock.
    pub holder: AgentId,
    /// When the lock was acquired (or last renewed).
    pub acquired_at: DateTime<Utc>,
    /// When the lock lapses if not renewed or released.
    pub expires_at: DateTime<Utc>,
    /// Optional human-readable reason for the lock.
    pub purpose: Option<String>,
}

impl ResourceLock {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Result of an acquire attempt. Contention is a normal outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquireOutcome {
    pub acquired: bool,
    /// Set when acquisition failed because another agent holds the lock.
    pub held_by: Option<AgentId>,
}

impl AcquireOutcome {
    pub fn granted() -> Self {
        Self {
            acquired: true,
            held_by: None,
        }
    }

    pub fn contended(holder: AgentId) -> Self {
        Self {
            acquired: false,
            held_by: Some(holder),
        }
    }
}

/// Snapshot answer to "is this resource locked right now?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    pub locked: bool,
    pub by: Option<AgentId>,
}

impl LockStatus {
    pub fn unlocked() -> Self {
        Self {
            locked: false,
            by: None,
        }
    }

    pub fn held(by: AgentId) -> Self {
        Self {
            locked: true,
            by: Some(by),
        }
    }
}
