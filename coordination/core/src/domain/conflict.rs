// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::session::AgentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a [`Conflict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConflictId(pub Uuid);

impl ConflictId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConflictId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One observed write to a shared resource, appended regardless of lock outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRecord {
    pub resource_key: String,
    pub agent_id: AgentId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle of a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStatus {
    /// Competing writes observed, no resolution yet.
    Detected,
    /// A merge strategy produced final content that was written back.
    Resolved,
    /// Automatic merge was impossible or a manual resolve lacked content.
    ManualReview,
}

/// Strategy for merging competing writes into final content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Final content is the latest-timestamp write.
    LastWriteWins,
    /// Final content is the earliest-timestamp write.
    FirstWriteWins,
    /// All writes concatenated in chronological order, attributed per agent.
    Append,
    /// Caller supplies the final content.
    Manual,
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LastWriteWins => "last_write_wins",
            Self::FirstWriteWins => "first_write_wins",
            Self::Append => "append",
            Self::Manual => "manual",
        };
        f.write_str(s)
    }
}

/// Competing writes to one resource key, grouped until resolved.
///
/// A conflict opens when a second agent writes to a key that already has an
/// unresolved write from a different agent; later writers append to the same
/// open conflict rather than opening new ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    pub resource_key: String,
    pub writes: Vec<WriteRecord>,
    pub status: ConflictStatus,
    pub resolved_by: Option<AgentId>,
    pub detected_at: DateTime<Utc>,
}

impl Conflict {
    pub fn open(resource_key: String, first: WriteRecord, second: WriteRecord) -> Self {
        Self {
            id: ConflictId::new(),
            resource_key,
            writes: vec![first, second],
            status: ConflictStatus::Detected,
            resolved_by: None,
            detected_at: Utc::now(),
        }
    }

    /// Whether new writes to the key should still be appended here.
    pub fn is_unresolved(&self) -> bool {
        !matches!(self.status, ConflictStatus::Resolved)
    }

    /// Writes sorted chronologically (stable for equal timestamps).
    pub fn writes_chronological(&self) -> Vec<&WriteRecord> {
        let mut sorted: Vec<&WriteRecord> = self.writes.iter().collect();
        sorted.sort_by_key(|w| w.timestamp);
        sorted
    }
}

/// Result of a resolve attempt. Every variant is a normal business outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResolveOutcome {
    /// Merge succeeded; final content was written back through the write path.
    Resolved { final_content: String },
    /// The conflict was already resolved; resolving again is a no-op.
    AlreadyResolved,
    /// Manual strategy without content: the conflict is held for manual review.
    ManualContentRequired,
    /// No conflict with the given id exists.
    NotFound,
}

impl ResolveOutcome {
    pub fn resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. } | Self::AlreadyResolved)
    }
}
