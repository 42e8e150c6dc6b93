// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::conflict::{ConflictId, MergeStrategy};
use crate::domain::coordination::{CoordinationId, CoordinationStatus};
use crate::domain::session::{AgentId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observer feed of coordination activity.
///
/// Published on the broadcast event bus for passive observers (UIs, loggers,
/// the session transcript). Lossy by design: no coordination state depends on
/// a subscriber seeing an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CoordinationEvent {
    LockAcquired {
        resource_key: String,
        holder: AgentId,
        expires_at: DateTime<Utc>,
    },
    LockReleased {
        resource_key: String,
        holder: AgentId,
    },
    LockExpired {
        resource_key: String,
        holder: AgentId,
    },
    ConflictDetected {
        conflict_id: ConflictId,
        resource_key: String,
        writer_count: usize,
    },
    ConflictResolved {
        conflict_id: ConflictId,
        resource_key: String,
        strategy: MergeStrategy,
    },
    ContextWritten {
        namespace: String,
        key: String,
        version: u64,
        written_by: AgentId,
    },
    ContextDeleted {
        namespace: String,
        key: String,
    },
    MessageDelivered {
        from: SessionId,
        to: SessionId,
        content: String,
        delivered: bool,
    },
    ReplyTimedOut {
        waiting: SessionId,
    },
    FanOutStarted {
        coordination_id: CoordinationId,
        parent_session_id: SessionId,
        task_count: usize,
    },
    SubTaskReported {
        coordination_id: CoordinationId,
        agent_id: AgentId,
    },
    CoordinationFinished {
        coordination_id: CoordinationId,
        status: CoordinationStatus,
    },
}
