// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::session::{AgentId, RunId, SessionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one fan-out's [`CoordinationGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordinationId(pub Uuid);

impl CoordinationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Bus session on which sub-runs of this group report their results.
    pub fn report_session(&self) -> SessionId {
        SessionId::new(format!("coordination:{}", self.0))
    }
}

impl Default for CoordinationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CoordinationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Caller-supplied description of one sub-task to fan out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTaskSpec {
    pub agent_id: AgentId,
    pub task: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl SubTaskSpec {
    pub fn new(agent_id: impl Into<AgentId>, task: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            task: task.into(),
            label: None,
            model: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// One spawned sub-task tracked inside a coordination group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubTask {
    pub agent_id: AgentId,
    pub task: String,
    pub label: Option<String>,
    pub run_id: RunId,
    /// Reported output; `None` until the sub-run reports (or never).
    pub output: Option<String>,
}

impl SubTask {
    pub fn reported(&self) -> bool {
        self.output.is_some()
    }

    /// Heading used in the aggregated result: the label, or the agent id.
    pub fn display_label(&self) -> &str {
        self.label.as_deref().unwrap_or(self.agent_id.as_str())
    }
}

/// State machine for a coordination group: `Running → {Completed, TimedOut}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationStatus {
    Running,
    Completed,
    TimedOut,
}

/// All tracking state created by one fan-out call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationGroup {
    pub id: CoordinationId,
    pub parent_session_id: SessionId,
    pub source_agent_id: AgentId,
    pub sub_tasks: Vec<SubTask>,
    pub timeout_at: DateTime<Utc>,
    pub status: CoordinationStatus,
}

impl CoordinationGroup {
    pub fn all_reported(&self) -> bool {
        self.sub_tasks.iter().all(SubTask::reported)
    }

    /// Record a report from `agent_id` against the first still-unreported
    /// sub-task addressed to that agent. Returns `false` when nothing matched
    /// (unknown agent, or all its sub-tasks already reported).
    pub fn record_report(&mut self, agent_id: &AgentId, output: String) -> bool {
        match self
            .sub_tasks
            .iter_mut()
            .find(|t| &t.agent_id == agent_id && !t.reported())
        {
            Some(task) => {
                task.output = Some(output);
                true
            }
            None => false,
        }
    }

    /// Concatenate every sub-task's heading and output in submission order.
    /// Unreported sub-tasks render as `(no response)`.
    pub fn aggregate(&self) -> String {
        self.sub_tasks
            .iter()
            .map(|t| {
                format!(
                    "## {}\n{}",
                    t.display_label(),
                    t.output.as_deref().unwrap_or("(no response)")
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// Immediate result of a fan-out: the group id plus one run id per sub-task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanOutReceipt {
    pub coordination_id: CoordinationId,
    pub run_ids: Vec<RunId>,
}

/// Result of a fan-in wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FanInOutcome {
    /// No coordination group with the given id (never created, or already
    /// retired by an earlier fan-in).
    NotFound,
    Finished {
        status: CoordinationStatus,
        aggregated: String,
    },
}
