// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::session::{AgentId, RunId, SessionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Options forwarded to the external agent runtime when spawning a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpawnOptions {
    /// Human-readable label for the run (surfaced in runtime UIs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Model override for this run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Bus session the run must send its result to when it finishes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_to: Option<SessionId>,
}

/// Errors from the external agent runtime. These are the one class of failure
/// that propagates to the caller as an `Err` — retrying is their decision.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("agent runtime rejected spawn for {0}: {1}")]
    Rejected(AgentId, String),

    #[error("agent runtime unavailable: {0}")]
    Unavailable(String),
}

/// The external session-spawn collaborator.
///
/// The orchestrator only starts runs through this seam; the spawned agent's
/// behavior (including reporting back over the bus) is the runtime's contract.
/// A synchronous fake is enough to unit-test the orchestrator.
#[async_trait]
pub trait AgentSpawner: Send + Sync {
    async fn spawn_agent_run(
        &self,
        agent_id: &AgentId,
        task: &str,
        options: SpawnOptions,
    ) -> Result<RunId, SpawnError>;
}
