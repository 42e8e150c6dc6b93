// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Conflict detection and resolution for competing writes.
//!
//! Every guarded write is recorded here regardless of lock outcome (locks are
//! advisory). A conflict opens when a second agent writes to a key that holds
//! an unresolved write from a different agent; later writers append to the
//! same open conflict. Resolution merges the writes with a pluggable strategy
//! and pushes the final content back through the same write path.

use crate::domain::conflict::{
    Conflict, ConflictId, ConflictStatus, MergeStrategy, ResolveOutcome, WriteRecord,
};
use crate::domain::events::CoordinationEvent;
use crate::domain::session::AgentId;
use crate::infrastructure::event_bus::EventBus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Attribution used for the write-back when no resolver identity is given.
const RESOLVER: &str = "resolver";

struct TrackerState {
    conflicts: Vec<Conflict>,
    /// Most recent standalone (non-conflicted, unresolved) write per key.
    /// Cleared when the key's writes move into an open conflict.
    baseline: HashMap<String, WriteRecord>,
}

pub struct ConflictTracker {
    state: Mutex<TrackerState>,
    events: EventBus,
}

impl ConflictTracker {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Mutex::new(TrackerState {
                conflicts: Vec::new(),
                baseline: HashMap::new(),
            }),
            events,
        }
    }

    /// Record a write to `resource_key`.
    ///
    /// Appends to the open conflict for that key if one exists; otherwise
    /// opens a new conflict when an unresolved write from a different agent
    /// is already on record.
    pub fn record_write(
        &self,
        resource_key: &str,
        agent_id: &AgentId,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) {
        let record = WriteRecord {
            resource_key: resource_key.to_string(),
            agent_id: agent_id.clone(),
            content: content.into(),
            timestamp,
        };

        let mut state = self.state.lock();
        let detected = Self::record_locked(&mut state, record);
        drop(state);

        if let Some((conflict_id, writer_count)) = detected {
            warn!(
                conflict_id = %conflict_id,
                resource_key = %resource_key,
                "conflicting write detected"
            );
            self.events.publish(CoordinationEvent::ConflictDetected {
                conflict_id,
                resource_key: resource_key.to_string(),
                writer_count,
            });
        }
    }

    /// List conflicts, optionally filtered by status. Most recent first.
    pub fn list_conflicts(&self, status: Option<ConflictStatus>) -> Vec<Conflict> {
        let state = self.state.lock();
        state
            .conflicts
            .iter()
            .rev()
            .filter(|c| status.is_none_or(|s| c.status == s))
            .cloned()
            .collect()
    }

    /// Resolve a conflict with the given merge strategy.
    ///
    /// On success the merged content is written back through the write path
    /// (attributed to `resolved_by`, or a generic resolver identity) and the
    /// conflict is marked resolved. Re-resolving is idempotent. A manual
    /// resolve without content is rejected and the conflict is held for
    /// manual review.
    pub fn resolve_conflict(
        &self,
        conflict_id: ConflictId,
        strategy: MergeStrategy,
        manual_content: Option<String>,
        resolved_by: Option<AgentId>,
    ) -> ResolveOutcome {
        let mut state = self.state.lock();

        let Some(index) = state.conflicts.iter().position(|c| c.id == conflict_id) else {
            debug!(conflict_id = %conflict_id, "resolve refused: conflict not found");
            return ResolveOutcome::NotFound;
        };

        if state.conflicts[index].status == ConflictStatus::Resolved {
            return ResolveOutcome::AlreadyResolved;
        }

        let final_content = match strategy {
            MergeStrategy::LastWriteWins => state.conflicts[index]
                .writes_chronological()
                .last()
                .map(|w| w.content.clone()),
            MergeStrategy::FirstWriteWins => state.conflicts[index]
                .writes_chronological()
                .first()
                .map(|w| w.content.clone()),
            MergeStrategy::Append => {
                let merged = state.conflicts[index]
                    .writes_chronological()
                    .iter()
                    .map(|w| format!("[{}]:\n{}", w.agent_id, w.content))
                    .collect::<Vec<_>>()
                    .join("\n\n");
                Some(merged)
            }
            MergeStrategy::Manual => {
                manual_content.filter(|content| !content.trim().is_empty())
            }
        };

        let Some(final_content) = final_content else {
            state.conflicts[index].status = ConflictStatus::ManualReview;
            drop(state);
            warn!(
                conflict_id = %conflict_id,
                strategy = %strategy,
                "resolve rejected: no content to merge, held for manual review"
            );
            return ResolveOutcome::ManualContentRequired;
        };

        let resolver = resolved_by.unwrap_or_else(|| AgentId::new(RESOLVER));
        let resource_key = state.conflicts[index].resource_key.clone();
        state.conflicts[index].status = ConflictStatus::Resolved;
        state.conflicts[index].resolved_by = Some(resolver.clone());

        // Write back through the normal write path. The conflict is already
        // marked resolved, so this write becomes the key's new baseline and
        // cannot re-open the conflict it just closed.
        Self::record_locked(
            &mut state,
            WriteRecord {
                resource_key: resource_key.clone(),
                agent_id: resolver,
                content: final_content.clone(),
                timestamp: Utc::now(),
            },
        );
        drop(state);

        info!(
            conflict_id = %conflict_id,
            resource_key = %resource_key,
            strategy = %strategy,
            "conflict resolved"
        );
        self.events.publish(CoordinationEvent::ConflictResolved {
            conflict_id,
            resource_key,
            strategy,
        });
        ResolveOutcome::Resolved { final_content }
    }

    /// Shared write path. Returns `(id, writer_count)` when a new conflict
    /// was opened by this write.
    fn record_locked(
        state: &mut TrackerState,
        record: WriteRecord,
    ) -> Option<(ConflictId, usize)> {
        if let Some(conflict) = state
            .conflicts
            .iter_mut()
            .find(|c| c.resource_key == record.resource_key && c.is_unresolved())
        {
            conflict.writes.push(record);
            return None;
        }

        let conflicting = state
            .baseline
            .get(&record.resource_key)
            .is_some_and(|prior| prior.agent_id != record.agent_id);
        if conflicting {
            if let Some(prior) = state.baseline.remove(&record.resource_key) {
                let conflict = Conflict::open(record.resource_key.clone(), prior, record);
                let detected = (conflict.id, conflict.writes.len());
                state.conflicts.push(conflict);
                return Some(detected);
            }
        }

        state.baseline.insert(record.resource_key.clone(), record);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tracker() -> ConflictTracker {
        ConflictTracker::new(EventBus::new(16))
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn same_agent_rewrites_open_no_conflict() {
        let tracker = tracker();
        let alice = AgentId::new("alice");

        tracker.record_write("f.md", &alice, "v1", at(1));
        tracker.record_write("f.md", &alice, "v2", at(2));

        assert!(tracker.list_conflicts(None).is_empty());
    }

    #[test]
    fn competing_writes_group_into_one_conflict() {
        let tracker = tracker();

        tracker.record_write("f.md", &AgentId::new("agentA"), "x", at(1));
        tracker.record_write("f.md", &AgentId::new("agentB"), "y", at(2));

        let conflicts = tracker.list_conflicts(None);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].writes.len(), 2);
        assert_eq!(conflicts[0].status, ConflictStatus::Detected);

        // A third writer joins the same open conflict, not a new one.
        tracker.record_write("f.md", &AgentId::new("agentC"), "z", at(3));
        let conflicts = tracker.list_conflicts(None);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].writes.len(), 3);
    }

    #[test]
    fn distinct_keys_never_conflict() {
        let tracker = tracker();

        tracker.record_write("a.md", &AgentId::new("agentA"), "x", at(1));
        tracker.record_write("b.md", &AgentId::new("agentB"), "y", at(2));

        assert!(tracker.list_conflicts(None).is_empty());
    }

    #[test]
    fn last_write_wins_takes_latest_timestamp() {
        let tracker = tracker();
        tracker.record_write("f.md", &AgentId::new("agentA"), "x", at(1));
        tracker.record_write("f.md", &AgentId::new("agentB"), "y", at(2));
        let id = tracker.list_conflicts(None)[0].id;

        let outcome = tracker.resolve_conflict(id, MergeStrategy::LastWriteWins, None, None);
        assert_eq!(
            outcome,
            ResolveOutcome::Resolved {
                final_content: "y".to_string()
            }
        );
    }

    #[test]
    fn first_write_wins_takes_earliest_timestamp() {
        let tracker = tracker();
        tracker.record_write("f.md", &AgentId::new("agentA"), "x", at(1));
        tracker.record_write("f.md", &AgentId::new("agentB"), "y", at(2));
        let id = tracker.list_conflicts(None)[0].id;

        let outcome = tracker.resolve_conflict(id, MergeStrategy::FirstWriteWins, None, None);
        assert_eq!(
            outcome,
            ResolveOutcome::Resolved {
                final_content: "x".to_string()
            }
        );
    }

    #[test]
    fn append_concatenates_chronologically_with_attribution() {
        let tracker = tracker();
        // Recorded out of order; merge must still be chronological.
        tracker.record_write("f.md", &AgentId::new("agentB"), "y", at(2));
        tracker.record_write("f.md", &AgentId::new("agentA"), "x", at(1));
        let id = tracker.list_conflicts(None)[0].id;

        let ResolveOutcome::Resolved { final_content } =
            tracker.resolve_conflict(id, MergeStrategy::Append, None, None)
        else {
            panic!("expected resolution");
        };
        assert_eq!(final_content, "[agentA]:\nx\n\n[agentB]:\ny");
    }

    #[test]
    fn manual_resolve_without_content_forces_manual_review() {
        let tracker = tracker();
        tracker.record_write("f.md", &AgentId::new("agentA"), "x", at(1));
        tracker.record_write("f.md", &AgentId::new("agentB"), "y", at(2));
        let id = tracker.list_conflicts(None)[0].id;

        let outcome = tracker.resolve_conflict(id, MergeStrategy::Manual, None, None);
        assert_eq!(outcome, ResolveOutcome::ManualContentRequired);
        assert_eq!(
            tracker.list_conflicts(Some(ConflictStatus::ManualReview)).len(),
            1
        );

        // Empty content counts as missing too.
        let outcome =
            tracker.resolve_conflict(id, MergeStrategy::Manual, Some("  ".to_string()), None);
        assert_eq!(outcome, ResolveOutcome::ManualContentRequired);

        // A real manual resolution still works afterwards.
        let outcome = tracker.resolve_conflict(
            id,
            MergeStrategy::Manual,
            Some("merged by hand".to_string()),
            Some(AgentId::new("lead")),
        );
        assert!(outcome.resolved());
        let resolved = tracker.list_conflicts(Some(ConflictStatus::Resolved));
        assert_eq!(resolved[0].resolved_by, Some(AgentId::new("lead")));
    }

    #[test]
    fn re_resolving_is_idempotent() {
        let tracker = tracker();
        tracker.record_write("f.md", &AgentId::new("agentA"), "x", at(1));
        tracker.record_write("f.md", &AgentId::new("agentB"), "y", at(2));
        let id = tracker.list_conflicts(None)[0].id;

        assert!(tracker
            .resolve_conflict(id, MergeStrategy::LastWriteWins, None, None)
            .resolved());
        assert_eq!(
            tracker.resolve_conflict(id, MergeStrategy::FirstWriteWins, None, None),
            ResolveOutcome::AlreadyResolved
        );
    }

    #[test]
    fn resolve_unknown_conflict_is_not_found() {
        let tracker = tracker();
        assert_eq!(
            tracker.resolve_conflict(ConflictId::new(), MergeStrategy::Append, None, None),
            ResolveOutcome::NotFound
        );
    }

    #[test]
    fn write_after_resolution_conflicts_against_write_back() {
        let tracker = tracker();
        tracker.record_write("f.md", &AgentId::new("agentA"), "x", at(1));
        tracker.record_write("f.md", &AgentId::new("agentB"), "y", at(2));
        let id = tracker.list_conflicts(None)[0].id;
        tracker.resolve_conflict(id, MergeStrategy::LastWriteWins, None, None);

        // The write-back is the new baseline; a different agent writing again
        // opens a fresh conflict rather than reviving the resolved one.
        tracker.record_write("f.md", &AgentId::new("agentC"), "z", at(10));
        let open = tracker.list_conflicts(Some(ConflictStatus::Detected));
        assert_eq!(open.len(), 1);
        assert_ne!(open[0].id, id);
    }

    #[test]
    fn status_filter_narrows_listing() {
        let tracker = tracker();
        tracker.record_write("a.md", &AgentId::new("agentA"), "x", at(1));
        tracker.record_write("a.md", &AgentId::new("agentB"), "y", at(2));
        tracker.record_write("b.md", &AgentId::new("agentA"), "x", at(3));
        tracker.record_write("b.md", &AgentId::new("agentB"), "y", at(4));

        let id = tracker.list_conflicts(None)[0].id;
        tracker.resolve_conflict(id, MergeStrategy::Append, None, None);

        assert_eq!(tracker.list_conflicts(None).len(), 2);
        assert_eq!(tracker.list_conflicts(Some(ConflictStatus::Detected)).len(), 1);
        assert_eq!(tracker.list_conflicts(Some(ConflictStatus::Resolved)).len(), 1);
    }
}
