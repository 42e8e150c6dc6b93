// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Fan-out/fan-in orchestration over an injected agent spawner.
//!
//! `fan_out` starts one run per sub-task through the external
//! [`AgentSpawner`] and returns immediately. Each spawned run reports its
//! result by sending to the group's report session on the message bus — that
//! reporting is the runtime's contract, not implemented here. `fan_in`
//! suspends until every sub-task has reported or the group's deadline passes,
//! then aggregates outputs in submission order. No automatic retries: a
//! silent sub-task degrades to `(no response)` and retrying is the caller's
//! business via a new fan-out.

use crate::application::message_bus::{HandlerGuard, MessageBus};
use crate::domain::coordination::{
    CoordinationGroup, CoordinationId, CoordinationStatus, FanInOutcome, FanOutReceipt, SubTask,
    SubTaskSpec,
};
use crate::domain::events::CoordinationEvent;
use crate::domain::message::BusMessage;
use crate::domain::session::{AgentId, RunId, SessionId};
use crate::domain::spawner::{AgentSpawner, SpawnOptions};
use crate::infrastructure::event_bus::EventBus;
use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

struct GroupState {
    group: CoordinationGroup,
    notify: Arc<Notify>,
    /// Keeps the report-session bus handler registered until the group retires.
    _handler: HandlerGuard,
}

pub struct FanOutOrchestrator {
    spawner: Arc<dyn AgentSpawner>,
    bus: Arc<MessageBus>,
    groups: Arc<Mutex<HashMap<CoordinationId, GroupState>>>,
    events: EventBus,
}

impl FanOutOrchestrator {
    pub fn new(spawner: Arc<dyn AgentSpawner>, bus: Arc<MessageBus>, events: EventBus) -> Self {
        Self {
            spawner,
            bus,
            groups: Arc::new(Mutex::new(HashMap::new())),
            events,
        }
    }

    /// Start one run per sub-task and return without waiting for any of them.
    ///
    /// Spawner failures are the one genuinely unexpected outcome here and
    /// propagate as `Err`; runs already started before the failure keep
    /// running (their reports land on a group that was never created and are
    /// dropped by the bus).
    pub async fn fan_out(
        &self,
        parent_session_id: &SessionId,
        source_agent_id: &AgentId,
        tasks: Vec<SubTaskSpec>,
        timeout: Duration,
    ) -> Result<FanOutReceipt> {
        let coordination_id = CoordinationId::new();
        let report_session = coordination_id.report_session();

        let mut sub_tasks = Vec::with_capacity(tasks.len());
        let mut run_ids = Vec::with_capacity(tasks.len());
        for spec in tasks {
            let run_id = self
                .spawner
                .spawn_agent_run(
                    &spec.agent_id,
                    &spec.task,
                    SpawnOptions {
                        label: spec.label.clone(),
                        model: spec.model.clone(),
                        report_to: Some(report_session.clone()),
                    },
                )
                .await
                .with_context(|| format!("spawning sub-task for agent {}", spec.agent_id))?;

            run_ids.push(run_id.clone());
            sub_tasks.push(SubTask {
                agent_id: spec.agent_id,
                task: spec.task,
                label: spec.label,
                run_id,
                output: None,
            });
        }

        let task_count = sub_tasks.len();
        let group = CoordinationGroup {
            id: coordination_id,
            parent_session_id: parent_session_id.clone(),
            source_agent_id: source_agent_id.clone(),
            sub_tasks,
            timeout_at: chrono::Duration::from_std(timeout)
                .ok()
                .and_then(|timeout| Utc::now().checked_add_signed(timeout))
                .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC),
            status: CoordinationStatus::Running,
        };

        let notify = Arc::new(Notify::new());
        let handler = self.report_handler(coordination_id);
        let guard = self.bus.register_handler(report_session, handler);

        self.groups.lock().insert(
            coordination_id,
            GroupState {
                group,
                notify,
                _handler: guard,
            },
        );

        info!(
            coordination_id = %coordination_id,
            parent_session_id = %parent_session_id,
            task_count = task_count,
            "fan-out started"
        );
        self.events.publish(CoordinationEvent::FanOutStarted {
            coordination_id,
            parent_session_id: parent_session_id.clone(),
            task_count,
        });

        Ok(FanOutReceipt {
            coordination_id,
            run_ids,
        })
    }

    /// Suspend until every sub-task of the group has reported, or its
    /// deadline passes. The group retires once this returns: a second fan-in
    /// for the same id sees `NotFound`.
    pub async fn fan_in(&self, coordination_id: CoordinationId) -> FanInOutcome {
        let finished = loop {
            let (notify, remaining) = {
                let mut groups = self.groups.lock();
                let Some(state) = groups.get_mut(&coordination_id) else {
                    debug!(coordination_id = %coordination_id, "fan-in on unknown coordination");
                    return FanInOutcome::NotFound;
                };

                let all_reported = state.group.all_reported();
                let remaining = (state.group.timeout_at - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                if all_reported || remaining.is_zero() {
                    state.group.status = if all_reported {
                        CoordinationStatus::Completed
                    } else {
                        CoordinationStatus::TimedOut
                    };
                    match groups.remove(&coordination_id) {
                        Some(retired) => break retired.group,
                        None => return FanInOutcome::NotFound,
                    }
                }

                (Arc::clone(&state.notify), remaining)
            };

            // Re-check after either a report lands or the deadline passes.
            tokio::select! {
                () = notify.notified() => {}
                () = tokio::time::sleep(remaining) => {}
            }
        };

        if finished.status == CoordinationStatus::TimedOut {
            warn!(
                coordination_id = %coordination_id,
                unreported = finished.sub_tasks.iter().filter(|t| !t.reported()).count(),
                "fan-in timed out"
            );
        } else {
            info!(coordination_id = %coordination_id, "fan-in completed");
        }
        self.events.publish(CoordinationEvent::CoordinationFinished {
            coordination_id,
            status: finished.status,
        });

        FanInOutcome::Finished {
            status: finished.status,
            aggregated: finished.aggregate(),
        }
    }

    /// Running groups, for inspection. Retired groups are gone.
    pub fn list_running(&self) -> Vec<CoordinationGroup> {
        self.groups
            .lock()
            .values()
            .map(|s| s.group.clone())
            .collect()
    }

    /// Bus handler for a group's report session: each report's sender names
    /// the reporting agent, the content is its output.
    fn report_handler(
        &self,
        coordination_id: CoordinationId,
    ) -> Arc<dyn Fn(BusMessage) + Send + Sync> {
        let groups = Arc::clone(&self.groups);
        let events = self.events.clone();
        Arc::new(move |msg: BusMessage| {
            let agent_id = AgentId::new(msg.from.as_str());
            let mut groups = groups.lock();
            let Some(state) = groups.get_mut(&coordination_id) else {
                // Late report after retirement; nothing to record.
                return;
            };

            if state.group.record_report(&agent_id, msg.content) {
                debug!(
                    coordination_id = %coordination_id,
                    agent_id = %agent_id,
                    "sub-task reported"
                );
                events.publish(CoordinationEvent::SubTaskReported {
                    coordination_id,
                    agent_id,
                });
                if state.group.all_reported() {
                    state.notify.notify_one();
                }
            } else {
                debug!(
                    coordination_id = %coordination_id,
                    agent_id = %agent_id,
                    "report ignored: no unreported sub-task for this agent"
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::SendOptions;
    use crate::domain::spawner::SpawnError;
    use async_trait::async_trait;

    /// Synchronous fake spawner: records calls, hands out sequential run ids,
    /// never actually runs anything.
    struct FakeSpawner {
        calls: Mutex<Vec<(AgentId, String, SpawnOptions)>>,
        fail_for: Option<AgentId>,
    }

    impl FakeSpawner {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_for: None,
            }
        }
    }

    #[async_trait]
    impl AgentSpawner for FakeSpawner {
        async fn spawn_agent_run(
            &self,
            agent_id: &AgentId,
            task: &str,
            options: SpawnOptions,
        ) -> Result<RunId, SpawnError> {
            if self.fail_for.as_ref() == Some(agent_id) {
                return Err(SpawnError::Rejected(
                    agent_id.clone(),
                    "quota exceeded".to_string(),
                ));
            }
            let mut calls = self.calls.lock();
            calls.push((agent_id.clone(), task.to_string(), options));
            Ok(RunId::new(format!("run-{}", calls.len())))
        }
    }

    fn fixture() -> (FanOutOrchestrator, Arc<MessageBus>, Arc<FakeSpawner>) {
        let events = EventBus::new(64);
        let bus = Arc::new(MessageBus::new(Duration::from_secs(5), events.clone()));
        let spawner = Arc::new(FakeSpawner::new());
        let orchestrator =
            FanOutOrchestrator::new(spawner.clone(), Arc::clone(&bus), events);
        (orchestrator, bus, spawner)
    }

    fn three_tasks() -> Vec<SubTaskSpec> {
        vec![
            SubTaskSpec::new(AgentId::new("researcher"), "find sources").with_label("Research"),
            SubTaskSpec::new(AgentId::new("writer"), "draft the report"),
            SubTaskSpec::new(AgentId::new("reviewer"), "check the draft").with_label("Review"),
        ]
    }

    async fn report(bus: &MessageBus, id: CoordinationId, agent: &str, output: &str) {
        bus.send(
            &SessionId::new(agent),
            &id.report_session(),
            output,
            SendOptions::plain(),
        )
        .await;
    }

    #[tokio::test]
    async fn fan_out_returns_immediately_with_run_ids() {
        let (orchestrator, _bus, spawner) = fixture();

        let start = std::time::Instant::now();
        let receipt = orchestrator
            .fan_out(
                &SessionId::new("main"),
                &AgentId::new("lead"),
                three_tasks(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_millis(10));
        assert_eq!(receipt.run_ids.len(), 3);

        let calls = spawner.calls.lock();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0].2.report_to,
            Some(receipt.coordination_id.report_session())
        );
    }

    #[tokio::test]
    async fn fan_in_completes_in_submission_order() {
        let (orchestrator, bus, _spawner) = fixture();
        let receipt = orchestrator
            .fan_out(
                &SessionId::new("main"),
                &AgentId::new("lead"),
                three_tasks(),
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        let id = receipt.coordination_id;

        // Reports land out of submission order.
        report(&bus, id, "reviewer", "looks good").await;
        report(&bus, id, "researcher", "ten sources").await;
        report(&bus, id, "writer", "draft attached").await;

        let FanInOutcome::Finished { status, aggregated } = orchestrator.fan_in(id).await else {
            panic!("expected finished outcome");
        };
        assert_eq!(status, CoordinationStatus::Completed);
        assert_eq!(
            aggregated,
            "## Research\nten sources\n\n## writer\ndraft attached\n\n## Review\nlooks good"
        );
    }

    #[tokio::test]
    async fn fan_in_wakes_on_late_reports() {
        let (orchestrator, bus, _spawner) = fixture();
        let receipt = orchestrator
            .fan_out(
                &SessionId::new("main"),
                &AgentId::new("lead"),
                vec![SubTaskSpec::new(AgentId::new("solo"), "work")],
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        let id = receipt.coordination_id;

        let bus_for_report = Arc::clone(&bus);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            report(&bus_for_report, id, "solo", "done").await;
        });

        let start = std::time::Instant::now();
        let FanInOutcome::Finished { status, .. } = orchestrator.fan_in(id).await else {
            panic!("expected finished outcome");
        };
        assert_eq!(status, CoordinationStatus::Completed);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn silent_sub_task_degrades_to_timeout() {
        let (orchestrator, bus, _spawner) = fixture();
        let receipt = orchestrator
            .fan_out(
                &SessionId::new("main"),
                &AgentId::new("lead"),
                three_tasks(),
                Duration::from_millis(200),
            )
            .await
            .unwrap();
        let id = receipt.coordination_id;

        report(&bus, id, "researcher", "ten sources").await;
        report(&bus, id, "reviewer", "looks good").await;
        // The writer never reports.

        let FanInOutcome::Finished { status, aggregated } = orchestrator.fan_in(id).await else {
            panic!("expected finished outcome");
        };
        assert_eq!(status, CoordinationStatus::TimedOut);
        assert!(aggregated.contains("## Research\nten sources"));
        assert!(aggregated.contains("## writer\n(no response)"));
        assert!(aggregated.contains("## Review\nlooks good"));
    }

    #[tokio::test]
    async fn fan_in_on_unknown_id_is_not_found() {
        let (orchestrator, _bus, _spawner) = fixture();
        assert_eq!(
            orchestrator.fan_in(CoordinationId::new()).await,
            FanInOutcome::NotFound
        );
    }

    #[tokio::test]
    async fn group_retires_after_fan_in() {
        let (orchestrator, bus, _spawner) = fixture();
        let receipt = orchestrator
            .fan_out(
                &SessionId::new("main"),
                &AgentId::new("lead"),
                vec![SubTaskSpec::new(AgentId::new("solo"), "work")],
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        let id = receipt.coordination_id;

        report(&bus, id, "solo", "done").await;
        assert!(matches!(
            orchestrator.fan_in(id).await,
            FanInOutcome::Finished { .. }
        ));
        assert_eq!(orchestrator.fan_in(id).await, FanInOutcome::NotFound);
        assert!(orchestrator.list_running().is_empty());

        // Retirement also unregistered the report session handler.
        let receipt = bus
            .send(
                &SessionId::new("solo"),
                &id.report_session(),
                "late",
                SendOptions::plain(),
            )
            .await;
        assert!(!receipt.delivered);
    }

    #[tokio::test]
    async fn duplicate_agent_ids_fill_in_submission_order() {
        let (orchestrator, bus, _spawner) = fixture();
        let receipt = orchestrator
            .fan_out(
                &SessionId::new("main"),
                &AgentId::new("lead"),
                vec![
                    SubTaskSpec::new(AgentId::new("worker"), "part one").with_label("One"),
                    SubTaskSpec::new(AgentId::new("worker"), "part two").with_label("Two"),
                ],
                Duration::from_secs(5),
            )
            .await
            .unwrap();
        let id = receipt.coordination_id;

        report(&bus, id, "worker", "first result").await;
        report(&bus, id, "worker", "second result").await;

        let FanInOutcome::Finished { aggregated, .. } = orchestrator.fan_in(id).await else {
            panic!("expected finished outcome");
        };
        assert_eq!(
            aggregated,
            "## One\nfirst result\n\n## Two\nsecond result"
        );
    }

    #[tokio::test]
    async fn spawn_failure_propagates() {
        let events = EventBus::new(64);
        let bus = Arc::new(MessageBus::new(Duration::from_secs(5), events.clone()));
        let spawner = Arc::new(FakeSpawner {
            calls: Mutex::new(Vec::new()),
            fail_for: Some(AgentId::new("writer")),
        });
        let orchestrator = FanOutOrchestrator::new(spawner, bus, events);

        let result = orchestrator
            .fan_out(
                &SessionId::new("main"),
                &AgentId::new("lead"),
                three_tasks(),
                Duration::from_secs(5),
            )
            .await;
        assert!(result.is_err());
        assert!(orchestrator.list_running().is_empty());
    }
}
