// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Composition root: one Coordinator wires the five capability services
// around a shared observer event bus. The tool layer holds this and nothing
// else.

use crate::application::conflict_tracker::ConflictTracker;
use crate::application::context_store::ContextStore;
use crate::application::lock_registry::LockRegistry;
use crate::application::message_bus::MessageBus;
use crate::application::orchestrator::FanOutOrchestrator;
use crate::domain::config::CoordinationConfig;
use crate::domain::spawner::AgentSpawner;
use crate::infrastructure::event_bus::{EventBus, EventReceiver};
use std::sync::Arc;

pub struct Coordinator {
    config: CoordinationConfig,
    events: EventBus,
    locks: Arc<LockRegistry>,
    conflicts: Arc<ConflictTracker>,
    context: Arc<ContextStore>,
    bus: Arc<MessageBus>,
    orchestrator: Arc<FanOutOrchestrator>,
}

impl Coordinator {
    pub fn new(config: CoordinationConfig, spawner: Arc<dyn AgentSpawner>) -> Self {
        let events = EventBus::new(config.event_capacity);
        let locks = Arc::new(LockRegistry::new(config.default_lock_ttl, events.clone()));
        let conflicts = Arc::new(ConflictTracker::new(events.clone()));
        let context = Arc::new(ContextStore::new(events.clone()));
        let bus = Arc::new(MessageBus::new(
            config.default_reply_timeout,
            events.clone(),
        ));
        let orchestrator = Arc::new(FanOutOrchestrator::new(
            spawner,
            Arc::clone(&bus),
            events.clone(),
        ));

        Self {
            config,
            events,
            locks,
            conflicts,
            context,
            bus,
            orchestrator,
        }
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    pub fn locks(&self) -> &Arc<LockRegistry> {
        &self.locks
    }

    pub fn conflicts(&self) -> &Arc<ConflictTracker> {
        &self.conflicts
    }

    pub fn context(&self) -> &Arc<ContextStore> {
        &self.context
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn orchestrator(&self) -> &Arc<FanOutOrchestrator> {
        &self.orchestrator
    }

    /// Subscribe to the observer feed of coordination activity.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }
}
