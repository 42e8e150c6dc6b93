// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod conflict_tracker;
pub mod context_store;
pub mod coordinator;
pub mod lock_registry;
pub mod message_bus;
pub mod orchestrator;

pub use conflict_tracker::ConflictTracker;
pub use context_store::ContextStore;
pub use coordinator::Coordinator;
pub use lock_registry::LockRegistry;
pub use message_bus::{HandlerGuard, MessageBus, MessageHandler};
pub use orchestrator::FanOutOrchestrator;
