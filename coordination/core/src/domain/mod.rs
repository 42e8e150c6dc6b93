// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod config;
pub mod conflict;
pub mod context;
pub mod coordination;
pub mod events;
pub mod lock;
pub mod message;
pub mod session;
pub mod spawner;

pub use config::CoordinationConfig;
pub use conflict::{Conflict, ConflictId, ConflictStatus, MergeStrategy, ResolveOutcome, WriteRecord};
pub use context::{ContextEntry, NamespaceSummary};
pub use coordination::{
    CoordinationGroup, CoordinationId, CoordinationStatus, FanInOutcome, FanOutReceipt, SubTask,
    SubTaskSpec,
};
pub use events::CoordinationEvent;
pub use lock::{AcquireOutcome, LockStatus, ResourceLock};
pub use message::{BusMessage, DeliveryReceipt, SendOptions};
pub use session::{AgentId, RunId, SessionId};
pub use spawner::{AgentSpawner, SpawnError, SpawnOptions};
