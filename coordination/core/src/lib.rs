// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Concord core — in-process coordination substrate for multi-agent sessions.
//!
//! Five capabilities behind one [`Coordinator`](application::Coordinator):
//! advisory resource locks with TTL, conflict detection/resolution for
//! competing writes, a versioned shared context store, a directed message bus
//! with synchronous reply-back, and a fan-out/fan-in orchestrator over an
//! injected agent spawner.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Coordination primitives consumed by tool-layer adapters

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
