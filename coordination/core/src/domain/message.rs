// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A directed message as delivered to a session handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusMessage {
    pub from: SessionId,
    pub to: SessionId,
    /// Payload as delivered. With `announce` the sender identity is prepended.
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// Per-send options for [`MessageBus::send`](crate::application::MessageBus::send).
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Suspend until a correlated reply arrives or the timeout elapses.
    pub reply_back: bool,
    /// Reply deadline; falls back to the configured default when `None`.
    pub reply_timeout: Option<Duration>,
    /// Prepend `[from <sender>]` to the content before delivery.
    pub announce: bool,
}

impl SendOptions {
    /// Fire-and-forget send.
    pub fn plain() -> Self {
        Self::default()
    }

    /// Reply-back send with an explicit deadline.
    pub fn reply_within(timeout: Duration) -> Self {
        Self {
            reply_back: true,
            reply_timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn announced(mut self) -> Self {
        self.announce = true;
        self
    }
}

/// Outcome of one send. Absence of a handler and reply timeouts are normal
/// results, never errors: the target session may simply be idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Whether a registered handler received the message synchronously.
    pub delivered: bool,
    /// The correlated reply, when `reply_back` was requested and one arrived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<String>,
    /// Set when `reply_back` was requested and the deadline elapsed first.
    pub timed_out: bool,
}

impl DeliveryReceipt {
    pub fn sent(delivered: bool) -> Self {
        Self {
            delivered,
            reply: None,
            timed_out: false,
        }
    }

    pub fn replied(delivered: bool, reply: String) -> Self {
        Self {
            delivered,
            reply: Some(reply),
            timed_out: false,
        }
    }

    pub fn reply_timed_out(delivered: bool) -> Self {
        Self {
            delivered,
            reply: None,
            timed_out: true,
        }
    }
}
