// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Coordination defaults. Loaded from the host's config file by the embedding
// runtime; every field has a serde default so a missing section works.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable defaults for the coordination substrate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinationConfig {
    /// Lock TTL applied when `acquire` is called without an explicit TTL.
    #[serde(with = "humantime_serde", default = "default_lock_ttl")]
    pub default_lock_ttl: Duration,

    /// Reply deadline applied when a reply-back send gives no timeout.
    #[serde(with = "humantime_serde", default = "default_reply_timeout")]
    pub default_reply_timeout: Duration,

    /// Broadcast capacity of the observer event feed. Slow observers past
    /// this many buffered events start lagging (events dropped for them).
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            default_lock_ttl: default_lock_ttl(),
            default_reply_timeout: default_reply_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_lock_ttl() -> Duration {
    Duration::from_secs(300)
}

fn default_reply_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_event_capacity() -> usize {
    1024
}
