// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Directed message bus with synchronous reply-back.
//!
//! Delivery is synchronous and in-process: when the target session has a
//! registered handler, the handler runs on the sender's call. Every delivery
//! attempt is also broadcast to passive observers. A reply-back send parks a
//! oneshot keyed by the sender and races it against a timer; timing out
//! removes the stale entry so late replies are dropped, not leaked.

use crate::domain::events::CoordinationEvent;
use crate::domain::message::{BusMessage, DeliveryReceipt, SendOptions};
use crate::domain::session::SessionId;
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Handler invoked synchronously for each message delivered to a session.
pub type MessageHandler = Arc<dyn Fn(BusMessage) + Send + Sync>;

struct PendingReply {
    correlation: Uuid,
    tx: oneshot::Sender<String>,
}

struct BusState {
    /// One active handler per session; newest registration replaces oldest.
    handlers: HashMap<SessionId, (u64, MessageHandler)>,
    /// Reply waits keyed by the waiting sender, oldest first.
    pending: HashMap<SessionId, VecDeque<PendingReply>>,
}

struct BusInner {
    state: Mutex<BusState>,
    epoch: AtomicU64,
    events: EventBus,
}

pub struct MessageBus {
    inner: Arc<BusInner>,
    default_reply_timeout: Duration,
}

impl MessageBus {
    pub fn new(default_reply_timeout: Duration, events: EventBus) -> Self {
        Self {
            inner: Arc::new(BusInner {
                state: Mutex::new(BusState {
                    handlers: HashMap::new(),
                    pending: HashMap::new(),
                }),
                epoch: AtomicU64::new(0),
                events,
            }),
            default_reply_timeout,
        }
    }

    /// Register the handler for a session, superseding any previous one.
    /// Dropping the returned guard (or calling [`HandlerGuard::unregister`])
    /// removes the registration, unless it was superseded in the meantime.
    pub fn register_handler(
        &self,
        session_id: impl Into<SessionId>,
        handler: MessageHandler,
    ) -> HandlerGuard {
        let session_id = session_id.into();
        let epoch = self.inner.epoch.fetch_add(1, Ordering::Relaxed);

        let mut state = self.inner.state.lock();
        let superseded = state
            .handlers
            .insert(session_id.clone(), (epoch, handler))
            .is_some();
        drop(state);

        if superseded {
            debug!(session_id = %session_id, "handler superseded by new registration");
        } else {
            debug!(session_id = %session_id, "handler registered");
        }
        HandlerGuard {
            inner: Arc::clone(&self.inner),
            session_id,
            epoch,
        }
    }

    /// Send `content` from one session to another.
    ///
    /// Delivery is synchronous when a handler is registered; sending to a
    /// session without one still succeeds with `delivered = false` (the
    /// target may simply be idle). With `reply_back` the call suspends until
    /// a correlated reply arrives or the timeout elapses — a timeout is a
    /// normal outcome, not an error.
    pub async fn send(
        &self,
        from: &SessionId,
        to: &SessionId,
        content: impl Into<String>,
        options: SendOptions,
    ) -> DeliveryReceipt {
        let content = content.into();
        let content = if options.announce {
            format!("[from {from}] {content}")
        } else {
            content
        };

        // Park the reply wait before delivering, so a handler that replies
        // synchronously from inside the delivery call is still correlated.
        let wait = if options.reply_back {
            let correlation = Uuid::new_v4();
            let (tx, rx) = oneshot::channel();
            let mut state = self.inner.state.lock();
            state
                .pending
                .entry(from.clone())
                .or_default()
                .push_back(PendingReply { correlation, tx });
            Some((correlation, rx))
        } else {
            None
        };

        let handler = {
            let state = self.inner.state.lock();
            state.handlers.get(to).map(|(_, h)| Arc::clone(h))
        };
        let delivered = handler.is_some();

        if let Some(handler) = handler {
            // Invoked outside the state guard: the handler may itself send,
            // reply, or register on this bus.
            handler(BusMessage {
                from: from.clone(),
                to: to.clone(),
                content: content.clone(),
                sent_at: Utc::now(),
            });
        }

        debug!(from = %from, to = %to, delivered = delivered, "message sent");
        self.inner.events.publish(CoordinationEvent::MessageDelivered {
            from: from.clone(),
            to: to.clone(),
            content,
            delivered,
        });

        let Some((correlation, rx)) = wait else {
            return DeliveryReceipt::sent(delivered);
        };

        let timeout = options.reply_timeout.unwrap_or(self.default_reply_timeout);
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => DeliveryReceipt::replied(delivered, reply),
            // Sender half dropped without a reply; treat like a timeout.
            Ok(Err(_)) => self.reply_wait_lapsed(from, correlation, delivered),
            Err(_) => self.reply_wait_lapsed(from, correlation, delivered),
        }
    }

    /// Deliver a reply to the oldest pending reply-wait of `to_original_sender`.
    /// Returns `false` when no wait is pending: unsolicited replies are
    /// dropped, never queued.
    pub fn reply(&self, to_original_sender: &SessionId, content: impl Into<String>) -> bool {
        let entry = {
            let mut state = self.inner.state.lock();
            match state.pending.get_mut(to_original_sender) {
                Some(queue) => {
                    // Skip waits whose receiver is already gone (timed out or
                    // dropped but not yet swept) so the reply lands on the
                    // oldest wait that can still hear it.
                    let mut entry = None;
                    while let Some(pending) = queue.pop_front() {
                        if !pending.tx.is_closed() {
                            entry = Some(pending);
                            break;
                        }
                    }
                    if queue.is_empty() {
                        state.pending.remove(to_original_sender);
                    }
                    entry
                }
                None => None,
            }
        };

        match entry {
            Some(pending) => {
                let accepted = pending.tx.send(content.into()).is_ok();
                if !accepted {
                    debug!(
                        session_id = %to_original_sender,
                        "reply arrived after the waiter gave up"
                    );
                }
                accepted
            }
            None => {
                debug!(session_id = %to_original_sender, "reply dropped: no pending wait");
                false
            }
        }
    }

    /// Remove a stale reply-wait after its timer won the race.
    fn reply_wait_lapsed(
        &self,
        from: &SessionId,
        correlation: Uuid,
        delivered: bool,
    ) -> DeliveryReceipt {
        let mut state = self.inner.state.lock();
        if let Some(queue) = state.pending.get_mut(from) {
            queue.retain(|p| p.correlation != correlation);
            if queue.is_empty() {
                state.pending.remove(from);
            }
        }
        drop(state);

        warn!(session_id = %from, "reply-back timed out");
        self.inner
            .events
            .publish(CoordinationEvent::ReplyTimedOut {
                waiting: from.clone(),
            });
        DeliveryReceipt::reply_timed_out(delivered)
    }
}

/// Keeps a handler registration alive; unregisters on drop.
pub struct HandlerGuard {
    inner: Arc<BusInner>,
    session_id: SessionId,
    epoch: u64,
}

impl HandlerGuard {
    pub fn unregister(self) {
        // Drop does the work.
    }
}

impl Drop for HandlerGuard {
    fn drop(&mut self) {
        let mut state = self.inner.state.lock();
        // Only remove our own registration; a newer one stays.
        let matches = state
            .handlers
            .get(&self.session_id)
            .is_some_and(|(epoch, _)| *epoch == self.epoch);
        if matches {
            state.handlers.remove(&self.session_id);
            drop(state);
            info!(session_id = %self.session_id, "handler unregistered");
        }
    }
}
