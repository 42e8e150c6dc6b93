// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Advisory resource locking with TTL auto-expiry.
//!
//! Locks are voluntary markers: tools call [`LockRegistry::acquire`] before
//! mutating a shared resource and [`LockRegistry::release`] afterward. Nothing
//! here can stop an uncooperative writer. There is no wait queue, so there is
//! no deadlock; contended callers retry at their own discretion.

use crate::domain::events::CoordinationEvent;
use crate::domain::lock::{AcquireOutcome, LockStatus, ResourceLock};
use crate::domain::session::AgentId;
use crate::infrastructure::event_bus::EventBus;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

pub struct LockRegistry {
    locks: Mutex<HashMap<String, ResourceLock>>,
    default_ttl: Duration,
    events: EventBus,
}

impl LockRegistry {
    pub fn new(default_ttl: Duration, events: EventBus) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            default_ttl,
            events,
        }
    }

    /// Attempt to acquire the lock on `resource_key`.
    ///
    /// Succeeds iff no live lock exists. Re-acquiring by the current holder
    /// renews the TTL (idempotent refresh). Expiry is lazy: a lapsed lock is
    /// removed before the request is evaluated.
    pub fn acquire(
        &self,
        resource_key: &str,
        holder: &AgentId,
        ttl: Option<Duration>,
        purpose: Option<String>,
    ) -> AcquireOutcome {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let now = Utc::now();
        // Saturate absurd TTLs instead of overflowing the timestamp.
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);

        let mut locks = self.locks.lock();
        self.purge_if_expired(&mut locks, resource_key, now);

        if let Some(existing) = locks.get(resource_key) {
            if existing.holder != *holder {
                debug!(
                    resource_key = %resource_key,
                    holder = %holder,
                    held_by = %existing.holder,
                    "lock acquire contended"
                );
                return AcquireOutcome::contended(existing.holder.clone());
            }
        }

        locks.insert(
            resource_key.to_string(),
            ResourceLock {
                resource_key: resource_key.to_string(),
                holder: holder.clone(),
                acquired_at: now,
                expires_at,
                purpose,
            },
        );
        drop(locks);

        info!(resource_key = %resource_key, holder = %holder, "lock acquired");
        self.events.publish(CoordinationEvent::LockAcquired {
            resource_key: resource_key.to_string(),
            holder: holder.clone(),
            expires_at,
        });
        AcquireOutcome::granted()
    }

    /// Release the lock on `resource_key`. No-op (`false`) unless the caller
    /// is the current holder, so one agent cannot release another's lock.
    pub fn release(&self, resource_key: &str, holder: &AgentId) -> bool {
        let now = Utc::now();
        let mut locks = self.locks.lock();
        self.purge_if_expired(&mut locks, resource_key, now);

        match locks.get(resource_key) {
            Some(lock) if lock.holder == *holder => {
                locks.remove(resource_key);
                drop(locks);
                info!(resource_key = %resource_key, holder = %holder, "lock released");
                self.events.publish(CoordinationEvent::LockReleased {
                    resource_key: resource_key.to_string(),
                    holder: holder.clone(),
                });
                true
            }
            Some(lock) => {
                debug!(
                    resource_key = %resource_key,
                    holder = %holder,
                    held_by = %lock.holder,
                    "release refused: caller is not the holder"
                );
                false
            }
            None => false,
        }
    }

    /// Snapshot whether `resource_key` is currently locked, and by whom.
    pub fn is_locked(&self, resource_key: &str) -> LockStatus {
        let now = Utc::now();
        let mut locks = self.locks.lock();
        self.purge_if_expired(&mut locks, resource_key, now);

        match locks.get(resource_key) {
            Some(lock) => LockStatus::held(lock.holder.clone()),
            None => LockStatus::unlocked(),
        }
    }

    /// All live locks, expired ones purged first.
    pub fn list(&self) -> Vec<ResourceLock> {
        let now = Utc::now();
        let mut locks = self.locks.lock();

        let expired: Vec<String> = locks
            .values()
            .filter(|l| l.is_expired(now))
            .map(|l| l.resource_key.clone())
            .collect();
        for key in expired {
            self.purge_if_expired(&mut locks, &key, now);
        }

        let mut live: Vec<ResourceLock> = locks.values().cloned().collect();
        live.sort_by(|a, b| a.resource_key.cmp(&b.resource_key));
        live
    }

    fn purge_if_expired(
        &self,
        locks: &mut HashMap<String, ResourceLock>,
        resource_key: &str,
        now: chrono::DateTime<Utc>,
    ) {
        let lapsed = locks
            .get(resource_key)
            .is_some_and(|lock| lock.is_expired(now));
        if lapsed {
            if let Some(lock) = locks.remove(resource_key) {
                debug!(resource_key = %resource_key, holder = %lock.holder, "lock expired");
                self.events.publish(CoordinationEvent::LockExpired {
                    resource_key: lock.resource_key,
                    holder: lock.holder,
                });
            }
        }
    }
}
