// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Namespaced, versioned shared key-value store.
//!
//! `namespace` + `key` is the addressable unit. Version counters are kept
//! separately from entries so a delete (or a namespace clear) can never reset
//! them: versions per key increase strictly forever, which lets stale readers
//! detect staleness by comparison. Entries carry an optional TTL with lazy
//! expiry on the read paths.

use crate::domain::context::{ContextEntry, NamespaceSummary};
use crate::domain::events::CoordinationEvent;
use crate::domain::session::AgentId;
use crate::infrastructure::event_bus::EventBus;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info};

struct StoreState {
    namespaces: HashMap<String, HashMap<String, ContextEntry>>,
    /// Monotonic version per (namespace, key). Survives deletes and clears.
    versions: HashMap<(String, String), u64>,
}

pub struct ContextStore {
    state: Mutex<StoreState>,
    events: EventBus,
}

impl ContextStore {
    pub fn new(events: EventBus) -> Self {
        Self {
            state: Mutex::new(StoreState {
                namespaces: HashMap::new(),
                versions: HashMap::new(),
            }),
            events,
        }
    }

    /// Write a value, bumping the key's version. Returns the stored entry.
    pub fn write(
        &self,
        namespace: &str,
        key: &str,
        value: impl Into<String>,
        written_by: &AgentId,
        ttl: Option<Duration>,
        metadata: Option<serde_json::Value>,
    ) -> ContextEntry {
        let now = Utc::now();
        let expires_at = ttl.map(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl))
                .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC)
        });

        let mut state = self.state.lock();
        let version = *state
            .versions
            .entry((namespace.to_string(), key.to_string()))
            .and_modify(|v| *v += 1)
            .or_insert(1);

        let entry = ContextEntry {
            namespace: namespace.to_string(),
            key: key.to_string(),
            value: value.into(),
            version,
            written_by: written_by.clone(),
            written_at: now,
            expires_at,
            metadata,
        };
        state
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), entry.clone());
        drop(state);

        info!(
            namespace = %namespace,
            key = %key,
            version = version,
            written_by = %written_by,
            "context written"
        );
        self.events.publish(CoordinationEvent::ContextWritten {
            namespace: namespace.to_string(),
            key: key.to_string(),
            version,
            written_by: written_by.clone(),
        });
        entry
    }

    /// Latest non-expired entry for the key, or `None`.
    pub fn read(&self, namespace: &str, key: &str) -> Option<ContextEntry> {
        let now = Utc::now();
        let mut state = self.state.lock();
        Self::purge_expired_key(&mut state, namespace, key, now);
        state
            .namespaces
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned()
    }

    /// All currently-visible entries of a namespace, sorted by key.
    pub fn read_namespace(&self, namespace: &str) -> Vec<ContextEntry> {
        let now = Utc::now();
        let mut state = self.state.lock();
        Self::purge_expired_namespace(&mut state, namespace, now);

        let mut entries: Vec<ContextEntry> = state
            .namespaces
            .get(namespace)
            .map(|ns| ns.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        entries
    }

    /// Summaries for namespaces that still hold at least one live entry.
    pub fn list_namespaces(&self) -> Vec<NamespaceSummary> {
        let now = Utc::now();
        let mut state = self.state.lock();

        let names: Vec<String> = state.namespaces.keys().cloned().collect();
        for name in names {
            Self::purge_expired_namespace(&mut state, &name, now);
        }

        let mut summaries: Vec<NamespaceSummary> = state
            .namespaces
            .iter()
            .filter(|(_, entries)| !entries.is_empty())
            .map(|(name, entries)| NamespaceSummary {
                name: name.clone(),
                entry_count: entries.len(),
                last_updated_at: entries
                    .values()
                    .map(|e| e.written_at)
                    .max()
                    .unwrap_or(now),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Delete one key. Returns whether a live entry existed. The version
    /// counter is retained so the next write keeps counting upward.
    pub fn delete_key(&self, namespace: &str, key: &str) -> bool {
        let now = Utc::now();
        let mut state = self.state.lock();
        Self::purge_expired_key(&mut state, namespace, key, now);

        let removed = state
            .namespaces
            .get_mut(namespace)
            .and_then(|ns| ns.remove(key))
            .is_some();
        drop(state);

        if removed {
            debug!(namespace = %namespace, key = %key, "context key deleted");
            self.events.publish(CoordinationEvent::ContextDeleted {
                namespace: namespace.to_string(),
                key: key.to_string(),
            });
        }
        removed
    }

    /// Drop every live entry of a namespace. Returns how many were removed;
    /// entries that had already expired do not count. Each removal is
    /// announced like a [`ContextStore::delete_key`]. Version counters are
    /// retained.
    pub fn clear_namespace(&self, namespace: &str) -> usize {
        let now = Utc::now();
        let mut state = self.state.lock();
        Self::purge_expired_namespace(&mut state, namespace, now);
        let removed = state.namespaces.remove(namespace);
        drop(state);

        let Some(entries) = removed else {
            return 0;
        };
        let cleared = entries.len();
        if cleared > 0 {
            info!(namespace = %namespace, cleared = cleared, "namespace cleared");
        }
        let mut keys: Vec<String> = entries.into_keys().collect();
        keys.sort();
        for key in keys {
            self.events.publish(CoordinationEvent::ContextDeleted {
                namespace: namespace.to_string(),
                key,
            });
        }
        cleared
    }

    fn purge_expired_key(state: &mut StoreState, namespace: &str, key: &str, now: DateTime<Utc>) {
        if let Some(ns) = state.namespaces.get_mut(namespace) {
            let lapsed = ns.get(key).is_some_and(|entry| entry.is_expired(now));
            if lapsed {
                ns.remove(key);
            }
        }
    }

    fn purge_expired_namespace(state: &mut StoreState, namespace: &str, now: DateTime<Utc>) {
        if let Some(ns) = state.namespaces.get_mut(namespace) {
            ns.retain(|_, entry| !entry.is_expired(now));
        }
    }
}
