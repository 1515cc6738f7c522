// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process [`StateStore`] with inactivity expiry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use carbwise_config::model::StateConfig;
use carbwise_core::types::{ConversationState, ExternalUserId};
use carbwise_core::{CarbwiseError, StateStore};

#[derive(Debug, Clone)]
struct Entry {
    state: ConversationState,
    temp: HashMap<String, String>,
    weight: Option<f64>,
    touched: Instant,
}

impl Entry {
    fn new() -> Self {
        Self {
            state: ConversationState::Idle,
            temp: HashMap::new(),
            weight: None,
            touched: Instant::now(),
        }
    }
}

/// Dialog state kept in a sharded map keyed by the chat platform's user id.
///
/// An entry untouched for longer than the TTL reads as empty and is dropped
/// on the next access or sweep. Every write refreshes the entry.
#[derive(Debug)]
pub struct MemoryStateStore {
    entries: DashMap<ExternalUserId, Entry>,
    ttl: Duration,
}

impl MemoryStateStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn from_config(config: &StateConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs))
    }

    /// Number of live and not-yet-swept entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn expired(&self, entry: &Entry, now: Instant) -> bool {
        now.duration_since(entry.touched) > self.ttl
    }

    /// Reads through `f`, dropping the entry first if it has expired.
    fn read<T>(&self, user: ExternalUserId, f: impl FnOnce(&Entry) -> T) -> Option<T> {
        let now = Instant::now();
        self.entries
            .remove_if(&user, |_, entry| self.expired(entry, now));
        self.entries.get(&user).map(|entry| f(&entry))
    }

    /// Mutates the entry, replacing an expired one with a fresh entry.
    fn write(&self, user: ExternalUserId, f: impl FnOnce(&mut Entry)) {
        let now = Instant::now();
        let mut entry = self.entries.entry(user).or_insert_with(Entry::new);
        if self.expired(&entry, now) {
            *entry = Entry::new();
        }
        f(&mut entry);
        entry.touched = now;
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get_state(&self, user: ExternalUserId) -> Result<ConversationState, CarbwiseError> {
        Ok(self.read(user, |e| e.state).unwrap_or_default())
    }

    async fn set_state(
        &self,
        user: ExternalUserId,
        state: ConversationState,
    ) -> Result<(), CarbwiseError> {
        self.write(user, |e| e.state = state);
        Ok(())
    }

    async fn get_temp(
        &self,
        user: ExternalUserId,
        key: &str,
    ) -> Result<Option<String>, CarbwiseError> {
        Ok(self.read(user, |e| e.temp.get(key).cloned()).flatten())
    }

    async fn set_temp(
        &self,
        user: ExternalUserId,
        key: &str,
        value: String,
    ) -> Result<(), CarbwiseError> {
        self.write(user, |e| {
            e.temp.insert(key.to_string(), value);
        });
        Ok(())
    }

    async fn remove_temp(&self, user: ExternalUserId, key: &str) -> Result<(), CarbwiseError> {
        self.write(user, |e| {
            e.temp.remove(key);
        });
        Ok(())
    }

    async fn clear_temp(&self, user: ExternalUserId) -> Result<(), CarbwiseError> {
        self.write(user, |e| e.temp.clear());
        Ok(())
    }

    async fn get_weight(&self, user: ExternalUserId) -> Result<Option<f64>, CarbwiseError> {
        Ok(self.read(user, |e| e.weight).flatten())
    }

    async fn set_weight(&self, user: ExternalUserId, grams: f64) -> Result<(), CarbwiseError> {
        self.write(user, |e| e.weight = Some(grams));
        Ok(())
    }

    async fn clear_weight(&self, user: ExternalUserId) -> Result<(), CarbwiseError> {
        self.write(user, |e| e.weight = None);
        Ok(())
    }

    async fn reset(&self, user: ExternalUserId) -> Result<(), CarbwiseError> {
        self.entries.remove(&user);
        Ok(())
    }

    async fn sweep_expired(&self) -> Result<usize, CarbwiseError> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !self.expired(entry, now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "expired conversation state swept");
        }
        Ok(removed)
    }
}
