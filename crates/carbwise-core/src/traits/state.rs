// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user conversation state storage.

use async_trait::async_trait;

use crate::error::CarbwiseError;
use crate::types::{ConversationState, ExternalUserId};

/// Keyed, expiring storage for dialog state, the temporary data bag and
/// the pending meal weight.
///
/// Entries for a user expire after an inactivity window. Backends may live
/// in-process or in a shared external store; callers must not assume either.
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// Current state; `Idle` when nothing is stored or the entry expired.
    async fn get_state(&self, user: ExternalUserId) -> Result<ConversationState, CarbwiseError>;

    async fn set_state(
        &self,
        user: ExternalUserId,
        state: ConversationState,
    ) -> Result<(), CarbwiseError>;

    async fn get_temp(&self, user: ExternalUserId, key: &str)
    -> Result<Option<String>, CarbwiseError>;

    async fn set_temp(
        &self,
        user: ExternalUserId,
        key: &str,
        value: String,
    ) -> Result<(), CarbwiseError>;

    async fn remove_temp(&self, user: ExternalUserId, key: &str) -> Result<(), CarbwiseError>;

    /// Drops the whole temporary data bag.
    async fn clear_temp(&self, user: ExternalUserId) -> Result<(), CarbwiseError>;

    async fn get_weight(&self, user: ExternalUserId) -> Result<Option<f64>, CarbwiseError>;

    async fn set_weight(&self, user: ExternalUserId, grams: f64) -> Result<(), CarbwiseError>;

    async fn clear_weight(&self, user: ExternalUserId) -> Result<(), CarbwiseError>;

    /// Forgets everything about the user: state, temp data and weight.
    async fn reset(&self, user: ExternalUserId) -> Result<(), CarbwiseError>;

    /// Drops expired entries and returns how many were removed.
    async fn sweep_expired(&self) -> Result<usize, CarbwiseError>;
}
