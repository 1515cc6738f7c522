// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends.

use async_trait::async_trait;

use crate::error::CarbwiseError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AnalysisCorrection, BloodSugarRecord, ExternalUserId, FoodAnalysisRecord, NewCorrection,
    NewFoodAnalysis, NewRatioPeriod, RatioBatch, RatioPeriod, User, UserId, UserProfile,
};

/// Adapter for persistent storage backends.
///
/// Every ratio-period operation is scoped to the owning user; touching a
/// period of another user reports `NotFound`.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (run migrations, open connection).
    async fn initialize(&self) -> Result<(), CarbwiseError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), CarbwiseError>;

    // --- Users ---

    /// Returns the user for an external id, creating it on first sight.
    /// Idempotent: concurrent calls never create two users.
    async fn get_or_create_user(
        &self,
        external_id: ExternalUserId,
        profile: &UserProfile,
    ) -> Result<User, CarbwiseError>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>, CarbwiseError>;

    async fn set_active_insulin_duration(
        &self,
        id: UserId,
        minutes: u32,
    ) -> Result<(), CarbwiseError>;

    // --- Ratio periods ---

    /// Lists a user's periods ordered by start minute.
    async fn list_ratio_periods(&self, user_id: UserId) -> Result<Vec<RatioPeriod>, CarbwiseError>;

    async fn create_ratio_period(
        &self,
        user_id: UserId,
        period: &NewRatioPeriod,
    ) -> Result<RatioPeriod, CarbwiseError>;

    async fn update_ratio_period(&self, period: &RatioPeriod) -> Result<(), CarbwiseError>;

    async fn delete_ratio_period(&self, user_id: UserId, id: i64) -> Result<(), CarbwiseError>;

    /// Removes every period of the user and returns how many were removed.
    async fn delete_all_ratio_periods(&self, user_id: UserId) -> Result<usize, CarbwiseError>;

    /// Applies deletes, then updates, then inserts in a single transaction.
    async fn apply_ratio_batch(
        &self,
        user_id: UserId,
        batch: &RatioBatch,
    ) -> Result<(), CarbwiseError>;

    // --- Food analyses ---

    async fn create_food_analysis(
        &self,
        analysis: &NewFoodAnalysis,
    ) -> Result<FoodAnalysisRecord, CarbwiseError>;

    /// Newest first.
    async fn list_food_analyses(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<FoodAnalysisRecord>, CarbwiseError>;

    async fn create_correction(
        &self,
        correction: &NewCorrection,
    ) -> Result<AnalysisCorrection, CarbwiseError>;

    // --- Blood sugar ---

    async fn create_blood_sugar_record(
        &self,
        user_id: UserId,
        value: f64,
    ) -> Result<BloodSugarRecord, CarbwiseError>;

    /// Newest first.
    async fn list_blood_sugar_records(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<BloodSugarRecord>, CarbwiseError>;
}
