// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use carbwise_config::model::StorageConfig;
use carbwise_core::types::{
    AnalysisCorrection, BloodSugarRecord, ExternalUserId, FoodAnalysisRecord, NewCorrection,
    NewFoodAnalysis, NewRatioPeriod, RatioBatch, RatioPeriod, User, UserId, UserProfile,
};
use carbwise_core::{AdapterType, CarbwiseError, HealthStatus, PluginAdapter, StorageAdapter};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened on [`StorageAdapter::initialize`]; every other
/// call fails until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, CarbwiseError> {
        self.db.get().ok_or_else(|| CarbwiseError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, CarbwiseError> {
        let Ok(db) = self.db() else {
            return Ok(HealthStatus::Unhealthy("not initialized".into()));
        };
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CarbwiseError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), CarbwiseError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| CarbwiseError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), CarbwiseError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Users ---

    async fn get_or_create_user(
        &self,
        external_id: ExternalUserId,
        profile: &UserProfile,
    ) -> Result<User, CarbwiseError> {
        queries::users::get_or_create_user(self.db()?, external_id, profile).await
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>, CarbwiseError> {
        queries::users::get_user(self.db()?, id).await
    }

    async fn set_active_insulin_duration(
        &self,
        id: UserId,
        minutes: u32,
    ) -> Result<(), CarbwiseError> {
        queries::users::set_active_insulin_duration(self.db()?, id, minutes).await
    }

    // --- Ratio periods ---

    async fn list_ratio_periods(&self, user_id: UserId) -> Result<Vec<RatioPeriod>, CarbwiseError> {
        queries::ratios::list_ratio_periods(self.db()?, user_id).await
    }

    async fn create_ratio_period(
        &self,
        user_id: UserId,
        period: &NewRatioPeriod,
    ) -> Result<RatioPeriod, CarbwiseError> {
        queries::ratios::create_ratio_period(self.db()?, user_id, period).await
    }

    async fn update_ratio_period(&self, period: &RatioPeriod) -> Result<(), CarbwiseError> {
        queries::ratios::update_ratio_period(self.db()?, period).await
    }

    async fn delete_ratio_period(&self, user_id: UserId, id: i64) -> Result<(), CarbwiseError> {
        queries::ratios::delete_ratio_period(self.db()?, user_id, id).await
    }

    async fn delete_all_ratio_periods(&self, user_id: UserId) -> Result<usize, CarbwiseError> {
        queries::ratios::delete_all_ratio_periods(self.db()?, user_id).await
    }

    async fn apply_ratio_batch(
        &self,
        user_id: UserId,
        batch: &RatioBatch,
    ) -> Result<(), CarbwiseError> {
        queries::ratios::apply_ratio_batch(self.db()?, user_id, batch).await
    }

    // --- Food analyses ---

    async fn create_food_analysis(
        &self,
        analysis: &NewFoodAnalysis,
    ) -> Result<FoodAnalysisRecord, CarbwiseError> {
        queries::analyses::create_food_analysis(self.db()?, analysis).await
    }

    async fn list_food_analyses(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<FoodAnalysisRecord>, CarbwiseError> {
        queries::analyses::list_food_analyses(self.db()?, user_id, limit).await
    }

    async fn create_correction(
        &self,
        correction: &NewCorrection,
    ) -> Result<AnalysisCorrection, CarbwiseError> {
        queries::analyses::create_correction(self.db()?, correction).await
    }

    // --- Blood sugar ---

    async fn create_blood_sugar_record(
        &self,
        user_id: UserId,
        value: f64,
    ) -> Result<BloodSugarRecord, CarbwiseError> {
        queries::blood_sugar::create_blood_sugar_record(self.db()?, user_id, value).await
    }

    async fn list_blood_sugar_records(
        &self,
        user_id: UserId,
        limit: usize,
    ) -> Result<Vec<BloodSugarRecord>, CarbwiseError> {
        queries::blood_sugar::list_blood_sugar_records(self.db()?, user_id, limit).await
    }
}
