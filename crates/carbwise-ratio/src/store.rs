// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage-backed ratio schedule operations.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use carbwise_core::types::{NewRatioPeriod, RatioPeriod, UserId};
use carbwise_core::{CarbwiseError, StorageAdapter, TimePeriod, ValidationError};

use crate::algebra::{self, Changeset, CoverageStatus, DeletePlan};

/// A user's schedule with its coverage summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioSchedule {
    pub periods: Vec<RatioPeriod>,
    pub total_minutes: u32,
    pub status: CoverageStatus,
}

/// An edit that overlaps other periods and waits for the user to agree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingUpdate {
    pub target_id: i64,
    pub period: TimePeriod,
    pub ratio: f64,
    pub changeset: Changeset,
}

/// Result of [`RatioIntervalStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// No other period was touched; the edit is stored.
    Applied(RatioPeriod),
    /// Other periods must change first.
    NeedsConfirmation(PendingUpdate),
}

/// Per-user time-of-day ratio schedule.
///
/// Every mutation re-reads the current periods from storage, so a plan
/// computed earlier is rejected with [`ValidationError::StaleChangeset`] if
/// the schedule moved underneath it.
#[derive(Clone)]
pub struct RatioIntervalStore {
    storage: Arc<dyn StorageAdapter>,
}

impl RatioIntervalStore {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    /// Adds a period. Fails on any overlap or if the day would exceed 24 hours.
    pub async fn add(
        &self,
        user_id: UserId,
        period: TimePeriod,
        ratio: f64,
    ) -> Result<RatioPeriod, CarbwiseError> {
        let ratio = algebra::validate_ratio(ratio)?;
        let periods = self.storage.list_ratio_periods(user_id).await?;
        algebra::check_insertable(&periods, &period, None)?;

        let created = self
            .storage
            .create_ratio_period(user_id, &NewRatioPeriod { period, ratio })
            .await?;
        info!(user_id = user_id.0, id = created.id, %period, ratio, "ratio period added");
        Ok(created)
    }

    /// Checks a candidate period before asking the user for a ratio.
    pub async fn check_available(
        &self,
        user_id: UserId,
        period: &TimePeriod,
        excluding: Option<i64>,
    ) -> Result<(), CarbwiseError> {
        let periods = self.storage.list_ratio_periods(user_id).await?;
        algebra::check_insertable(&periods, period, excluding)?;
        Ok(())
    }

    /// What moving period `id` to `period` would do to the others.
    pub async fn plan_update(
        &self,
        user_id: UserId,
        id: i64,
        period: &TimePeriod,
    ) -> Result<Changeset, CarbwiseError> {
        let periods = self.storage.list_ratio_periods(user_id).await?;
        find(&periods, id)?;
        Ok(algebra::plan_changeset(&periods, id, period))
    }

    /// Edits period `id`. Applied immediately when nothing else overlaps.
    pub async fn update(
        &self,
        user_id: UserId,
        id: i64,
        period: TimePeriod,
        ratio: f64,
    ) -> Result<UpdateOutcome, CarbwiseError> {
        let ratio = algebra::validate_ratio(ratio)?;
        let periods = self.storage.list_ratio_periods(user_id).await?;
        let existing = find(&periods, id)?;
        let changeset = algebra::plan_changeset(&periods, id, &period);

        if !changeset.is_empty() {
            debug!(user_id = user_id.0, id, changes = changeset.changes.len(), "update needs confirmation");
            return Ok(UpdateOutcome::NeedsConfirmation(PendingUpdate {
                target_id: id,
                period,
                ratio,
                changeset,
            }));
        }

        let updated = RatioPeriod {
            period,
            ratio,
            ..existing.clone()
        };
        self.storage.update_ratio_period(&updated).await?;
        info!(user_id = user_id.0, id, %period, ratio, "ratio period updated");
        Ok(UpdateOutcome::Applied(updated))
    }

    /// Applies a confirmed update together with its changeset.
    pub async fn apply_update(
        &self,
        user_id: UserId,
        pending: &PendingUpdate,
    ) -> Result<RatioPeriod, CarbwiseError> {
        let periods = self.storage.list_ratio_periods(user_id).await?;
        let existing = find(&periods, pending.target_id)?;
        let current = algebra::plan_changeset(&periods, pending.target_id, &pending.period);
        if current != pending.changeset {
            return Err(ValidationError::StaleChangeset.into());
        }

        let updated = RatioPeriod {
            period: pending.period,
            ratio: pending.ratio,
            ..existing.clone()
        };
        let mut batch = current.to_batch(&periods);
        batch.update.push(updated.clone());
        self.storage.apply_ratio_batch(user_id, &batch).await?;
        info!(
            user_id = user_id.0,
            id = pending.target_id,
            changes = current.changes.len(),
            "ratio update applied with changeset"
        );
        Ok(updated)
    }

    pub async fn plan_delete(&self, user_id: UserId, id: i64) -> Result<DeletePlan, CarbwiseError> {
        let periods = self.storage.list_ratio_periods(user_id).await?;
        algebra::plan_delete(&periods, id).ok_or_else(|| not_found(id))
    }

    /// Applies a delete plan the user has seen.
    pub async fn apply_delete(&self, user_id: UserId, plan: &DeletePlan) -> Result<(), CarbwiseError> {
        let periods = self.storage.list_ratio_periods(user_id).await?;
        let current = algebra::plan_delete(&periods, plan.removed.id).ok_or_else(|| not_found(plan.removed.id))?;
        if current != *plan {
            return Err(ValidationError::StaleChangeset.into());
        }
        self.storage
            .apply_ratio_batch(user_id, &current.to_batch(&periods))
            .await?;
        info!(
            user_id = user_id.0,
            id = plan.removed.id,
            merged_into = plan.merge.as_ref().map(|m| m.neighbor_id),
            "ratio period deleted"
        );
        Ok(())
    }

    /// Deletes period `id`, letting an adjacent neighbour absorb its range.
    pub async fn delete(&self, user_id: UserId, id: i64) -> Result<DeletePlan, CarbwiseError> {
        let plan = self.plan_delete(user_id, id).await?;
        self.apply_delete(user_id, &plan).await?;
        Ok(plan)
    }

    /// Removes every period of the user.
    pub async fn clear(&self, user_id: UserId) -> Result<usize, CarbwiseError> {
        let removed = self.storage.delete_all_ratio_periods(user_id).await?;
        info!(user_id = user_id.0, removed, "ratio schedule cleared");
        Ok(removed)
    }

    /// The period covering `minute`, if any.
    pub async fn query(
        &self,
        user_id: UserId,
        minute: u32,
    ) -> Result<Option<RatioPeriod>, CarbwiseError> {
        let periods = self.storage.list_ratio_periods(user_id).await?;
        Ok(algebra::lookup(&periods, minute).cloned())
    }

    pub async fn list(&self, user_id: UserId) -> Result<RatioSchedule, CarbwiseError> {
        let periods = self.storage.list_ratio_periods(user_id).await?;
        let total_minutes = algebra::total_coverage(&periods);
        Ok(RatioSchedule {
            status: algebra::coverage_status(total_minutes),
            total_minutes,
            periods,
        })
    }

    pub async fn get(&self, user_id: UserId, id: i64) -> Result<RatioPeriod, CarbwiseError> {
        let periods = self.storage.list_ratio_periods(user_id).await?;
        find(&periods, id).cloned()
    }
}

fn find(periods: &[RatioPeriod], id: i64) -> Result<&RatioPeriod, CarbwiseError> {
    periods.iter().find(|p| p.id == id).ok_or_else(|| not_found(id))
}

fn not_found(id: i64) -> CarbwiseError {
    CarbwiseError::NotFound {
        entity: "ratio_period",
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbwise_config::model::StorageConfig;
    use carbwise_core::types::{ExternalUserId, UserProfile};
    use carbwise_storage::SqliteStorage;

    async fn setup() -> (RatioIntervalStore, Arc<dyn StorageAdapter>, UserId, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            database_path: dir.path().join("ratio.db").to_string_lossy().into_owned(),
            wal_mode: false,
        };
        let storage = SqliteStorage::new(config);
        storage.initialize().await.unwrap();
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);
        let user = storage
            .get_or_create_user(ExternalUserId(42), &UserProfile::default())
            .await
            .unwrap();
        (RatioIntervalStore::new(storage.clone()), storage, user.id, dir)
    }

    fn tp(text: &str) -> TimePeriod {
        TimePeriod::parse(text).unwrap()
    }

    fn validation(err: CarbwiseError) -> ValidationError {
        match err {
            CarbwiseError::Validation(v) => v,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    async fn full_day(store: &RatioIntervalStore, user: UserId) -> Vec<RatioPeriod> {
        vec![
            store.add(user, tp("08:00-12:00"), 1.5).await.unwrap(),
            store.add(user, tp("12:00-20:00"), 1.0).await.unwrap(),
            store.add(user, tp("20:00-08:00"), 0.8).await.unwrap(),
        ]
    }

    #[tokio::test]
    async fn full_day_schedule_and_query() {
        let (store, _storage, user, _dir) = setup().await;
        full_day(&store, user).await;

        let schedule = store.list(user).await.unwrap();
        assert_eq!(schedule.total_minutes, 1440);
        assert_eq!(schedule.status, CoverageStatus::Full);

        let at_six = store.query(user, 6 * 60).await.unwrap().unwrap();
        assert_eq!(at_six.ratio, 0.8);
        let at_noon = store.query(user, 12 * 60).await.unwrap().unwrap();
        assert_eq!(at_noon.ratio, 1.0);
    }

    #[tokio::test]
    async fn add_rejects_overlap_and_keeps_schedule() {
        let (store, _storage, user, _dir) = setup().await;
        full_day(&store, user).await;

        let err = validation(store.add(user, tp("07:00-09:00"), 2.0).await.unwrap_err());
        assert!(matches!(err, ValidationError::Overlap { .. }));
        assert_eq!(store.list(user).await.unwrap().periods.len(), 3);
    }

    #[tokio::test]
    async fn add_rejects_non_positive_ratio() {
        let (store, _storage, user, _dir) = setup().await;
        let err = validation(store.add(user, tp("08:00-12:00"), 0.0).await.unwrap_err());
        assert_eq!(err, ValidationError::NonPositiveRatio);
    }

    #[tokio::test]
    async fn full_day_period_blocks_everything_else() {
        let (store, _storage, user, _dir) = setup().await;
        store.add(user, tp("00:00-24:00"), 1.0).await.unwrap();
        let err = validation(store.add(user, tp("10:00-11:00"), 1.0).await.unwrap_err());
        assert!(matches!(err, ValidationError::Overlap { .. }));
        assert_eq!(store.list(user).await.unwrap().status, CoverageStatus::Full);
    }

    #[tokio::test]
    async fn query_with_partial_schedule_can_miss() {
        let (store, _storage, user, _dir) = setup().await;
        store.add(user, tp("08:00-12:00"), 1.5).await.unwrap();
        assert!(store.query(user, 13 * 60).await.unwrap().is_none());
        let schedule = store.list(user).await.unwrap();
        assert_eq!(schedule.status, CoverageStatus::Partial);
        assert_eq!(schedule.total_minutes, 240);
    }

    #[tokio::test]
    async fn update_without_conflict_applies_directly() {
        let (store, _storage, user, _dir) = setup().await;
        let p = store.add(user, tp("08:00-10:00"), 1.5).await.unwrap();

        match store.update(user, p.id, tp("08:00-11:00"), 2.0).await.unwrap() {
            UpdateOutcome::Applied(updated) => {
                assert_eq!(updated.period, tp("08:00-11:00"));
                assert_eq!(updated.ratio, 2.0);
            }
            other => panic!("expected applied, got {other:?}"),
        }
        assert_eq!(store.get(user, p.id).await.unwrap().ratio, 2.0);
    }

    #[tokio::test]
    async fn update_with_overlap_needs_confirmation_then_applies() {
        let (store, _storage, user, _dir) = setup().await;
        let periods = full_day(&store, user).await;
        let afternoon = periods[1].id;

        let pending = match store.update(user, afternoon, tp("10:00-22:00"), 1.1).await.unwrap() {
            UpdateOutcome::NeedsConfirmation(pending) => pending,
            other => panic!("expected confirmation, got {other:?}"),
        };
        assert_eq!(pending.changeset.changes.len(), 2);
        // Nothing is written before confirmation.
        assert_eq!(store.get(user, afternoon).await.unwrap().period, tp("12:00-20:00"));

        store.apply_update(user, &pending).await.unwrap();

        let schedule = store.list(user).await.unwrap();
        let spans: Vec<String> = schedule.periods.iter().map(|p| p.period.to_string()).collect();
        assert_eq!(spans, vec!["08:00-10:00", "10:00-22:00", "22:00-08:00"]);
        assert_eq!(schedule.total_minutes, 1440);
    }

    #[tokio::test]
    async fn update_splitting_a_neighbor_inserts_remainder() {
        let (store, _storage, user, _dir) = setup().await;
        store.add(user, tp("08:00-20:00"), 1.5).await.unwrap();
        let small = store.add(user, tp("21:00-22:00"), 1.0).await.unwrap();

        let UpdateOutcome::NeedsConfirmation(pending) =
            store.update(user, small.id, tp("12:00-14:00"), 1.0).await.unwrap()
        else {
            panic!("expected confirmation");
        };
        store.apply_update(user, &pending).await.unwrap();

        let schedule = store.list(user).await.unwrap();
        let spans: Vec<(String, f64)> = schedule
            .periods
            .iter()
            .map(|p| (p.period.to_string(), p.ratio))
            .collect();
        assert_eq!(
            spans,
            vec![
                ("08:00-12:00".to_string(), 1.5),
                ("12:00-14:00".to_string(), 1.0),
                ("14:00-20:00".to_string(), 1.5),
            ]
        );
    }

    #[tokio::test]
    async fn stale_changeset_is_rejected_without_writing() {
        let (store, _storage, user, _dir) = setup().await;
        let periods = full_day(&store, user).await;

        let UpdateOutcome::NeedsConfirmation(pending) = store
            .update(user, periods[1].id, tp("10:00-22:00"), 1.1)
            .await
            .unwrap()
        else {
            panic!("expected confirmation");
        };

        // The schedule changes before the user confirms.
        store.delete(user, periods[0].id).await.unwrap();
        let before = store.list(user).await.unwrap();

        let err = validation(store.apply_update(user, &pending).await.unwrap_err());
        assert_eq!(err, ValidationError::StaleChangeset);
        assert_eq!(store.list(user).await.unwrap(), before);
    }

    #[tokio::test]
    async fn delete_merges_into_preceding_neighbor() {
        let (store, _storage, user, _dir) = setup().await;
        let periods = full_day(&store, user).await;

        let plan = store.delete(user, periods[1].id).await.unwrap();
        assert_eq!(plan.merge.as_ref().unwrap().neighbor_id, periods[0].id);

        let schedule = store.list(user).await.unwrap();
        let spans: Vec<String> = schedule.periods.iter().map(|p| p.period.to_string()).collect();
        assert_eq!(spans, vec!["08:00-20:00", "20:00-08:00"]);
        assert_eq!(schedule.total_minutes, 1440);
    }

    #[tokio::test]
    async fn delete_of_unknown_period_is_not_found() {
        let (store, _storage, user, _dir) = setup().await;
        let err = store.delete(user, 999).await.unwrap_err();
        assert!(matches!(err, CarbwiseError::NotFound { .. }));
    }

    #[tokio::test]
    async fn stale_delete_plan_is_rejected() {
        let (store, _storage, user, _dir) = setup().await;
        let periods = full_day(&store, user).await;
        let plan = store.plan_delete(user, periods[1].id).await.unwrap();

        store.delete(user, periods[0].id).await.unwrap();

        let err = validation(store.apply_delete(user, &plan).await.unwrap_err());
        assert_eq!(err, ValidationError::StaleChangeset);
    }

    #[tokio::test]
    async fn periods_are_scoped_per_user() {
        let (store, storage, user, _dir) = setup().await;
        let other = storage
            .get_or_create_user(ExternalUserId(7), &UserProfile::default())
            .await
            .unwrap();
        let mine = store.add(user, tp("08:00-12:00"), 1.5).await.unwrap();

        // The same range is free for another user.
        store.add(other.id, tp("08:00-12:00"), 2.0).await.unwrap();
        assert!(store.get(other.id, mine.id).await.is_err());
        assert!(store.delete(other.id, mine.id).await.is_err());
        assert_eq!(store.list(user).await.unwrap().periods.len(), 1);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let (store, _storage, user, _dir) = setup().await;
        full_day(&store, user).await;
        assert_eq!(store.clear(user).await.unwrap(), 3);
        let schedule = store.list(user).await.unwrap();
        assert!(schedule.periods.is_empty());
        assert_eq!(schedule.status, CoverageStatus::Partial);
    }

    #[tokio::test]
    async fn pending_update_survives_serialization() {
        let (store, _storage, user, _dir) = setup().await;
        let periods = full_day(&store, user).await;
        let UpdateOutcome::NeedsConfirmation(pending) = store
            .update(user, periods[1].id, tp("10:00-22:00"), 1.1)
            .await
            .unwrap()
        else {
            panic!("expected confirmation");
        };

        let json = serde_json::to_string(&pending).unwrap();
        let restored: PendingUpdate = serde_json::from_str(&json).unwrap();
        store.apply_update(user, &restored).await.unwrap();
        assert_eq!(store.list(user).await.unwrap().periods.len(), 3);
    }
}
