// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use tracing::debug;

use carbwise_core::CarbwiseError;
use carbwise_core::types::{Confidence, RatioPeriod, UserId};
use carbwise_ratio::RatioIntervalStore;

use crate::clock::DayClock;

/// Grams of carbohydrate in one bread unit (XE).
pub const BREAD_UNIT_GRAMS: f64 = 12.0;

pub fn bread_units(carbs_grams: f64) -> f64 {
    carbs_grams / BREAD_UNIT_GRAMS
}

pub fn dose(bread_units: f64, ratio: f64) -> f64 {
    bread_units * ratio
}

/// Buckets a numeric confidence score.
pub fn confidence_bucket(score: f64) -> Confidence {
    if score >= 0.8 {
        Confidence::High
    } else if score >= 0.6 {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

/// Everything shown to the user about one meal's dose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseRecommendation {
    pub carbs_grams: f64,
    pub bread_units: f64,
    pub confidence: Confidence,
    /// The period whose ratio was applied.
    pub period: Option<RatioPeriod>,
    pub dose_units: f64,
    /// No period covers the query minute; `dose_units` is zero.
    pub ratio_not_configured: bool,
}

impl DoseRecommendation {
    pub fn ratio(&self) -> Option<f64> {
        self.period.as_ref().map(|p| p.ratio)
    }
}

/// Combines a carbohydrate estimate with the user's ratio schedule.
#[derive(Clone)]
pub struct DoseCalculator {
    ratios: RatioIntervalStore,
    clock: DayClock,
}

impl DoseCalculator {
    pub fn new(ratios: RatioIntervalStore, clock: DayClock) -> Self {
        Self { ratios, clock }
    }

    pub fn clock(&self) -> DayClock {
        self.clock
    }

    /// Recommendation using the ratio active right now.
    pub async fn recommend(
        &self,
        user_id: UserId,
        carbs_grams: f64,
        confidence: Confidence,
    ) -> Result<DoseRecommendation, CarbwiseError> {
        self.calculate(user_id, carbs_grams, confidence, self.clock.minute_of_day())
            .await
    }

    /// Recommendation using the ratio active at `minute_of_day`.
    ///
    /// `confidence` is carried through unchanged; callers holding only a
    /// numeric score bucket it with [`confidence_bucket`] first.
    pub async fn calculate(
        &self,
        user_id: UserId,
        carbs_grams: f64,
        confidence: Confidence,
        minute_of_day: u32,
    ) -> Result<DoseRecommendation, CarbwiseError> {
        let units = bread_units(carbs_grams);
        let period = self.ratios.query(user_id, minute_of_day).await?;
        let dose_units = period.as_ref().map_or(0.0, |p| dose(units, p.ratio));

        debug!(
            user_id = user_id.0,
            minute_of_day,
            carbs_grams,
            period_id = period.as_ref().map(|p| p.id),
            dose_units,
            "dose calculated"
        );

        Ok(DoseRecommendation {
            carbs_grams,
            bread_units: units,
            confidence,
            ratio_not_configured: period.is_none(),
            period,
            dose_units,
        })
    }
}
