// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dose recommendation for the Carbwise dosing assistant.
//!
//! Converts a carbohydrate estimate into bread units and multiplies it by the
//! ratio active at the moment of the meal. When no ratio covers that moment
//! the dose is zero and the recommendation says so; it is never invented.

pub mod calculator;
pub mod clock;

pub use calculator::{
    BREAD_UNIT_GRAMS, DoseCalculator, DoseRecommendation, bread_units, confidence_bucket, dose,
};
pub use clock::DayClock;
