// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-of-day dosing-ratio schedules.
//!
//! A user's day is split into non-overlapping periods, each carrying the
//! insulin units to inject per bread unit. Periods may cross midnight and
//! their total never exceeds 24 hours.
//!
//! [`algebra`] holds the pure overlap, coverage and merge arithmetic;
//! [`RatioIntervalStore`] runs it against persisted periods.

pub mod algebra;
pub mod store;

pub use algebra::{Changeset, CoverageStatus, DeletePlan, MergeInto, PeriodChange};
pub use store::{PendingUpdate, RatioIntervalStore, RatioSchedule, UpdateOutcome};
