// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Food photo analysis for the Carbwise dosing assistant.
//!
//! [`AnalysisOrchestrator`] wraps the configured vision providers behind a
//! ranked fallback list, retries transient failures with backoff and turns
//! the providers' free-form replies into a [`FoodAnalysis`].

pub mod extract;
pub mod orchestrator;
pub mod retry;

pub use extract::extract_json;
pub use orchestrator::{AnalysisOrchestrator, FoodAnalysis, WeightSource};
pub use retry::RetryPolicy;
