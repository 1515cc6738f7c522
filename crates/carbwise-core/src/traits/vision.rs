// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vision provider trait for food photo analysis.

use async_trait::async_trait;

use crate::error::CarbwiseError;
use crate::traits::adapter::PluginAdapter;
use crate::vision::ImageInput;

/// An external multimodal model that can look at a meal photo.
///
/// Implementations make a single request per call. Retries, backoff and
/// fallback between providers belong to the caller.
#[async_trait]
pub trait VisionProvider: PluginAdapter {
    /// Whether the provider is configured well enough to be called.
    fn is_available(&self) -> bool;

    /// Estimates the weight of the food in grams.
    async fn estimate_weight(&self, image: &ImageInput) -> Result<f64, CarbwiseError>;

    /// Returns the model's raw reply, expected to contain a JSON object.
    async fn analyze_image(
        &self,
        image: &ImageInput,
        weight_grams: Option<f64>,
    ) -> Result<String, CarbwiseError>;
}
