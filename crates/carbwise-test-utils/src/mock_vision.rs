// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock vision provider with scripted replies.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use carbwise_core::traits::adapter::PluginAdapter;
use carbwise_core::traits::vision::VisionProvider;
use carbwise_core::types::{AdapterType, HealthStatus};
use carbwise_core::vision::ImageInput;
use carbwise_core::CarbwiseError;

type Script<T> = Arc<Mutex<VecDeque<Result<T, CarbwiseError>>>>;

/// A vision provider that answers from FIFO queues.
///
/// An empty weight queue fails the estimate with a parse error; an empty
/// reply queue fails the analysis with a permanent 400 so tests never
/// retry into an unscripted call.
pub struct MockVisionProvider {
    name: String,
    weights: Script<f64>,
    replies: Script<String>,
    seen_weights: Arc<Mutex<Vec<Option<f64>>>>,
}

impl MockVisionProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            weights: Arc::new(Mutex::new(VecDeque::new())),
            replies: Arc::new(Mutex::new(VecDeque::new())),
            seen_weights: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn push_weight(&self, weight: Result<f64, CarbwiseError>) {
        self.weights.lock().await.push_back(weight);
    }

    pub async fn push_reply(&self, reply: Result<String, CarbwiseError>) {
        self.replies.lock().await.push_back(reply);
    }

    /// A well-formed analysis reply with the given carbs and weight.
    pub fn food_reply(item: &str, carbs: f64, weight: f64) -> String {
        format!(
            "```json\n{{\"food_items\":[\"{item}\"],\"carbs\":{carbs},\"confidence\":\"high\",\
             \"analysis_text\":\"1. {item}: {weight}г, {carbs}г углеводов\",\"weight\":{weight}}}\n```"
        )
    }

    /// Weight passed to each `analyze_image` call, in order.
    pub async fn seen_weights(&self) -> Vec<Option<f64>> {
        self.seen_weights.lock().await.clone()
    }
}

#[async_trait]
impl PluginAdapter for MockVisionProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Vision
    }

    async fn health_check(&self) -> Result<HealthStatus, CarbwiseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CarbwiseError> {
        Ok(())
    }
}

#[async_trait]
impl VisionProvider for MockVisionProvider {
    fn is_available(&self) -> bool {
        true
    }

    async fn estimate_weight(&self, _image: &ImageInput) -> Result<f64, CarbwiseError> {
        self.weights
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(CarbwiseError::parse("no scripted weight")))
    }

    async fn analyze_image(
        &self,
        _image: &ImageInput,
        weight_grams: Option<f64>,
    ) -> Result<String, CarbwiseError> {
        self.seen_weights.lock().await.push(weight_grams);
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(CarbwiseError::provider_status("no scripted reply", 400)))
    }
}
