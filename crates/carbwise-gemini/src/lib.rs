// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Google Gemini vision provider for Carbwise.
//!
//! Implements [`VisionProvider`] on top of the `generateContent` REST API.
//! API key resolution order: `gemini.api_key` in config, then the
//! `GEMINI_API_KEY` environment variable. Without a key the provider reports
//! itself unavailable instead of failing construction.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use carbwise_config::model::CarbwiseConfig;
use carbwise_core::types::{AdapterType, HealthStatus};
use carbwise_core::vision::{ImageInput, WEIGHT_PROMPT, analysis_prompt, parse_weight_reply};
use carbwise_core::{CarbwiseError, PluginAdapter, VisionProvider};

use crate::client::GeminiClient;

const API_KEY_ENV: &str = "GEMINI_API_KEY";

pub struct GeminiProvider {
    client: Option<GeminiClient>,
}

impl GeminiProvider {
    pub fn new(config: &CarbwiseConfig) -> Result<Self, CarbwiseError> {
        let api_key = resolve_api_key(config.gemini.api_key.as_deref(), API_KEY_ENV);
        let Some(api_key) = api_key else {
            debug!("no Gemini API key configured");
            return Ok(Self { client: None });
        };

        let client = GeminiClient::new(
            &api_key,
            config.gemini.model.clone(),
            config.gemini.base_url.clone(),
            Duration::from_secs(config.analysis.request_timeout_secs),
        )?;
        info!(model = client.model(), "Gemini provider initialized");
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&self) -> Result<&GeminiClient, CarbwiseError> {
        self.client.as_ref().ok_or_else(|| {
            CarbwiseError::Config(format!(
                "Gemini API key not found. Set gemini.api_key in config or {API_KEY_ENV}."
            ))
        })
    }
}

/// Config value first, then the environment. Empty strings count as unset.
fn resolve_api_key(config_key: Option<&str>, env_var: &str) -> Option<String> {
    config_key
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(env_var).ok().filter(|k| !k.is_empty()))
}

#[async_trait]
impl PluginAdapter for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Vision
    }

    async fn health_check(&self) -> Result<HealthStatus, CarbwiseError> {
        // No request is made; a call would spend quota.
        Ok(match self.client {
            Some(_) => HealthStatus::Healthy,
            None => HealthStatus::Unhealthy("no API key".into()),
        })
    }

    async fn shutdown(&self) -> Result<(), CarbwiseError> {
        debug!("Gemini provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl VisionProvider for GeminiProvider {
    fn is_available(&self) -> bool {
        self.client.is_some()
    }

    async fn estimate_weight(&self, image: &ImageInput) -> Result<f64, CarbwiseError> {
        let reply = self.client()?.generate(WEIGHT_PROMPT, image).await?;
        parse_weight_reply(&reply)
    }

    async fn analyze_image(
        &self,
        image: &ImageInput,
        weight_grams: Option<f64>,
    ) -> Result<String, CarbwiseError> {
        self.client()?
            .generate(&analysis_prompt(weight_grams), image)
            .await
    }
}
