// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI vision provider for Carbwise, used as the fallback after Gemini.
//!
//! API key resolution order: `openai.api_key` in config, then `OPENAI_API_KEY`.

pub mod client;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use carbwise_config::model::CarbwiseConfig;
use carbwise_core::types::{AdapterType, HealthStatus};
use carbwise_core::vision::{ImageInput, WEIGHT_PROMPT, analysis_prompt, parse_weight_reply};
use carbwise_core::{CarbwiseError, PluginAdapter, VisionProvider};

use crate::client::OpenAiClient;

const API_KEY_ENV: &str = "OPENAI_API_KEY";

pub struct OpenAiProvider {
    client: Option<OpenAiClient>,
}

impl OpenAiProvider {
    pub fn new(config: &CarbwiseConfig) -> Result<Self, CarbwiseError> {
        let api_key = config
            .openai
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()));
        let Some(api_key) = api_key else {
            debug!("no OpenAI API key configured");
            return Ok(Self { client: None });
        };

        let client = OpenAiClient::new(
            &api_key,
            config.openai.model.clone(),
            config.openai.base_url.clone(),
            Duration::from_secs(config.analysis.request_timeout_secs),
        )?;
        info!(model = client.model(), "OpenAI provider initialized");
        Ok(Self {
            client: Some(client),
        })
    }

    fn client(&self) -> Result<&OpenAiClient, CarbwiseError> {
        self.client.as_ref().ok_or_else(|| {
            CarbwiseError::Config(format!(
                "OpenAI API key not found. Set openai.api_key in config or {API_KEY_ENV}."
            ))
        })
    }
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Vision
    }

    async fn health_check(&self) -> Result<HealthStatus, CarbwiseError> {
        Ok(match self.client {
            Some(_) => HealthStatus::Healthy,
            None => HealthStatus::Unhealthy("no API key".into()),
        })
    }

    async fn shutdown(&self) -> Result<(), CarbwiseError> {
        Ok(())
    }
}

#[async_trait]
impl VisionProvider for OpenAiProvider {
    fn is_available(&self) -> bool {
        self.client.is_some()
    }

    async fn estimate_weight(&self, image: &ImageInput) -> Result<f64, CarbwiseError> {
        let reply = self.client()?.complete(WEIGHT_PROMPT, image).await?;
        parse_weight_reply(&reply)
    }

    async fn analyze_image(
        &self,
        image: &ImageInput,
        weight_grams: Option<f64>,
    ) -> Result<String, CarbwiseError> {
        self.client()?
            .complete(&analysis_prompt(weight_grams), image)
            .await
    }
}
