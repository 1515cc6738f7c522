// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Gemini `generateContent` API.
//!
//! Each call makes exactly one HTTP request; retries belong to the analysis
//! orchestrator.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;

use carbwise_core::CarbwiseError;
use carbwise_core::vision::ImageInput;

use crate::types::{
    ApiErrorResponse, Content, GenerateRequest, GenerateResponse, InlineData, Part,
};

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(
        api_key: &str,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, CarbwiseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-api-key",
            HeaderValue::from_str(api_key).map_err(|e| {
                CarbwiseError::Config(format!("invalid Gemini API key header value: {e}"))
            })?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| CarbwiseError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                status: None,
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Sends `prompt` with the image and returns the reply text.
    pub async fn generate(&self, prompt: &str, image: &ImageInput) -> Result<String, CarbwiseError> {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: prompt.to_string(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: image.mime_type.to_string(),
                            data: STANDARD.encode(&image.data),
                        },
                    },
                ],
            }],
        };

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        debug!(status = %status, model = %self.model, "gemini response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api) => format!("Gemini API error ({}): {}", api.error.status, api.error.message),
                Err(_) => format!("Gemini API returned {status}: {body}"),
            };
            return Err(CarbwiseError::provider_status(message, status.as_u16()));
        }

        let body: GenerateResponse = response.json().await.map_err(|e| {
            CarbwiseError::parse(format!("failed to decode Gemini response: {e}"))
        })?;
        body.first_text()
            .map(str::to_string)
            .ok_or_else(|| CarbwiseError::parse("Gemini response has no text part"))
    }

    fn transport_error(&self, e: reqwest::Error) -> CarbwiseError {
        if e.is_timeout() {
            CarbwiseError::Timeout {
                duration: self.timeout,
            }
        } else {
            CarbwiseError::Provider {
                message: format!("HTTP request failed: {e}"),
                status: None,
                source: Some(Box::new(e)),
            }
        }
    }
}
