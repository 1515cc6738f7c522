// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the OpenAI chat-completions API with image input.

use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use carbwise_core::CarbwiseError;
use carbwise_core::vision::ImageInput;

use crate::types::{ApiErrorResponse, ChatMessage, ChatRequest, ChatResponse, ContentPart, ImageUrl};

const MAX_TOKENS: u32 = 1000;

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(
        api_key: &str,
        model: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, CarbwiseError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
                CarbwiseError::Config(format!("invalid OpenAI API key header value: {e}"))
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

    /// One chat-completions request with `prompt` and the image as a data URI.
    pub async fn complete(&self, prompt: &str, image: &ImageInput) -> Result<String, CarbwiseError> {
        let data_uri = format!(
            "data:{};base64,{}",
            image.mime_type,
            STANDARD.encode(&image.data)
        );
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".into(),
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_uri },
                    },
                ],
            }],
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
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
            })?;

        let status = response.status();
        debug!(status = %status, model = %self.model, "openai response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&body) {
                Ok(api) => format!("OpenAI API error ({}): {}", api.error.type_, api.error.message),
                Err(_) => format!("OpenAI API returned {status}: {body}"),
            };
            return Err(CarbwiseError::provider_status(message, status.as_u16()));
        }

        let body: ChatResponse = response.json().await.map_err(|e| {
            CarbwiseError::parse(format!("failed to decode OpenAI response: {e}"))
        })?;
        body.first_content()
            .map(str::to_string)
            .ok_or_else(|| CarbwiseError::parse("OpenAI response has no message content"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: &str) -> OpenAiClient {
        OpenAiClient::new(
            "sk-test",
            "gpt-4o-mini".into(),
            base_url.to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn complete_sends_bearer_and_data_uri() {
        let server = MockServer::start().await;
        let jpeg = vec![0xFF, 0xD8, 0xFF];
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "messages": [{"role": "user", "content": [
                    {"type": "text", "text": "prompt"},
                    {"type": "image_url", "image_url": {"url": format!("data:image/jpeg;base64,{}", STANDARD.encode(&jpeg))}}
                ]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "{\"carbs\": 12}"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let text = client(&server.uri())
            .complete("prompt", &ImageInput::new(jpeg))
            .await
            .unwrap();
        assert_eq!(text, "{\"carbs\": 12}");
    }

    #[tokio::test]
    async fn server_error_is_transient_with_api_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "error": {"message": "upstream failed", "type": "server_error"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .complete("prompt", &ImageInput::new(vec![1]))
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("server_error"), "got: {err}");
    }

    #[tokio::test]
    async fn unauthorized_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let err = client(&server.uri())
            .complete("prompt", &ImageInput::new(vec![1]))
            .await
            .unwrap_err();
        assert!(matches!(err, CarbwiseError::Provider { status: Some(401), .. }));
        assert!(!err.is_transient());
    }
}
