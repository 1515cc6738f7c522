// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use carbwise_config::model::AnalysisConfig;
use carbwise_core::types::Confidence;
use carbwise_core::vision::{ImageInput, NO_FOOD_MARKER};
use carbwise_core::{CarbwiseError, VisionProvider};

use crate::extract::extract_json;
use crate::retry::RetryPolicy;

/// Where the weight shown with an analysis came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightSource {
    /// Entered by the user.
    Declared,
    /// Estimated from the photo.
    Estimated,
    Unknown,
}

/// A structured food analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodAnalysis {
    pub food_items: Vec<String>,
    pub carbs_grams: f64,
    pub confidence: Confidence,
    pub rationale: String,
    pub resolved_weight_grams: Option<f64>,
    pub weight_source: WeightSource,
    /// Name of the provider that produced the analysis.
    pub provider: String,
    /// The photo shows no food. A successful outcome, not an error.
    pub no_food: bool,
}

/// JSON shape requested from providers.
#[derive(Debug, Deserialize)]
struct ProviderReply {
    #[serde(default)]
    food_items: Vec<String>,
    carbs: f64,
    #[serde(default)]
    confidence: String,
    #[serde(default)]
    analysis_text: String,
    #[serde(default)]
    weight: f64,
}

/// Parses a raw provider reply into its structured fields.
fn parse_reply(raw: &str) -> Result<ProviderReply, CarbwiseError> {
    let json = extract_json(raw)
        .ok_or_else(|| CarbwiseError::parse("no JSON object in provider reply"))?;
    let reply: ProviderReply = serde_json::from_str(json)
        .map_err(|e| CarbwiseError::parse(format!("invalid analysis JSON: {e}")))?;
    if !reply.carbs.is_finite() || reply.carbs < 0.0 {
        return Err(CarbwiseError::parse(format!(
            "carbs out of range: {}",
            reply.carbs
        )));
    }
    Ok(reply)
}

/// Runs food photo analysis against a ranked list of vision providers.
///
/// The ranking is fixed at construction from the providers that report
/// themselves available. Each call goes to the first provider; when its
/// transient retries run out the next provider is tried. Permanent errors
/// surface immediately.
pub struct AnalysisOrchestrator {
    providers: Vec<Arc<dyn VisionProvider>>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("providers", &self.provider_names())
            .field("retry", &self.retry)
            .finish()
    }
}

impl AnalysisOrchestrator {
    /// Keeps the available providers in the given order.
    ///
    /// Fails with `AdapterNotFound` when none is available.
    pub fn new(
        providers: Vec<Arc<dyn VisionProvider>>,
        retry: RetryPolicy,
    ) -> Result<Self, CarbwiseError> {
        let providers: Vec<_> = providers
            .into_iter()
            .filter(|p| {
                let available = p.is_available();
                if !available {
                    debug!(provider = p.name(), "vision provider unavailable, skipped");
                }
                available
            })
            .collect();

        if providers.is_empty() {
            return Err(CarbwiseError::AdapterNotFound {
                adapter_type: "Vision".into(),
                name: "any".into(),
            });
        }

        let orchestrator = Self { providers, retry };
        info!(providers = ?orchestrator.provider_names(), "analysis orchestrator ready");
        Ok(orchestrator)
    }

    /// Orders `providers` by `config.provider_order`; unlisted providers are dropped.
    pub fn from_config(
        config: &AnalysisConfig,
        providers: Vec<Arc<dyn VisionProvider>>,
    ) -> Result<Self, CarbwiseError> {
        let ranked = config
            .provider_order
            .iter()
            .filter_map(|name| providers.iter().find(|p| p.name() == name).cloned())
            .collect();
        Self::new(ranked, RetryPolicy::from_config(config))
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Analyses a food photo.
    ///
    /// Without a positive `declared_weight` the weight is estimated first;
    /// a failed estimate is logged and the analysis continues without one.
    pub async fn analyze_food(
        &self,
        image: &ImageInput,
        declared_weight: Option<f64>,
        cancel: &CancellationToken,
    ) -> Result<FoodAnalysis, CarbwiseError> {
        let declared = declared_weight.filter(|w| w.is_finite() && *w > 0.0);

        let estimated = match declared {
            Some(_) => None,
            None => match self
                .call_ranked("estimate_weight", cancel, |p| p.estimate_weight(image))
                .await
            {
                Ok((grams, provider)) => {
                    info!(provider, grams, "weight estimated");
                    Some(grams)
                }
                Err(CarbwiseError::Cancelled) => return Err(CarbwiseError::Cancelled),
                Err(e) => {
                    warn!(error = %e, "weight estimation failed, continuing without weight");
                    None
                }
            },
        };

        let weight = declared.or(estimated);
        let (reply, provider) = self
            .call_ranked("analyze_image", cancel, |p| {
                Box::pin(async move { parse_reply(&p.analyze_image(image, weight).await?) })
            })
            .await?;

        let no_food = reply.carbs == 0.0 && reply.analysis_text.contains(NO_FOOD_MARKER);
        let (resolved_weight_grams, weight_source) = if no_food {
            (None, WeightSource::Unknown)
        } else if let Some(w) = declared {
            (Some(w), WeightSource::Declared)
        } else if let Some(w) = estimated {
            (Some(w), WeightSource::Estimated)
        } else if reply.weight > 0.0 {
            (Some(reply.weight), WeightSource::Estimated)
        } else {
            (None, WeightSource::Unknown)
        };

        let analysis = FoodAnalysis {
            food_items: reply.food_items,
            carbs_grams: reply.carbs,
            confidence: Confidence::from_label(&reply.confidence),
            rationale: reply.analysis_text,
            resolved_weight_grams,
            weight_source,
            provider: provider.to_string(),
            no_food,
        };
        info!(
            provider = %analysis.provider,
            carbs = analysis.carbs_grams,
            confidence = %analysis.confidence,
            items = analysis.food_items.len(),
            no_food,
            "food analysis completed"
        );
        Ok(analysis)
    }

    /// Calls providers in rank order until one succeeds.
    async fn call_ranked<'a, T, F>(
        &'a self,
        operation: &'static str,
        cancel: &CancellationToken,
        call: F,
    ) -> Result<(T, &'a str), CarbwiseError>
    where
        F: Fn(&'a dyn VisionProvider) -> BoxFuture<'a, Result<T, CarbwiseError>>,
    {
        let mut last_error = None;
        for provider in &self.providers {
            let provider: &'a dyn VisionProvider = provider.as_ref();
            match self.retry.run(operation, cancel, || call(provider)).await {
                Ok(value) => return Ok((value, provider.name())),
                Err(e) if e.is_transient() => {
                    warn!(
                        provider = provider.name(),
                        operation,
                        error = %e,
                        "provider exhausted retries, trying next"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| CarbwiseError::AdapterNotFound {
            adapter_type: "Vision".into(),
            name: "any".into(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use carbwise_core::types::{AdapterType, HealthStatus};
    use carbwise_core::vision::NO_FOOD_MESSAGE;
    use carbwise_core::PluginAdapter;

    type Scripted<T> = Mutex<VecDeque<Result<T, CarbwiseError>>>;

    struct ScriptedProvider {
        name: &'static str,
        available: bool,
        weights: Scripted<f64>,
        replies: Scripted<String>,
        analyze_calls: AtomicU32,
        seen_weight: Mutex<Option<Option<f64>>>,
    }

    impl ScriptedProvider {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                available: true,
                weights: Mutex::new(VecDeque::new()),
                replies: Mutex::new(VecDeque::new()),
                analyze_calls: AtomicU32::new(0),
                seen_weight: Mutex::new(None),
            }
        }

        fn unavailable(mut self) -> Self {
            self.available = false;
            self
        }

        fn weight(self, r: Result<f64, CarbwiseError>) -> Self {
            self.weights.lock().unwrap().push_back(r);
            self
        }

        fn reply(self, r: Result<&str, CarbwiseError>) -> Self {
            self.replies.lock().unwrap().push_back(r.map(str::to_string));
            self
        }
    }

    #[async_trait]
    impl PluginAdapter for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
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
    impl VisionProvider for ScriptedProvider {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn estimate_weight(&self, _image: &ImageInput) -> Result<f64, CarbwiseError> {
            self.weights
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CarbwiseError::parse("no scripted weight")))
        }

        async fn analyze_image(
            &self,
            _image: &ImageInput,
            weight_grams: Option<f64>,
        ) -> Result<String, CarbwiseError> {
            self.analyze_calls.fetch_add(1, Ordering::SeqCst);
            *self.seen_weight.lock().unwrap() = Some(weight_grams);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(CarbwiseError::provider_status("no scripted reply", 500)))
        }
    }

    const PASTA: &str = r#"Вот результат:
```json
{"food_items":["паста"],"carbs":60,"confidence":"high","analysis_text":"1. Паста: 200г, 60г углеводов","weight":210}
```"#;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }

    fn image() -> ImageInput {
        ImageInput::new(vec![0xFF, 0xD8, 0xFF])
    }

    fn orchestrator(providers: Vec<Arc<ScriptedProvider>>) -> AnalysisOrchestrator {
        let providers = providers
            .into_iter()
            .map(|p| p as Arc<dyn VisionProvider>)
            .collect();
        AnalysisOrchestrator::new(providers, fast_retry()).unwrap()
    }

    #[test]
    fn construction_fails_without_available_provider() {
        let p: Arc<dyn VisionProvider> = Arc::new(ScriptedProvider::new("gemini").unavailable());
        let err = AnalysisOrchestrator::new(vec![p], fast_retry()).unwrap_err();
        assert!(matches!(err, CarbwiseError::AdapterNotFound { .. }));
    }

    #[test]
    fn unavailable_preferred_provider_is_substituted() {
        let gemini: Arc<dyn VisionProvider> =
            Arc::new(ScriptedProvider::new("gemini").unavailable());
        let openai: Arc<dyn VisionProvider> = Arc::new(ScriptedProvider::new("openai"));
        let o = AnalysisOrchestrator::from_config(&AnalysisConfig::default(), vec![openai, gemini])
            .unwrap();
        assert_eq!(o.provider_names(), vec!["openai"]);
    }

    #[test]
    fn config_order_ranks_providers() {
        let gemini: Arc<dyn VisionProvider> = Arc::new(ScriptedProvider::new("gemini"));
        let openai: Arc<dyn VisionProvider> = Arc::new(ScriptedProvider::new("openai"));
        let config = AnalysisConfig {
            provider_order: vec!["openai".into(), "gemini".into()],
            ..AnalysisConfig::default()
        };
        let o = AnalysisOrchestrator::from_config(&config, vec![gemini, openai]).unwrap();
        assert_eq!(o.provider_names(), vec!["openai", "gemini"]);
    }

    #[tokio::test(start_paused = true)]
    async fn declared_weight_skips_estimation() {
        let p = Arc::new(ScriptedProvider::new("gemini").reply(Ok(PASTA)));
        let o = orchestrator(vec![p.clone()]);

        let result = o
            .analyze_food(&image(), Some(180.0), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.carbs_grams, 60.0);
        assert_eq!(result.confidence, Confidence::High);
        assert_eq!(result.food_items, vec!["паста"]);
        assert_eq!(result.resolved_weight_grams, Some(180.0));
        assert_eq!(result.weight_source, WeightSource::Declared);
        assert_eq!(result.provider, "gemini");
        assert!(!result.no_food);
        assert_eq!(*p.seen_weight.lock().unwrap(), Some(Some(180.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn estimated_weight_is_passed_to_analysis() {
        let p = Arc::new(ScriptedProvider::new("gemini").weight(Ok(250.0)).reply(Ok(PASTA)));
        let o = orchestrator(vec![p.clone()]);

        let result = o
            .analyze_food(&image(), None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.resolved_weight_grams, Some(250.0));
        assert_eq!(result.weight_source, WeightSource::Estimated);
        assert_eq!(*p.seen_weight.lock().unwrap(), Some(Some(250.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_weight_estimate_degrades_to_unweighted_analysis() {
        let p = Arc::new(
            ScriptedProvider::new("gemini")
                .weight(Err(CarbwiseError::parse("невозможно")))
                .reply(Ok(PASTA)),
        );
        let o = orchestrator(vec![p.clone()]);

        let result = o
            .analyze_food(&image(), Some(0.0), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*p.seen_weight.lock().unwrap(), Some(None));
        // The model's own weight is used when nothing else is known.
        assert_eq!(result.resolved_weight_grams, Some(210.0));
    }

    #[tokio::test(start_paused = true)]
    async fn two_rate_limits_then_success_is_three_attempts() {
        let p = Arc::new(
            ScriptedProvider::new("gemini")
                .reply(Err(CarbwiseError::provider_status("rate limited", 429)))
                .reply(Err(CarbwiseError::provider_status("rate limited", 429)))
                .reply(Ok(PASTA)),
        );
        let o = orchestrator(vec![p.clone()]);

        let result = o
            .analyze_food(&image(), Some(100.0), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.carbs_grams, 60.0);
        assert_eq!(p.analyze_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_provider_falls_back_to_next() {
        let gemini = Arc::new(
            ScriptedProvider::new("gemini")
                .reply(Err(CarbwiseError::provider_status("down", 503)))
                .reply(Err(CarbwiseError::provider_status("down", 503)))
                .reply(Err(CarbwiseError::provider_status("down", 503))),
        );
        let openai = Arc::new(ScriptedProvider::new("openai").reply(Ok(PASTA)));
        let o = orchestrator(vec![gemini.clone(), openai.clone()]);

        let result = o
            .analyze_food(&image(), Some(100.0), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.provider, "openai");
        assert_eq!(gemini.analyze_calls.load(Ordering::SeqCst), 3);
        assert_eq!(openai.analyze_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_does_not_fall_back() {
        let gemini = Arc::new(
            ScriptedProvider::new("gemini")
                .reply(Err(CarbwiseError::provider_status("bad key", 401))),
        );
        let openai = Arc::new(ScriptedProvider::new("openai").reply(Ok(PASTA)));
        let o = orchestrator(vec![gemini.clone(), openai.clone()]);

        let err = o
            .analyze_food(&image(), Some(100.0), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CarbwiseError::Provider { status: Some(401), .. }));
        assert_eq!(gemini.analyze_calls.load(Ordering::SeqCst), 1);
        assert_eq!(openai.analyze_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unparseable_reply_is_a_parse_error() {
        let p = Arc::new(ScriptedProvider::new("gemini").reply(Ok("Извините, не могу помочь.")));
        let o = orchestrator(vec![p.clone()]);

        let err = o
            .analyze_food(&image(), Some(100.0), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, CarbwiseError::Parse { .. }));
        assert_eq!(p.analyze_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn no_food_is_a_successful_sentinel() {
        let reply = format!(
            r#"{{"food_items":[],"carbs":0,"confidence":"low","analysis_text":"{NO_FOOD_MESSAGE}","weight":0}}"#
        );
        let p = Arc::new(ScriptedProvider::new("gemini").weight(Ok(120.0)).reply(Ok(&reply)));
        let o = orchestrator(vec![p]);

        let result = o
            .analyze_food(&image(), None, &CancellationToken::new())
            .await
            .unwrap();

        assert!(result.no_food);
        assert_eq!(result.carbs_grams, 0.0);
        assert_eq!(result.resolved_weight_grams, None);
        assert!(result.rationale.contains(NO_FOOD_MARKER));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_token_aborts_analysis() {
        let p = Arc::new(ScriptedProvider::new("gemini").reply(Ok(PASTA)));
        let o = orchestrator(vec![p]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = o.analyze_food(&image(), Some(100.0), &cancel).await.unwrap_err();
        assert!(matches!(err, CarbwiseError::Cancelled));
    }
}
