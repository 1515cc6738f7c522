// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `carbwise serve` command implementation.
//!
//! Opens SQLite storage, ranks the configured vision providers, connects
//! the Telegram channel and runs the conversation engine until SIGINT or
//! SIGTERM. With the in-memory state backend, expired conversation state
//! is swept in the background; Redis expires it on its own.

use std::sync::Arc;
use std::time::Duration;

use carbwise_analysis::AnalysisOrchestrator;
use carbwise_config::model::{CarbwiseConfig, StateBackend, StateConfig};
use carbwise_conversation::{ConversationEngine, MemoryStateStore, shutdown};
use carbwise_core::error::CarbwiseError;
use carbwise_core::{ChannelAdapter, StateStore, StorageAdapter, VisionProvider};
use carbwise_dosing::{DayClock, DoseCalculator};
use carbwise_ratio::RatioIntervalStore;
use carbwise_storage::SqliteStorage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(feature = "telegram")]
use carbwise_telegram::TelegramChannel;

#[cfg(not(feature = "telegram"))]
compile_error!("carbwise requires the 'telegram' feature for its chat channel");

/// How long running turns may finish after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the `carbwise serve` command.
pub async fn run_serve(config: CarbwiseConfig) -> Result<(), CarbwiseError> {
    init_tracing(&config.bot.log_level);

    info!(name = %config.bot.name, "starting carbwise serve");

    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

    let analysis = AnalysisOrchestrator::from_config(&config.analysis, vision_providers(&config))
        .inspect_err(|e| {
            error!(error = %e, "no vision provider available; set GEMINI_API_KEY or OPENAI_API_KEY");
        })?;

    let (state, memory): (Arc<dyn StateStore>, _) = match config.state.backend {
        StateBackend::Memory => {
            let store = Arc::new(MemoryStateStore::from_config(&config.state));
            info!(ttl_secs = config.state.ttl_secs, "conversation state kept in memory");
            (store.clone() as Arc<dyn StateStore>, Some(store))
        }
        StateBackend::Redis => (redis_state(&config.state).await?, None),
    };

    let mut telegram = TelegramChannel::new(config.telegram.clone())?;
    telegram.connect().await?;
    let channel: Arc<dyn ChannelAdapter> = Arc::new(telegram);

    let cancel = shutdown::install_signal_handler();

    let sweeper = memory.map(|store| {
        tokio::spawn(sweep_expired_state(
            store,
            Duration::from_secs(config.state.sweep_interval_secs.max(1)),
            cancel.clone(),
        ))
    });
    let ratios = RatioIntervalStore::new(storage.clone());
    let dosing = DoseCalculator::new(ratios.clone(), DayClock::from_config(&config.dosing));

    let engine = Arc::new(ConversationEngine::new(
        storage.clone(),
        state,
        ratios,
        dosing,
        Arc::new(analysis),
        channel.clone(),
        cancel.clone(),
    ));
    let result = engine.run(DRAIN_TIMEOUT).await;

    cancel.cancel();
    if let Some(sweeper) = sweeper
        && let Err(e) = sweeper.await
    {
        warn!(error = %e, "state sweeper ended abnormally");
    }
    if let Err(e) = channel.shutdown().await {
        warn!(error = %e, "channel shutdown failed");
    }
    if let Err(e) = storage.close().await {
        warn!(error = %e, "storage close failed");
    }

    info!("carbwise stopped");
    result
}

/// Providers compiled in and constructible from config, in no particular order.
///
/// The orchestrator ranks them by `analysis.provider_order`.
fn vision_providers(config: &CarbwiseConfig) -> Vec<Arc<dyn VisionProvider>> {
    let mut providers: Vec<Arc<dyn VisionProvider>> = Vec::new();

    #[cfg(feature = "gemini")]
    match carbwise_gemini::GeminiProvider::new(config) {
        Ok(provider) => providers.push(Arc::new(provider)),
        Err(e) => warn!(error = %e, "gemini provider disabled"),
    }

    #[cfg(feature = "openai")]
    match carbwise_openai::OpenAiProvider::new(config) {
        Ok(provider) => providers.push(Arc::new(provider)),
        Err(e) => warn!(error = %e, "openai provider disabled"),
    }

    for provider in &providers {
        debug!(
            provider = provider.name(),
            available = provider.is_available(),
            "vision provider constructed"
        );
    }
    providers
}

#[cfg(feature = "redis")]
async fn redis_state(config: &StateConfig) -> Result<Arc<dyn StateStore>, CarbwiseError> {
    let store = carbwise_conversation::RedisStateStore::connect(config)
        .await
        .inspect_err(|e| error!(error = %e, "cannot reach the redis state store"))?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn redis_state(_config: &StateConfig) -> Result<Arc<dyn StateStore>, CarbwiseError> {
    Err(CarbwiseError::Config(
        "state.backend = \"redis\" requires a build with the `redis` feature".into(),
    ))
}

/// Drops expired conversation state every `every` until cancelled.
async fn sweep_expired_state(
    state: Arc<MemoryStateStore>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing can have expired yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("state sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                match state.sweep_expired().await {
                    Ok(removed) if removed > 0 => {
                        info!(removed, remaining = state.len(), "expired conversation state swept");
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "state sweep failed"),
                }
            }
        }
    }
}

/// Initializes the tracing subscriber. `RUST_LOG` overrides the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("carbwise={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use carbwise_core::types::{ConversationState, ExternalUserId};

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_expired_state_and_stops_on_cancel() {
        let state = Arc::new(MemoryStateStore::new(Duration::from_secs(60)));
        state
            .set_state(ExternalUserId(1), ConversationState::AnalysisArmed)
            .await
            .unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(sweep_expired_state(
            state.clone(),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(95)).await;
        assert!(state.is_empty());

        cancel.cancel();
        task.await.unwrap();
    }
}
