// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded retry with linear backoff for provider calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use carbwise_config::model::AnalysisConfig;
use carbwise_core::CarbwiseError;

/// How often and how patiently a provider call is retried.
///
/// Only errors for which [`CarbwiseError::is_transient`] holds are retried.
/// The wait before retry `n` is `n * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.backoff_base_ms),
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Runs `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Cancellation interrupts both the call and the backoff sleep.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, CarbwiseError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CarbwiseError>>,
    {
        let mut attempt = 1;
        loop {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CarbwiseError::Cancelled),
                result = op() => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_transient() || attempt >= self.max_attempts {
                return Err(err);
            }

            let delay = self.delay_for(attempt);
            warn!(
                operation,
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "transient provider error, retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CarbwiseError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }

    #[test]
    fn backoff_grows_linearly() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_secs(1));
        assert_eq!(p.delay_for(2), Duration::from_secs(2));
    }

    #[test]
    fn zero_attempts_in_config_still_tries_once() {
        let config = AnalysisConfig {
            max_attempts: 0,
            ..AnalysisConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn two_rate_limits_then_success_takes_three_attempts() {
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let result = policy()
            .run("test", &cancel, || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(CarbwiseError::provider_status("rate limited", 429))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy()
            .run("test", &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CarbwiseError::provider_status("unavailable", 503)) }
            })
            .await;

        assert!(matches!(
            result,
            Err(CarbwiseError::Provider {
                status: Some(503),
                ..
            })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = policy()
            .run("test", &CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CarbwiseError::provider_status("bad request", 400)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let parse_calls = AtomicU32::new(0);
        let result: Result<(), _> = policy()
            .run("test", &CancellationToken::new(), || {
                parse_calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CarbwiseError::parse("garbage")) }
            })
            .await;
        assert!(matches!(result, Err(CarbwiseError::Parse { .. })));
        assert_eq!(parse_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_backoff_sleep() {
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let trigger = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = policy()
            .run("test", &cancel, || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(CarbwiseError::provider_status("rate limited", 429)) }
            })
            .await;

        handle.await.unwrap();
        assert!(matches!(result, Err(CarbwiseError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
