// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::{CarbwiseConfig, StateBackend};

/// Provider names accepted in `analysis.provider_order`.
pub const KNOWN_PROVIDERS: [&str; 2] = ["gemini", "openai"];

/// Largest UTC offset in use anywhere (UTC+14).
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// URL schemes the Redis client accepts over TCP.
const REDIS_SCHEMES: [&str; 2] = ["redis://", "rediss://"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first.
pub fn validate_config(config: &CarbwiseConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::validation(
            "storage.database_path must not be empty",
        ));
    }

    let analysis = &config.analysis;
    if analysis.max_attempts == 0 {
        errors.push(ConfigError::validation(
            "analysis.max_attempts must be at least 1",
        ));
    }
    if analysis.request_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "analysis.request_timeout_secs must be greater than 0",
        ));
    }
    if analysis.provider_order.is_empty() {
        errors.push(ConfigError::validation(
            "analysis.provider_order must name at least one provider",
        ));
    }
    let mut seen = HashSet::new();
    for name in &analysis.provider_order {
        if !KNOWN_PROVIDERS.contains(&name.as_str()) {
            errors.push(ConfigError::validation(format!(
                "analysis.provider_order contains unknown provider `{name}` (known: {})",
                KNOWN_PROVIDERS.join(", ")
            )));
        } else if !seen.insert(name) {
            errors.push(ConfigError::validation(format!(
                "analysis.provider_order lists `{name}` more than once"
            )));
        }
    }

    if config.state.ttl_secs == 0 {
        errors.push(ConfigError::validation("state.ttl_secs must be greater than 0"));
    }
    if config.state.sweep_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "state.sweep_interval_secs must be greater than 0",
        ));
    }

    if config.state.backend == StateBackend::Redis {
        match config.state.redis_url.as_deref().map(str::trim) {
            None | Some("") => errors.push(ConfigError::validation(
                "state.redis_url is required when state.backend = \"redis\"",
            )),
            Some(url) if !REDIS_SCHEMES.iter().any(|s| url.starts_with(s)) => {
                errors.push(ConfigError::validation(format!(
                    "state.redis_url must start with {}, got `{url}`",
                    REDIS_SCHEMES.join(" or ")
                )));
            }
            Some(_) => {}
        }
        if config.state.redis_key_prefix.trim().is_empty() {
            errors.push(ConfigError::validation(
                "state.redis_key_prefix must not be empty",
            ));
        }
    }

    if let Some(offset) = config.dosing.utc_offset_minutes
        && offset.abs() > MAX_UTC_OFFSET_MINUTES
    {
        errors.push(ConfigError::validation(format!(
            "dosing.utc_offset_minutes must be within ±{MAX_UTC_OFFSET_MINUTES}, got {offset}"
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
