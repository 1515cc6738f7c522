// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered configuration loading with Figment.
//!
//! Files are read from `/etc/carbwise/carbwise.toml`, the XDG config
//! directory and `./carbwise.toml`, then `CARBWISE_*` environment
//! variables are applied on top.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::CarbwiseConfig;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "CARBWISE_";

/// Top-level sections an environment key may address.
const SECTIONS: [&str; 8] = [
    "bot", "telegram", "gemini", "openai", "analysis", "storage", "state", "dosing",
];

pub const SYSTEM_CONFIG_PATH: &str = "/etc/carbwise/carbwise.toml";
pub const LOCAL_CONFIG_PATH: &str = "carbwise.toml";

/// Path of the per-user config file, if the platform has a config directory.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("carbwise").join("carbwise.toml"))
}

/// Load configuration from the standard hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/carbwise/carbwise.toml`
/// 3. `~/.config/carbwise/carbwise.toml`
/// 4. `./carbwise.toml`
/// 5. `CARBWISE_*` environment variables
pub fn load_config() -> Result<CarbwiseConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only. No files, no environment.
pub fn load_config_from_str(toml_content: &str) -> Result<CarbwiseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CarbwiseConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from an explicit file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CarbwiseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CarbwiseConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment behind [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new()
        .merge(Serialized::defaults(CarbwiseConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH));
    if let Some(path) = user_config_path() {
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Toml::file(LOCAL_CONFIG_PATH))
        .merge(env_provider())
}

/// Environment provider mapping `CARBWISE_<SECTION>_<KEY>` to `section.key`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `CARBWISE_TELEGRAM_BOT_TOKEN` maps to `telegram.bot_token`.
pub fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
}

fn map_env_key(key: &str) -> String {
    SECTIONS
        .iter()
        .find_map(|section| {
            key.strip_prefix(section)
                .and_then(|rest| rest.strip_prefix('_'))
                .map(|field| format!("{section}.{field}"))
        })
        .unwrap_or_else(|| key.to_string())
}
