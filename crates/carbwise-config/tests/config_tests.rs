// SPDX-FileCopyrightText: 2026 Carbwise Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Carbwise configuration system.

use std::io::Write;

use carbwise_config::diagnostic::ConfigError;
use carbwise_config::model::{CarbwiseConfig, StateBackend};
use carbwise_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};
use serial_test::serial;

/// Valid TOML with every section deserializes successfully.
#[test]
fn valid_toml_deserializes_into_carbwise_config() {
    let toml = r#"
[bot]
name = "test-bot"
log_level = "debug"

[telegram]
bot_token = "123:ABC"
allowed_users = ["42", "alice"]

[gemini]
api_key = "g-key"
model = "gemini-2.5-flash"

[openai]
api_key = "sk-123"

[analysis]
provider_order = ["openai", "gemini"]
max_attempts = 5
backoff_base_ms = 250
request_timeout_secs = 30

[storage]
database_path = "/tmp/test.db"
wal_mode = false

[state]
backend = "redis"
ttl_secs = 3600
sweep_interval_secs = 60
redis_url = "redis://cache:6379/2"
redis_key_prefix = "bot-a"

[dosing]
utc_offset_minutes = 180
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.bot.name, "test-bot");
    assert_eq!(config.bot.log_level, "debug");
    assert_eq!(config.telegram.bot_token.as_deref(), Some("123:ABC"));
    assert_eq!(config.telegram.allowed_users, vec!["42", "alice"]);
    assert_eq!(config.gemini.api_key.as_deref(), Some("g-key"));
    assert_eq!(config.gemini.model, "gemini-2.5-flash");
    assert_eq!(config.openai.api_key.as_deref(), Some("sk-123"));
    assert_eq!(config.analysis.provider_order, vec!["openai", "gemini"]);
    assert_eq!(config.analysis.max_attempts, 5);
    assert_eq!(config.analysis.backoff_base_ms, 250);
    assert_eq!(config.analysis.request_timeout_secs, 30);
    assert_eq!(config.storage.database_path, "/tmp/test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.state.ttl_secs, 3600);
    assert_eq!(config.state.sweep_interval_secs, 60);
    assert_eq!(config.state.backend, StateBackend::Redis);
    assert_eq!(config.state.redis_url.as_deref(), Some("redis://cache:6379/2"));
    assert_eq!(config.state.redis_key_prefix, "bot-a");
    assert_eq!(config.dosing.utc_offset_minutes, Some(180));
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML should use defaults");

    assert_eq!(config.bot.name, "carbwise");
    assert_eq!(config.bot.log_level, "info");
    assert!(config.telegram.bot_token.is_none());
    assert!(config.telegram.allowed_users.is_empty());
    assert_eq!(config.gemini.model, "gemini-2.0-flash");
    assert_eq!(
        config.gemini.base_url,
        "https://generativelanguage.googleapis.com"
    );
    assert_eq!(config.analysis.provider_order, vec!["gemini", "openai"]);
    assert_eq!(config.analysis.max_attempts, 3);
    assert_eq!(config.analysis.backoff_base_ms, 1000);
    assert_eq!(config.state.ttl_secs, 86_400);
    assert_eq!(config.state.backend, StateBackend::Memory);
    assert!(config.state.redis_url.is_none());
    assert!(config.storage.wal_mode);
    assert!(config.storage.database_path.ends_with("carbwise.db"));
    assert!(config.dosing.utc_offset_minutes.is_none());
}

#[test]
fn unknown_field_in_analysis_is_rejected_with_suggestion() {
    let toml = r#"
[analysis]
max_atempts = 4
"#;

    let errors = load_and_validate_str(toml).expect_err("typo should fail");
    let unknown = errors
        .iter()
        .find_map(|e| match e {
            ConfigError::UnknownKey {
                key,
                suggestion,
                span,
                ..
            } => Some((key.clone(), suggestion.clone(), *span)),
            _ => None,
        })
        .expect("should report an unknown key");

    assert_eq!(unknown.0, "max_atempts");
    assert_eq!(unknown.1.as_deref(), Some("max_attempts"));
    assert!(unknown.2.is_some(), "inline source should yield a span");
}

#[test]
fn unknown_top_level_section_is_rejected() {
    let toml = r#"
[agent]
name = "legacy"
"#;
    let err = load_config_from_str(toml).expect_err("unknown section should fail");
    assert!(err.to_string().contains("agent"));
}

#[test]
fn invalid_type_is_reported_with_key_path() {
    let toml = r#"
[analysis]
max_attempts = "three"
"#;

    let errors = load_and_validate_str(toml).expect_err("string for int should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::InvalidType { key, .. } if key == "analysis.max_attempts"
    )));
}

#[test]
fn validation_rejects_unknown_provider_and_zero_attempts() {
    let toml = r#"
[analysis]
provider_order = ["claude"]
max_attempts = 0
"#;

    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    assert!(messages.iter().any(|m| m.contains("unknown provider `claude`")));
    assert!(messages.iter().any(|m| m.contains("max_attempts")));
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "ttl_sec".to_string(),
        suggestion: Some("ttl_secs".to_string()),
        valid_keys: "ttl_secs, sweep_interval_secs".to_string(),
        span: None,
        src: None,
    };

    assert!(error.code().is_some());
    let help = error.help().expect("should have help").to_string();
    assert!(help.contains("did you mean `ttl_secs`"));

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render without error");
    assert!(buf.contains("ttl_sec"));
}

#[test]
fn dotted_override_reaches_nested_key() {
    use figment::{Figment, providers::Serialized};

    let config: CarbwiseConfig = Figment::new()
        .merge(Serialized::defaults(CarbwiseConfig::default()))
        .merge(("telegram.bot_token", "xyz-from-env"))
        .extract()
        .expect("should set bot_token via dot notation");

    assert_eq!(config.telegram.bot_token.as_deref(), Some("xyz-from-env"));
}

#[test]
#[serial]
fn env_var_overrides_file_value() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[analysis]\nmax_attempts = 2\n\n[telegram]\nbot_token = \"file\"").unwrap();

    // SAFETY: test-only env mutation, serialized with other env tests.
    unsafe {
        std::env::set_var("CARBWISE_ANALYSIS_MAX_ATTEMPTS", "7");
        std::env::set_var("CARBWISE_TELEGRAM_BOT_TOKEN", "from-env");
    }
    let result = load_and_validate_path(file.path());
    unsafe {
        std::env::remove_var("CARBWISE_ANALYSIS_MAX_ATTEMPTS");
        std::env::remove_var("CARBWISE_TELEGRAM_BOT_TOKEN");
    }

    let config = result.expect("file plus env should validate");
    assert_eq!(config.analysis.max_attempts, 7);
    assert_eq!(config.telegram.bot_token.as_deref(), Some("from-env"));
}

#[test]
#[serial]
fn env_selects_redis_state_backend() {
    let file = tempfile::NamedTempFile::new().unwrap();

    // SAFETY: test-only env mutation, serialized with other env tests.
    unsafe {
        std::env::set_var("CARBWISE_STATE_BACKEND", "redis");
        std::env::set_var("CARBWISE_STATE_REDIS_URL", "redis://127.0.0.1:6379/0");
    }
    let result = load_and_validate_path(file.path());
    unsafe {
        std::env::remove_var("CARBWISE_STATE_BACKEND");
        std::env::remove_var("CARBWISE_STATE_REDIS_URL");
    }

    let config = result.expect("redis backend with a url should validate");
    assert_eq!(config.state.backend, StateBackend::Redis);
    assert_eq!(config.state.redis_url.as_deref(), Some("redis://127.0.0.1:6379/0"));
    assert_eq!(config.state.redis_key_prefix, "carbwise");
}

#[test]
fn unknown_state_backend_is_rejected() {
    let result = load_config_from_str("[state]\nbackend = \"memcached\"\n");
    assert!(result.is_err());
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    let config = load_and_validate_path(std::path::Path::new("/nonexistent/carbwise.toml"))
        .expect("missing file should be skipped");
    assert_eq!(config.bot.name, "carbwise");
}
