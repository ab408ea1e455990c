// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::AgoraConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

/// Validate a deserialized configuration. Collects every failure instead of
/// stopping at the first.
pub fn validate_config(config: &AgoraConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let base = config.api.base_url.trim();
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        fail(format!(
            "api.base_url must start with http:// or https://, got `{base}`"
        ));
    }

    if config.api.timeout_secs == 0 {
        fail("api.timeout_secs must be at least 1".to_string());
    }

    if !(1..=100).contains(&config.api.page_size) {
        fail(format!(
            "api.page_size must be between 1 and 100, got {}",
            config.api.page_size
        ));
    }

    if let Some(url) = &config.realtime.url {
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            fail(format!(
                "realtime.url must start with ws:// or wss://, got `{url}`"
            ));
        }
    }

    if config.realtime.keepalive_secs == 0 {
        fail("realtime.keepalive_secs must be at least 1".to_string());
    }

    if config.realtime.idle_multiplier < 2 {
        fail(format!(
            "realtime.idle_multiplier must be at least 2, got {}",
            config.realtime.idle_multiplier
        ));
    }

    if config.realtime.backoff_base_ms < 1000 {
        fail(format!(
            "realtime.backoff_base_ms must be at least 1000, got {}",
            config.realtime.backoff_base_ms
        ));
    }

    if config.realtime.backoff_max_ms < config.realtime.backoff_base_ms {
        fail(format!(
            "realtime.backoff_max_ms ({}) must not be below realtime.backoff_base_ms ({})",
            config.realtime.backoff_max_ms, config.realtime.backoff_base_ms
        ));
    }

    if !(1..=5000).contains(&config.reconciler.debounce_ms) {
        fail(format!(
            "reconciler.debounce_ms must be between 1 and 5000, got {}",
            config.reconciler.debounce_ms
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if !LOG_LEVELS.contains(&config.logging.level.to_lowercase().as_str()) {
        fail(format!(
            "logging.level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.logging.level
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_config(&AgoraConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_failures() {
        let mut config = AgoraConfig::default();
        config.api.base_url = "ftp://board".into();
        config.api.page_size = 0;
        config.reconciler.debounce_ms = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn backoff_cap_below_base_is_rejected() {
        let mut config = AgoraConfig::default();
        config.realtime.backoff_base_ms = 2000;
        config.realtime.backoff_max_ms = 1500;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors[0].to_string().contains("backoff_max_ms"));
    }

    #[test]
    fn push_url_needs_ws_scheme() {
        let mut config = AgoraConfig::default();
        config.realtime.url = Some("http://push".into());
        assert!(validate_config(&config).is_err());
    }
}
