// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Agora feed engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Agora configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgoraConfig {
    /// Remote board service settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Push channel settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Invalidation coalescing settings.
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Durable client storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote board service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL of the REST API, without a trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Number of posts requested per feed page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Retries for idempotent reads on network or 5xx failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            page_size: default_page_size(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_page_size() -> u32 {
    50
}

fn default_max_retries() -> u32 {
    1
}

/// Push channel configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RealtimeConfig {
    /// Whether to open the push channel at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Explicit push channel URL. Derived from `api.base_url` when unset.
    #[serde(default)]
    pub url: Option<String>,

    /// Interval between keepalive probes while open.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Silence longer than `keepalive_secs * idle_multiplier` counts as a dropped transport.
    #[serde(default = "default_idle_multiplier")]
    pub idle_multiplier: u32,

    /// Fixed part of the reconnect delay.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Upper bound of the uniform random jitter added to the reconnect delay.
    #[serde(default = "default_backoff_jitter_ms")]
    pub backoff_jitter_ms: u64,

    /// Cap on the reconnect delay.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: None,
            keepalive_secs: default_keepalive_secs(),
            idle_multiplier: default_idle_multiplier(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_jitter_ms: default_backoff_jitter_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl RealtimeConfig {
    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }

    /// How long the channel may stay silent before it is considered dead.
    pub fn idle_timeout(&self) -> Duration {
        self.keepalive() * self.idle_multiplier.max(1)
    }

    /// The push channel URL: the explicit one, or `api_base` with a ws scheme.
    pub fn resolve_url(&self, api_base: &str) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        let base = api_base.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        format!("{ws_base}/realtime?channel=feed")
    }
}

fn default_true() -> bool {
    true
}

fn default_keepalive_secs() -> u64 {
    25
}

fn default_idle_multiplier() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1200
}

fn default_backoff_jitter_ms() -> u64 {
    1000
}

fn default_backoff_max_ms() -> u64 {
    5000
}

/// What the reconciler does with an update for a post outside the active window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePolicy {
    /// Refetch the post right away.
    #[default]
    Eager,
    /// Mark it stale and refetch when it is next shown.
    Lazy,
}

/// Invalidation coalescing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReconcilerConfig {
    /// Quiet period after the last event for a key before its action fires.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Handling of `post_updated` for posts not in the active window.
    #[serde(default)]
    pub update_policy: UpdatePolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            update_policy: UpdatePolicy::default(),
        }
    }
}

impl ReconcilerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_debounce_ms() -> u64 {
    400
}

/// Durable client storage configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Whether to enable WAL journal mode.
    #[serde(default = "default_true")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: true,
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("agora/agora.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("agora.db"))
        .display()
        .to_string()
}

/// Log output configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive (trace, debug, info, warn, error). `RUST_LOG` wins.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_url_is_derived_from_api_base() {
        let realtime = RealtimeConfig::default();
        assert_eq!(
            realtime.resolve_url("https://board.example.dev/"),
            "wss://board.example.dev/realtime?channel=feed"
        );
        assert_eq!(
            realtime.resolve_url("http://127.0.0.1:8787"),
            "ws://127.0.0.1:8787/realtime?channel=feed"
        );
    }

    #[test]
    fn explicit_push_url_wins() {
        let realtime = RealtimeConfig {
            url: Some("ws://push.local/feed".into()),
            ..RealtimeConfig::default()
        };
        assert_eq!(realtime.resolve_url("https://x"), "ws://push.local/feed");
    }

    #[test]
    fn idle_timeout_is_a_multiple_of_keepalive() {
        let realtime = RealtimeConfig::default();
        assert_eq!(realtime.idle_timeout(), Duration::from_secs(75));
    }
}
