// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Lookup order: `/etc/agora/agora.toml` < `~/.config/agora/agora.toml` < `./agora.toml`,
//! then `AGORA_*` environment variables.

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::AgoraConfig;

pub const SYSTEM_CONFIG_PATH: &str = "/etc/agora/agora.toml";

/// Load configuration from the standard XDG hierarchy with env var overrides.
pub fn load_config() -> Result<AgoraConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only. No file lookup, no env.
pub fn load_config_from_str(toml_content: &str) -> Result<AgoraConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(AgoraConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<AgoraConfig, figment::Error> {
    tracing::debug!(path = %path.display(), "loading config file");
    Figment::new()
        .merge(Serialized::defaults(AgoraConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The full layered Figment, before extraction.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(AgoraConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("agora/agora.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("agora.toml"))
        .merge(env_provider())
}

/// Maps `AGORA_SECTION_KEY` to `section.key`.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `AGORA_API_BASE_URL` is `api.base_url`, not `api.base.url`.
fn env_provider() -> Env {
    Env::prefixed("AGORA_").map(|key| {
        let key_str = key.as_str();
        let mapped = if key_str.starts_with("api_") {
            key_str.replacen("api_", "api.", 1)
        } else if key_str.starts_with("realtime_") {
            key_str.replacen("realtime_", "realtime.", 1)
        } else if key_str.starts_with("reconciler_") {
            key_str.replacen("reconciler_", "reconciler.", 1)
        } else if key_str.starts_with("storage_") {
            key_str.replacen("storage_", "storage.", 1)
        } else if key_str.starts_with("logging_") {
            key_str.replacen("logging_", "logging.", 1)
        } else {
            key_str.to_string()
        };
        mapped.into()
    })
}
