// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Agora configuration system.

use agora_config::diagnostic::ConfigError;
use agora_config::model::{AgoraConfig, UpdatePolicy};
use agora_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

#[test]
fn valid_toml_deserializes_into_agora_config() {
    let toml = r#"
[api]
base_url = "https://board.example.dev"
timeout_secs = 10
page_size = 20
max_retries = 2

[realtime]
enabled = false
keepalive_secs = 15
backoff_base_ms = 1500
backoff_max_ms = 8000

[reconciler]
debounce_ms = 250
update_policy = "lazy"

[storage]
database_path = "/tmp/agora-test.db"
wal_mode = false

[logging]
level = "debug"
"#;

    let config = load_and_validate_str(toml).expect("valid TOML should load");
    assert_eq!(config.api.base_url, "https://board.example.dev");
    assert_eq!(config.api.page_size, 20);
    assert_eq!(config.api.max_retries, 2);
    assert!(!config.realtime.enabled);
    assert_eq!(config.realtime.keepalive_secs, 15);
    assert_eq!(config.realtime.idle_multiplier, 3);
    assert_eq!(config.reconciler.debounce_ms, 250);
    assert_eq!(config.reconciler.update_policy, UpdatePolicy::Lazy);
    assert_eq!(config.storage.database_path, "/tmp/agora-test.db");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.logging.level, "debug");
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_and_validate_str("").expect("defaults should validate");
    assert_eq!(config.api.page_size, 50);
    assert_eq!(config.realtime.keepalive_secs, 25);
    assert_eq!(config.realtime.backoff_base_ms, 1200);
    assert_eq!(config.realtime.backoff_jitter_ms, 1000);
    assert_eq!(config.realtime.backoff_max_ms, 5000);
    assert_eq!(config.reconciler.debounce_ms, 400);
    assert_eq!(config.reconciler.update_policy, UpdatePolicy::Eager);
}

#[test]
fn unknown_key_gets_a_suggestion() {
    let toml = "[reconciler]\ndebounse_ms = 100\n";
    let errors = load_and_validate_str(toml).expect_err("unknown key must be rejected");
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "debounse_ms");
            assert_eq!(suggestion.as_deref(), Some("debounce_ms"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn wrong_type_is_reported_with_key_path() {
    let toml = "[api]\npage_size = \"many\"\n";
    let errors = load_and_validate_str(toml).expect_err("type mismatch must be rejected");
    match &errors[0] {
        ConfigError::InvalidType { key, .. } => assert_eq!(key, "api.page_size"),
        other => panic!("expected InvalidType, got {other:?}"),
    }
}

#[test]
fn unknown_update_policy_is_rejected() {
    let toml = "[reconciler]\nupdate_policy = \"sometimes\"\n";
    assert!(load_config_from_str(toml).is_err());
}

#[test]
fn out_of_range_values_fail_validation() {
    let toml = r#"
[api]
base_url = "board.example.dev"
page_size = 500

[realtime]
backoff_base_ms = 200
"#;
    let errors = load_and_validate_str(toml).expect_err("should fail validation");
    assert!(
        errors
            .iter()
            .all(|e| matches!(e, ConfigError::Validation { .. }))
    );
    assert_eq!(errors.len(), 3);
}

#[test]
fn env_overrides_file_values() {
    figment::Jail::expect_with(|jail| {
        jail.create_file(
            "custom.toml",
            "[api]\nbase_url = \"https://file.example\"\npage_size = 10\n",
        )?;
        jail.set_env("AGORA_API_PAGE_SIZE", "25");
        jail.set_env("AGORA_RECONCILER_UPDATE_POLICY", "lazy");
        jail.set_env("AGORA_STORAGE_DATABASE_PATH", "/tmp/env.db");

        let config = load_and_validate_path(std::path::Path::new("custom.toml"))
            .map_err(|errors| format!("{errors:?}"))?;
        assert_eq!(config.api.base_url, "https://file.example");
        assert_eq!(config.api.page_size, 25);
        assert_eq!(config.reconciler.update_policy, UpdatePolicy::Lazy);
        assert_eq!(config.storage.database_path, "/tmp/env.db");
        Ok(())
    });
}

#[test]
fn effective_config_renders_back_to_toml() {
    let rendered = agora_config::to_toml_string(&AgoraConfig::default()).unwrap();
    assert!(rendered.contains("[reconciler]"));
    let reparsed = load_and_validate_str(&rendered).expect("rendered config should reload");
    assert_eq!(reparsed.reconciler.debounce_ms, 400);
}
