// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Parley configuration system.

use std::io::Write;

use parley_config::diagnostic::ConfigError;
use parley_config::model::StateBackend;
use parley_config::{load_and_validate_path, load_and_validate_str, load_config_from_str};

#[test]
fn full_config_deserializes() {
    let toml = r#"
[service]
name = "parley-eu"
log_level = "debug"

[engine]
search_timeout_secs = 30
search_poll_interval_ms = 500
dialog_inactivity_secs = 600
topic_ttl_secs = 120
ban_duration_secs = 7200

[state]
backend = "redis"
redis_url = "redis://cache:6379/2"

[storage]
database_path = "/tmp/parley-test.db"
wal_mode = false

[worker]
sweep_interval_secs = 5

[metrics]
enabled = true
bind_address = "0.0.0.0:9000"
"#;

    let config = load_and_validate_str(toml).expect("valid config");
    assert_eq!(config.service.name, "parley-eu");
    assert_eq!(config.engine.search_timeout_secs, 30);
    assert_eq!(config.engine.search_poll_interval().as_millis(), 500);
    assert_eq!(config.engine.ban_duration().as_secs(), 7200);
    assert_eq!(config.engine.cooldown_secs, 1, "unset keys keep defaults");
    assert_eq!(config.state.backend, StateBackend::Redis);
    assert_eq!(config.state.redis_url, "redis://cache:6379/2");
    assert!(!config.storage.wal_mode);
    assert_eq!(config.worker.sweep_interval_secs, 5);
    assert!(config.metrics.enabled);
}

#[test]
fn empty_config_uses_defaults() {
    let config = load_config_from_str("").expect("defaults");
    assert_eq!(config.engine.search_timeout_secs, 20);
    assert_eq!(config.engine.dialog_inactivity_secs, 1800);
    assert_eq!(config.engine.topic_ttl_secs, 3600);
    assert_eq!(config.engine.ban_duration_secs, 3600);
    assert_eq!(config.state.backend, StateBackend::Memory);
    assert!(config.worker.enabled);
}

#[test]
fn unknown_key_gets_suggestion() {
    let toml = "[engine]\nsearch_timout_secs = 5\n";
    let errors = load_and_validate_str(toml).expect_err("typo must be rejected");
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "search_timout_secs");
            assert_eq!(suggestion.as_deref(), Some("search_timeout_secs"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_backend_is_invalid_value() {
    let errors = load_and_validate_str("[state]\nbackend = \"memcached\"\n")
        .expect_err("unsupported backend");
    assert!(
        matches!(&errors[0], ConfigError::InvalidValue { detail, .. } if detail.contains("memcached")),
        "got {errors:?}"
    );
}

#[test]
fn wrong_type_is_reported() {
    let errors = load_and_validate_str("[engine]\nsearch_timeout_secs = \"soon\"\n")
        .expect_err("string is not a number");
    assert!(matches!(&errors[0], ConfigError::InvalidType { key, .. } if key.contains("search_timeout_secs")));
}

#[test]
fn semantic_errors_after_parse() {
    let errors = load_and_validate_str("[engine]\nban_duration_secs = 0\n").expect_err("zero ban");
    assert!(matches!(&errors[0], ConfigError::Validation { message } if message.contains("ban_duration_secs")));
}

#[test]
#[serial_test::serial]
fn file_and_env_layers_merge() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[engine]\nsearch_timeout_secs = 45\ntopic_ttl_secs = 10").unwrap();

    figment::Jail::expect_with(|jail| {
        jail.set_env("PARLEY_ENGINE_TOPIC_TTL_SECS", "99");
        jail.set_env("PARLEY_STATE_BACKEND", "redis");
        let config = load_and_validate_path(file.path()).expect("valid");
        assert_eq!(config.engine.search_timeout_secs, 45);
        assert_eq!(config.engine.topic_ttl_secs, 99);
        assert_eq!(config.state.backend, StateBackend::Redis);
        Ok(())
    });
}
