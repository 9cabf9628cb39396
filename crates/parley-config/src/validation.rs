// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the constraints serde cannot express: positive durations, timer
//! ordering, non-empty paths and parseable addresses.

use crate::diagnostic::ConfigError;
use crate::model::{ParleyConfig, StateBackend};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration, collecting every failure.
pub fn validate_config(config: &ParleyConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    let engine = &config.engine;
    for (name, value) in [
        ("engine.search_timeout_secs", engine.search_timeout_secs),
        ("engine.search_poll_interval_ms", engine.search_poll_interval_ms),
        ("engine.dialog_inactivity_secs", engine.dialog_inactivity_secs),
        ("engine.dialog_retention_secs", engine.dialog_retention_secs),
        ("engine.topic_ttl_secs", engine.topic_ttl_secs),
        ("engine.browse_cursor_ttl_secs", engine.browse_cursor_ttl_secs),
        ("engine.ban_duration_secs", engine.ban_duration_secs),
        ("engine.cooldown_secs", engine.cooldown_secs),
        ("worker.sweep_interval_secs", config.worker.sweep_interval_secs),
    ] {
        if value == 0 {
            fail(format!("{name} must be greater than zero"));
        }
    }

    if engine.search_poll_interval() > engine.search_timeout() {
        fail(format!(
            "engine.search_poll_interval_ms ({}) must not exceed engine.search_timeout_secs ({}s)",
            engine.search_poll_interval_ms, engine.search_timeout_secs
        ));
    }

    if engine.topic_max_chars == 0 {
        fail("engine.topic_max_chars must be greater than zero".to_string());
    }

    if engine.event_buffer == 0 {
        fail("engine.event_buffer must be greater than zero".to_string());
    }

    if config.state.backend == StateBackend::Redis && config.state.redis_url.trim().is_empty() {
        fail("state.redis_url must not be empty when state.backend = \"redis\"".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    if config.metrics.enabled
        && config
            .metrics
            .bind_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        fail(format!(
            "metrics.bind_address `{}` is not a valid socket address",
            config.metrics.bind_address
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
