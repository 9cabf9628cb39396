// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parley matchmaking engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Top-level Parley configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParleyConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Matchmaking and lifecycle timings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Fast shared state store selection.
    #[serde(default)]
    pub state: StateConfig,

    /// Durable record store settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Background expiry worker.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Prometheus exporter.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name shown in logs and `parley status`.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "parley".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Matchmaking, dialog and topic lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// How long a search may wait for a partner before reverting to idle.
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,

    /// Interval between matching attempts of a running search.
    #[serde(default = "default_search_poll_interval_ms")]
    pub search_poll_interval_ms: u64,

    /// Dialog inactivity window, refreshed on every forwarded message.
    #[serde(default = "default_dialog_inactivity_secs")]
    pub dialog_inactivity_secs: u64,

    /// How long an ended dialog record stays readable in the state store.
    #[serde(default = "default_dialog_retention_secs")]
    pub dialog_retention_secs: u64,

    /// Topic lifetime.
    #[serde(default = "default_topic_ttl_secs")]
    pub topic_ttl_secs: u64,

    /// Maximum topic text length in characters.
    #[serde(default = "default_topic_max_chars")]
    pub topic_max_chars: usize,

    /// How long a user's browse position is remembered.
    #[serde(default = "default_browse_cursor_ttl_secs")]
    pub browse_cursor_ttl_secs: u64,

    /// Ban length applied to a reported user.
    #[serde(default = "default_ban_duration_secs")]
    pub ban_duration_secs: u64,

    /// Cooldown window for throttled actions.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Capacity of the engine event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl EngineConfig {
    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }

    pub fn search_poll_interval(&self) -> Duration {
        Duration::from_millis(self.search_poll_interval_ms)
    }

    pub fn dialog_inactivity(&self) -> Duration {
        Duration::from_secs(self.dialog_inactivity_secs)
    }

    pub fn dialog_retention(&self) -> Duration {
        Duration::from_secs(self.dialog_retention_secs)
    }

    pub fn topic_ttl(&self) -> Duration {
        Duration::from_secs(self.topic_ttl_secs)
    }

    pub fn browse_cursor_ttl(&self) -> Duration {
        Duration::from_secs(self.browse_cursor_ttl_secs)
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_secs)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_timeout_secs: default_search_timeout_secs(),
            search_poll_interval_ms: default_search_poll_interval_ms(),
            dialog_inactivity_secs: default_dialog_inactivity_secs(),
            dialog_retention_secs: default_dialog_retention_secs(),
            topic_ttl_secs: default_topic_ttl_secs(),
            topic_max_chars: default_topic_max_chars(),
            browse_cursor_ttl_secs: default_browse_cursor_ttl_secs(),
            ban_duration_secs: default_ban_duration_secs(),
            cooldown_secs: default_cooldown_secs(),
            event_buffer: default_event_buffer(),
        }
    }
}

fn default_search_timeout_secs() -> u64 {
    20
}

fn default_search_poll_interval_ms() -> u64 {
    1000
}

fn default_dialog_inactivity_secs() -> u64 {
    1800
}

fn default_dialog_retention_secs() -> u64 {
    60
}

fn default_topic_ttl_secs() -> u64 {
    3600
}

fn default_topic_max_chars() -> usize {
    200
}

fn default_browse_cursor_ttl_secs() -> u64 {
    900
}

fn default_ban_duration_secs() -> u64 {
    3600
}

fn default_cooldown_secs() -> u64 {
    1
}

fn default_event_buffer() -> usize {
    256
}

/// Which fast shared state store backend to use.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StateBackend {
    /// In-process store; state is lost on restart and not shared.
    #[default]
    Memory,
    /// Shared Redis server.
    Redis,
}

/// Fast shared state store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StateConfig {
    #[serde(default)]
    pub backend: StateBackend,

    /// Connection URL used when `backend = "redis"`.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: StateBackend::default(),
            redis_url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Durable record store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_local_dir()
        .map(|d| d.join("parley").join("parley.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parley.db"))
        .display()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// Background expiry worker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Run the expiry sweeper in `parley serve`.
    #[serde(default = "default_worker_enabled")]
    pub enabled: bool,

    /// Interval between expiry sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl WorkerConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: default_worker_enabled(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_worker_enabled() -> bool {
    true
}

fn default_sweep_interval_secs() -> u64 {
    30
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Listen address of the `/metrics` endpoint.
    #[serde(default = "default_metrics_bind_address")]
    pub bind_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_metrics_bind_address(),
        }
    }
}

fn default_metrics_bind_address() -> String {
    "127.0.0.1:9464".to_string()
}
