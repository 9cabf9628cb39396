// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./parley.toml` > `~/.config/parley/parley.toml` > `/etc/parley/parley.toml`
//! with environment variable overrides via the `PARLEY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ParleyConfig;

/// Top-level sections, used to map `PARLEY_<SECTION>_<KEY>` variables.
const SECTIONS: &[&str] = &["service", "engine", "state", "storage", "worker", "metrics"];

/// Config files in merge order (later overrides earlier).
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/parley/parley.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("parley/parley.toml"));
    }
    paths.push(PathBuf::from("parley.toml"));
    paths
}

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/parley/parley.toml` (system-wide)
/// 3. `~/.config/parley/parley.toml` (user XDG config)
/// 4. `./parley.toml` (local directory)
/// 5. `PARLEY_*` environment variables
pub fn load_config() -> Result<ParleyConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ParleyConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParleyConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// The Figment used by [`load_config`], before extraction.
pub fn build_figment() -> Figment {
    config_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(ParleyConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Environment provider mapping `PARLEY_ENGINE_SEARCH_TIMEOUT_SECS` to
/// `engine.search_timeout_secs`.
///
/// Only the first underscore after a known section name becomes a dot, so
/// key names keep their own underscores.
fn env_provider() -> Env {
    Env::prefixed("PARLEY_").map(|key| map_env_key(key.as_str()).into())
}

fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_split_at_section_only() {
        assert_eq!(
            map_env_key("engine_search_timeout_secs"),
            "engine.search_timeout_secs"
        );
        assert_eq!(map_env_key("state_redis_url"), "state.redis_url");
        assert_eq!(map_env_key("unknown_key"), "unknown_key");
    }

    #[test]
    fn local_file_is_merged_last() {
        let paths = config_paths();
        assert_eq!(paths.first().unwrap(), Path::new("/etc/parley/parley.toml"));
        assert_eq!(paths.last().unwrap(), Path::new("parley.toml"));
    }
}
