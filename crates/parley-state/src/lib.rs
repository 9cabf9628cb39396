// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fast shared state store backends.
//!
//! [`MemoryStore`] keeps live state in-process and is the default.
//! With the `redis` feature, [`RedisStore`] shares live state between any
//! number of engine processes through one Redis server.

use std::sync::Arc;

use tracing::info;

use parley_config::model::{StateBackend, StateConfig};
use parley_core::{ParleyError, StateStore};

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

/// Construct the state store selected by `config`.
pub async fn connect(config: &StateConfig) -> Result<Arc<dyn StateStore>, ParleyError> {
    match config.backend {
        StateBackend::Memory => {
            info!("using in-memory state store");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "redis")]
        StateBackend::Redis => {
            let store = RedisStore::connect(&config.redis_url).await?;
            info!("connected to redis state store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        StateBackend::Redis => Err(ParleyError::Config(
            "state.backend = \"redis\" requires building with the `redis` feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_is_default() {
        let store = connect(&StateConfig::default()).await.unwrap();
        assert_eq!(store.name(), "memory");
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn redis_without_feature_is_config_error() {
        let config = StateConfig {
            backend: StateBackend::Redis,
            ..StateConfig::default()
        };
        let err = connect(&config).await.err().unwrap();
        assert!(matches!(err, ParleyError::Config(_)));
    }
}
