// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State store wrapper for exercising outage paths.
//!
//! `FlakyStore` forwards every command to an inner [`StateStore`] until
//! [`FlakyStore::set_failing`] is switched on; from then on every command
//! fails with a retryable store error before reaching the inner store, so
//! no partial effect is ever applied.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use parley_core::{AtomicUnit, Backend, BackendKind, HealthStatus, ParleyError, StateStore};

/// A [`StateStore`] that fails on demand.
pub struct FlakyStore {
    inner: Arc<dyn StateStore>,
    failing: AtomicBool,
    refused: AtomicU64,
}

impl FlakyStore {
    pub fn new(inner: Arc<dyn StateStore>) -> Self {
        Self {
            inner,
            failing: AtomicBool::new(false),
            refused: AtomicU64::new(0),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of commands refused so far.
    pub fn refused(&self) -> u64 {
        self.refused.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ParleyError> {
        if self.failing.load(Ordering::SeqCst) {
            self.refused.fetch_add(1, Ordering::SeqCst);
            return Err(ParleyError::store(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "state store unavailable",
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Backend for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn kind(&self) -> BackendKind {
        BackendKind::StateStore
    }

    async fn health_check(&self) -> Result<HealthStatus, ParleyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Ok(HealthStatus::Unhealthy("failing".to_string()));
        }
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), ParleyError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, ParleyError> {
        self.check()?;
        self.inner.get_many(keys).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), ParleyError> {
        self.check()?;
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, ParleyError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, ParleyError> {
        self.check()?;
        self.inner.exists(key).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ParleyError> {
        self.check()?;
        self.inner.expire(key, ttl).await
    }

    async fn list_push_back(&self, key: &str, value: &str) -> Result<usize, ParleyError> {
        self.check()?;
        self.inner.list_push_back(key, value).await
    }

    async fn list_push_front(&self, key: &str, value: &str) -> Result<usize, ParleyError> {
        self.check()?;
        self.inner.list_push_front(key, value).await
    }

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, ParleyError> {
        self.check()?;
        self.inner.list_pop_front(key).await
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, ParleyError> {
        self.check()?;
        self.inner.list_remove(key, value).await
    }

    async fn list_range(&self, key: &str) -> Result<Vec<String>, ParleyError> {
        self.check()?;
        self.inner.list_range(key).await
    }

    async fn list_len(&self, key: &str) -> Result<usize, ParleyError> {
        self.check()?;
        self.inner.list_len(key).await
    }

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), ParleyError> {
        self.check()?;
        self.inner.hash_set(key, fields).await
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, ParleyError> {
        self.check()?;
        self.inner.hash_get_all(key).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, ParleyError> {
        self.check()?;
        self.inner.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, ParleyError> {
        self.check()?;
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, ParleyError> {
        self.check()?;
        self.inner.set_members(key).await
    }

    async fn execute(&self, unit: AtomicUnit) -> Result<bool, ParleyError> {
        self.check()?;
        self.inner.execute(unit).await
    }

    async fn purge_expired(&self) -> Result<usize, ParleyError> {
        self.check()?;
        self.inner.purge_expired().await
    }
}
