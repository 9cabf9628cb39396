// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fast shared state store: the system of record for live state.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::atomic::AtomicUnit;
use crate::error::ParleyError;
use crate::traits::backend::Backend;

/// Low-latency key/value store with expiring keys, lists, hashes, sets and
/// all-or-nothing [`AtomicUnit`] execution.
///
/// A key's expiry is authoritative: once it passes, every read behaves as if
/// the key never existed. Any `Err` means the operation had no effect.
#[async_trait]
pub trait StateStore: Backend {
    async fn get(&self, key: &str) -> Result<Option<String>, ParleyError>;

    /// Reads several string keys as one consistent snapshot.
    async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>, ParleyError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), ParleyError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, ParleyError>;

    async fn exists(&self, key: &str) -> Result<bool, ParleyError>;

    /// Returns false when the key does not exist.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, ParleyError>;

    /// Appends to the tail; returns the new length.
    async fn list_push_back(&self, key: &str, value: &str) -> Result<usize, ParleyError>;

    /// Prepends to the head; returns the new length.
    async fn list_push_front(&self, key: &str, value: &str) -> Result<usize, ParleyError>;

    async fn list_pop_front(&self, key: &str) -> Result<Option<String>, ParleyError>;

    /// Removes every occurrence of `value`; returns how many were removed.
    async fn list_remove(&self, key: &str, value: &str) -> Result<usize, ParleyError>;

    /// Whole list, head first.
    async fn list_range(&self, key: &str) -> Result<Vec<String>, ParleyError>;

    async fn list_len(&self, key: &str) -> Result<usize, ParleyError>;

    async fn hash_set(&self, key: &str, fields: &[(String, String)]) -> Result<(), ParleyError>;

    /// Empty when the hash does not exist.
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, ParleyError>;

    /// Returns whether the member was newly added.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, ParleyError>;

    /// Returns whether the member was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, ParleyError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, ParleyError>;

    /// Applies `unit` if every guard holds. Returns whether it was applied.
    async fn execute(&self, unit: AtomicUnit) -> Result<bool, ParleyError>;

    /// Reclaims keys whose expiry has passed; returns how many were dropped.
    ///
    /// Backends that evict expired keys on their own keep the default.
    async fn purge_expired(&self) -> Result<usize, ParleyError> {
        Ok(0)
    }
}
