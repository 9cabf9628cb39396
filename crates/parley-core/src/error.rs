// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Parley matchmaking engine.

use thiserror::Error;

/// The primary error type used across backend traits and engine operations.
///
/// Precondition failures ("nothing to do") and stale-entity races are not
/// errors; they are reported through the outcome types of each operation.
#[derive(Debug, Error)]
pub enum ParleyError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// The fast shared state store is unavailable or rejected a command.
    #[error("state store error: {source}")]
    Store {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Durable record store errors (database connection, query failure).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A key holds a value of a different shape than the operation expects.
    #[error("wrong value type at key {key}")]
    WrongType { key: String },

    /// A stored record could not be decoded.
    #[error("corrupt record at {key}: {detail}")]
    Corrupt { key: String, detail: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    /// Wraps a fast-store failure.
    pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ParleyError::Store {
            source: Box::new(err),
        }
    }

    /// Wraps a durable-store failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        ParleyError::Storage {
            source: Box::new(err),
        }
    }

    /// Whether the caller may retry the operation.
    ///
    /// A retryable error guarantees that no partial effect was applied.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ParleyError::Store { .. } | ParleyError::Storage { .. } | ParleyError::Timeout { .. }
        )
    }
}
