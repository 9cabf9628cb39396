// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Parley matchmaking engine.
//!
//! This crate provides the shared vocabulary of the workspace: the error
//! type, user/dialog/topic records, the live-state key layout, the
//! [`AtomicUnit`] model, and the two backend traits ([`StateStore`] for live
//! state, [`RecordStore`] for the durable audit trail).

pub mod atomic;
pub mod error;
pub mod keys;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use atomic::{AtomicUnit, Guard, Op};
pub use error::ParleyError;
pub use traits::{Backend, RecordStore, StateStore};
pub use types::{
    BackendKind, Dialog, DialogId, EndReason, HealthStatus, ReportRecord, Topic, TopicId,
    TopicRetirement, UserId, UserRecord, UserState,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        let store = ParleyError::store(std::io::Error::other("down"));
        let storage = ParleyError::storage(std::io::Error::other("locked"));
        let timeout = ParleyError::Timeout {
            duration: std::time::Duration::from_secs(1),
        };
        assert!(store.is_retryable());
        assert!(storage.is_retryable());
        assert!(timeout.is_retryable());

        assert!(!ParleyError::Config("bad".into()).is_retryable());
        assert!(!ParleyError::WrongType { key: "k".into() }.is_retryable());
        assert!(!ParleyError::Internal("x".into()).is_retryable());
    }

    #[test]
    fn backend_kind_round_trips() {
        use std::str::FromStr;
        for kind in [BackendKind::StateStore, BackendKind::RecordStore] {
            assert_eq!(BackendKind::from_str(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn store_traits_are_object_safe() {
        fn _state(_: &dyn StateStore) {}
        fn _records(_: &dyn RecordStore) {}
    }
}
