// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable record store for the Parley matchmaking engine.
//!
//! Provides WAL-mode SQLite storage with embedded migrations and a
//! single-writer concurrency model via `tokio-rusqlite`, recording dialogs,
//! topics, reports, bans and last-seen times for audit. [`MemoryRecords`]
//! is the in-process stand-in used by tests.

pub mod adapter;
pub mod database;
pub mod memory;
pub mod migrations;
pub mod models;
pub mod queries;

pub use adapter::SqliteRecords;
pub use database::Database;
pub use memory::{MemoryRecords, RecordEvent};
pub use models::*;
