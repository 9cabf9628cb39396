// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Parley integration tests.
//!
//! Provides a harness that assembles a complete engine over in-process
//! backends, plus a state store wrapper that can be made to fail on demand.
//!
//! # Components
//!
//! - [`TestHarness`] - Engine with in-memory state and recorded writes
//! - [`FlakyStore`] - State store whose commands fail while toggled

pub mod flaky_store;
pub mod harness;

pub use flaky_store::FlakyStore;
pub use harness::{TestHarness, TestHarnessBuilder};
