// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend trait definitions.
//!
//! Both stores extend the [`Backend`] base trait and use `#[async_trait]`
//! so the engine can hold them as trait objects.

pub mod backend;
pub mod records;
pub mod state;

pub use backend::Backend;
pub use records::RecordStore;
pub use state::StateStore;
