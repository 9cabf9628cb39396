// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table.

pub mod dialogs;
pub mod reports;
pub mod topics;
pub mod users;
