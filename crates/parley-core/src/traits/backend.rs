// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base trait shared by every storage backend.

use async_trait::async_trait;

use crate::error::ParleyError;
use crate::types::{BackendKind, HealthStatus};

/// Identity, health and lifecycle of a backend instance.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Returns the human-readable name of this backend instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this backend.
    fn version(&self) -> semver::Version;

    /// Returns the role this backend plays.
    fn kind(&self) -> BackendKind;

    /// Performs a health check and returns the backend's current status.
    async fn health_check(&self) -> Result<HealthStatus, ParleyError>;

    /// Gracefully shuts down the backend, releasing any held resources.
    async fn shutdown(&self) -> Result<(), ParleyError>;
}
