// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait that every transport and store implements.

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for all topicbridge adapters.
///
/// Provides identity, lifecycle, and health check capabilities shared by the
/// two transports and the mapping store.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the role this adapter plays in the bridge.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, BridgeError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), BridgeError>;
}
