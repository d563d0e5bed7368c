// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the topicbridge relay.
//!
//! This crate provides the transport and storage traits, the error type, the
//! mapping documents, and the neutral event types shared by every crate in the
//! workspace. Transport adapters implement the traits defined here.

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use clock::{Clock, SystemClock};
pub use error::BridgeError;
pub use types::{AdapterType, HealthStatus, MappingKind, Network};

pub use traits::{
    MappingStore, PluginAdapter, PrimaryTransport, SecondaryTransport, StoredMapping,
};
