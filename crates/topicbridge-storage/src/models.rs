// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for stored documents.
//!
//! The canonical types live in `topicbridge-core::types` so they can cross
//! the [`MappingStore`](topicbridge_core::MappingStore) trait boundary. This
//! module re-exports them for convenience within the storage crate.

pub use topicbridge_core::types::{
    ChatMapping, ContactMapping, IdentityMapping, MappingKind, MessagePair,
};
pub use topicbridge_core::StoredMapping;

/// Name of the aggregate snapshot document.
pub const MAPPINGS_SNAPSHOT: &str = "mappings";
