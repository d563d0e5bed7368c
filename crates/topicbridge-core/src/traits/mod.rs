// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the two transports and the mapping store.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod primary;
pub mod secondary;
pub mod storage;

pub use adapter::PluginAdapter;
pub use primary::PrimaryTransport;
pub use secondary::SecondaryTransport;
pub use storage::{find_document, upsert_document, MappingStore, StoredMapping};
