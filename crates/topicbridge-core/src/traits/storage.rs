// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mapping store trait for persistence backends (SQLite, in-memory).

use async_trait::async_trait;

use crate::error::BridgeError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Document, MappingKind};

/// One persisted document as returned by [`MappingStore::load_all`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMapping {
    pub kind: MappingKind,
    pub key: String,
    pub data: serde_json::Value,
}

/// Generic key-document store holding every mapping kind.
///
/// Upserts are idempotent: writing the same `(kind, key)` twice overwrites.
#[async_trait]
pub trait MappingStore: PluginAdapter {
    /// Initializes the backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), BridgeError>;

    /// Flushes pending writes and releases the backend.
    async fn close(&self) -> Result<(), BridgeError>;

    /// Inserts or replaces the document stored under `(kind, key)`.
    async fn upsert(
        &self,
        kind: MappingKind,
        key: &str,
        data: &serde_json::Value,
    ) -> Result<(), BridgeError>;

    /// Returns the document stored under `(kind, key)`, if any.
    async fn find(
        &self,
        kind: MappingKind,
        key: &str,
    ) -> Result<Option<serde_json::Value>, BridgeError>;

    /// Removes the document stored under `(kind, key)`. Missing keys are not an error.
    async fn delete(&self, kind: MappingKind, key: &str) -> Result<(), BridgeError>;

    /// Returns every stored document, used to rebuild in-memory indices at startup.
    async fn load_all(&self) -> Result<Vec<StoredMapping>, BridgeError>;

    /// Replaces the aggregate mappings snapshot document.
    async fn save_snapshot(&self, snapshot: &serde_json::Value) -> Result<(), BridgeError>;

    /// Returns the aggregate mappings snapshot document, if one was saved.
    async fn load_snapshot(&self) -> Result<Option<serde_json::Value>, BridgeError>;
}

/// Serializes a typed document and upserts it under its own kind and key.
pub async fn upsert_document<D: Document>(
    store: &dyn MappingStore,
    doc: &D,
) -> Result<(), BridgeError> {
    let data = serde_json::to_value(doc)?;
    store.upsert(D::KIND, &doc.key(), &data).await
}

/// Looks up and deserializes a typed document by key.
pub async fn find_document<D: Document>(
    store: &dyn MappingStore,
    key: &str,
) -> Result<Option<D>, BridgeError> {
    match store.find(D::KIND, key).await? {
        Some(data) => Ok(Some(serde_json::from_value(data)?)),
        None => Ok(None),
    }
}
