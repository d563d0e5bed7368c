// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory `MappingStore` with write counting and failure injection.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use topicbridge_core::types::{AdapterType, HealthStatus, MappingKind};
use topicbridge_core::{BridgeError, MappingStore, PluginAdapter, StoredMapping};

/// A mapping store backed by a `HashMap`.
#[derive(Default)]
pub struct InMemoryStore {
    docs: Mutex<HashMap<(MappingKind, String), serde_json::Value>>,
    snapshot: Mutex<Option<serde_json::Value>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful upserts, deletes, and snapshot saves.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent write fail with a storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of documents of one kind.
    pub fn count(&self, kind: MappingKind) -> usize {
        self.docs
            .lock()
            .unwrap()
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Synchronous lookup for assertions.
    pub fn get(&self, kind: MappingKind, key: &str) -> Option<serde_json::Value> {
        self.docs
            .lock()
            .unwrap()
            .get(&(kind, key.to_string()))
            .cloned()
    }

    fn check_writable(&self) -> Result<(), BridgeError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BridgeError::storage("injected write failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl PluginAdapter for InMemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        Ok(())
    }
}

#[async_trait]
impl MappingStore for InMemoryStore {
    async fn initialize(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), BridgeError> {
        Ok(())
    }

    async fn upsert(
        &self,
        kind: MappingKind,
        key: &str,
        data: &serde_json::Value,
    ) -> Result<(), BridgeError> {
        self.check_writable()?;
        self.docs
            .lock()
            .unwrap()
            .insert((kind, key.to_string()), data.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find(
        &self,
        kind: MappingKind,
        key: &str,
    ) -> Result<Option<serde_json::Value>, BridgeError> {
        Ok(self.get(kind, key))
    }

    async fn delete(&self, kind: MappingKind, key: &str) -> Result<(), BridgeError> {
        self.check_writable()?;
        self.docs.lock().unwrap().remove(&(kind, key.to_string()));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<StoredMapping>, BridgeError> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .map(|((kind, key), data)| StoredMapping {
                kind: *kind,
                key: key.clone(),
                data: data.clone(),
            })
            .collect())
    }

    async fn save_snapshot(&self, snapshot: &serde_json::Value) -> Result<(), BridgeError> {
        self.check_writable()?;
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn load_snapshot(&self) -> Result<Option<serde_json::Value>, BridgeError> {
        Ok(self.snapshot.lock().unwrap().clone())
    }
}
