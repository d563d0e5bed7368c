// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the MappingStore trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use topicbridge_config::model::StorageConfig;
use topicbridge_core::types::MappingKind;
use topicbridge_core::{
    AdapterType, BridgeError, HealthStatus, MappingStore, PluginAdapter, StoredMapping,
};

use crate::database::Database;
use crate::models::MAPPINGS_SNAPSHOT;
use crate::queries;

/// SQLite-backed mapping store.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is lazily opened on the first call to
/// [`MappingStore::initialize`].
pub struct SqliteMappingStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteMappingStore {
    /// Create a store for the configured database path without opening it.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, BridgeError> {
        self.db.get().ok_or_else(|| BridgeError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    /// Document counts per kind, used by the `status` command.
    pub async fn counts(&self) -> Result<Vec<(String, i64)>, BridgeError> {
        queries::mappings::count_by_kind(self.db()?).await
    }
}

#[async_trait]
impl PluginAdapter for SqliteMappingStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, BridgeError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), BridgeError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl MappingStore for SqliteMappingStore {
    async fn initialize(&self) -> Result<(), BridgeError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| BridgeError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite mapping store initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), BridgeError> {
        self.db()?.close().await?;
        debug!("SQLite mapping store closed");
        Ok(())
    }

    async fn upsert(
        &self,
        kind: MappingKind,
        key: &str,
        data: &serde_json::Value,
    ) -> Result<(), BridgeError> {
        queries::mappings::upsert(self.db()?, kind, key, data).await
    }

    async fn find(
        &self,
        kind: MappingKind,
        key: &str,
    ) -> Result<Option<serde_json::Value>, BridgeError> {
        queries::mappings::find(self.db()?, kind, key).await
    }

    async fn delete(&self, kind: MappingKind, key: &str) -> Result<(), BridgeError> {
        queries::mappings::delete(self.db()?, kind, key).await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<StoredMapping>, BridgeError> {
        queries::mappings::load_all(self.db()?).await
    }

    async fn save_snapshot(&self, snapshot: &serde_json::Value) -> Result<(), BridgeError> {
        queries::snapshot::save(self.db()?, MAPPINGS_SNAPSHOT, snapshot).await
    }

    async fn load_snapshot(&self) -> Result<Option<serde_json::Value>, BridgeError> {
        queries::snapshot::load(self.db()?, MAPPINGS_SNAPSHOT).await
    }
}
