// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! CRUD operations on the `mappings` table.
//!
//! Documents are stored as JSON text keyed by `(kind, key)`. Kinds are
//! written as their snake_case names so the table CHECK constraint matches
//! [`MappingKind`]'s serde form.

use std::str::FromStr;

use rusqlite::{OptionalExtension, params};
use topicbridge_core::BridgeError;

use crate::database::{Database, map_tr_err};
use crate::models::{MappingKind, StoredMapping};

/// Insert or replace the document under `(kind, key)`.
pub async fn upsert(
    db: &Database,
    kind: MappingKind,
    key: &str,
    data: &serde_json::Value,
) -> Result<(), BridgeError> {
    let kind = kind.to_string();
    let key = key.to_string();
    let data = serde_json::to_string(data)?;
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO mappings (kind, key, data, updated_at)
                 VALUES (?1, ?2, ?3, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 ON CONFLICT(kind, key) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at",
                params![kind, key, data],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch the document under `(kind, key)`.
pub async fn find(
    db: &Database,
    kind: MappingKind,
    key: &str,
) -> Result<Option<serde_json::Value>, BridgeError> {
    let kind = kind.to_string();
    let key = key.to_string();
    let raw = db
        .connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "SELECT data FROM mappings WHERE kind = ?1 AND key = ?2",
                params![kind, key],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    match raw {
        Some(text) => Ok(Some(serde_json::from_str(&text)?)),
        None => Ok(None),
    }
}

/// Delete the document under `(kind, key)`. Returns whether a row was removed.
pub async fn delete(db: &Database, kind: MappingKind, key: &str) -> Result<bool, BridgeError> {
    let kind = kind.to_string();
    let key = key.to_string();
    let removed = db
        .connection()
        .call(move |conn| -> Result<usize, rusqlite::Error> {
            conn.execute(
                "DELETE FROM mappings WHERE kind = ?1 AND key = ?2",
                params![kind, key],
            )
        })
        .await
        .map_err(map_tr_err)?;
    Ok(removed > 0)
}

/// Load every stored document ordered by kind then key.
pub async fn load_all(db: &Database) -> Result<Vec<StoredMapping>, BridgeError> {
    let rows = db
        .connection()
        .call(|conn| -> Result<Vec<(String, String, String)>, rusqlite::Error> {
            let mut stmt = conn.prepare("SELECT kind, key, data FROM mappings ORDER BY kind, key")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)?;

    rows.into_iter()
        .map(|(kind, key, data)| {
            let kind = MappingKind::from_str(&kind)
                .map_err(|_| BridgeError::Internal(format!("unknown mapping kind `{kind}`")))?;
            Ok(StoredMapping {
                kind,
                key,
                data: serde_json::from_str(&data)?,
            })
        })
        .collect()
}

/// Count stored documents per kind.
pub async fn count_by_kind(db: &Database) -> Result<Vec<(String, i64)>, BridgeError> {
    db.connection()
        .call(|conn| -> Result<Vec<(String, i64)>, rusqlite::Error> {
            let mut stmt =
                conn.prepare("SELECT kind, COUNT(*) FROM mappings GROUP BY kind ORDER BY kind")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
