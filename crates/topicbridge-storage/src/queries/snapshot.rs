// SPDX-FileCopyrightText: 2026 Topicbridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named aggregate snapshot documents.

use rusqlite::{OptionalExtension, params};
use topicbridge_core::BridgeError;

use crate::database::{Database, map_tr_err};

/// Replace the snapshot stored under `name`.
pub async fn save(db: &Database, name: &str, data: &serde_json::Value) -> Result<(), BridgeError> {
    let name = name.to_string();
    let data = serde_json::to_string(data)?;
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> {
            conn.execute(
                "INSERT INTO snapshots (name, data, updated_at)
                 VALUES (?1, ?2, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 ON CONFLICT(name) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at",
                params![name, data],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Load the snapshot stored under `name`.
pub async fn load(db: &Database, name: &str) -> Result<Option<serde_json::Value>, BridgeError> {
    let name = name.to_string();
    let raw = db
        .connection()
        .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
            conn.query_row(
                "SELECT data FROM snapshots WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;

    raw.map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(BridgeError::from)
}
