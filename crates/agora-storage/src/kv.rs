// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed [`KeyValueStore`].

use agora_core::{AgoraError, KeyValueStore, KvWrite};
use async_trait::async_trait;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

/// Client state stored in the `client_state` table.
#[derive(Clone)]
pub struct SqliteKvStore {
    db: Database,
}

impl SqliteKvStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl KeyValueStore for SqliteKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AgoraError> {
        let key = key.to_string();
        self.db
            .connection()
            .call(move |conn| -> Result<Option<String>, rusqlite::Error> {
                conn.query_row(
                    "SELECT value FROM client_state WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn apply(&self, writes: Vec<KvWrite>) -> Result<(), AgoraError> {
        if writes.is_empty() {
            return Ok(());
        }
        let now = chrono::Utc::now().timestamp_millis();
        self.db
            .connection()
            .call(move |conn| -> Result<(), rusqlite::Error> {
                let tx = conn.transaction()?;
                for write in writes {
                    match write {
                        KvWrite::Put { key, value } => {
                            tx.execute(
                                "INSERT INTO client_state (key, value, updated_at)
                                 VALUES (?1, ?2, ?3)
                                 ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                                     updated_at = excluded.updated_at",
                                params![key, value, now],
                            )?;
                        }
                        KvWrite::Remove { key } => {
                            tx.execute("DELETE FROM client_state WHERE key = ?1", params![key])?;
                        }
                    }
                }
                tx.commit()
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteKvStore {
        SqliteKvStore::new(Database::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn put_then_get() {
        let kv = store().await;
        kv.put("prefs.filter", "{\"category\":\"all\"}").await.unwrap();
        assert_eq!(
            kv.get("prefs.filter").await.unwrap().as_deref(),
            Some("{\"category\":\"all\"}")
        );
    }

    #[tokio::test]
    async fn missing_key_is_none() {
        let kv = store().await;
        assert_eq!(kv.get("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn batch_applies_puts_and_removes_together() {
        let kv = store().await;
        kv.put("session.token", "old").await.unwrap();
        kv.apply(vec![
            KvWrite::remove("session.token"),
            KvWrite::put("session.user", "{}"),
        ])
        .await
        .unwrap();
        assert_eq!(kv.get("session.token").await.unwrap(), None);
        assert_eq!(kv.get("session.user").await.unwrap().as_deref(), Some("{}"));
    }

    #[tokio::test]
    async fn put_overwrites() {
        let kv = store().await;
        kv.put("composer.draft", "a").await.unwrap();
        kv.put("composer.draft", "b").await.unwrap();
        assert_eq!(kv.get("composer.draft").await.unwrap().as_deref(), Some("b"));
    }
}
