// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client state survives closing and reopening the database file.

use agora_config::StorageConfig;
use agora_core::KeyValueStore;
use agora_storage::{Database, SqliteKvStore};

#[tokio::test]
async fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = StorageConfig {
        database_path: dir.path().join("nested/agora.db").display().to_string(),
        wal_mode: true,
    };

    {
        let db = Database::open_with_config(&config).await.unwrap();
        let kv = SqliteKvStore::new(db.clone());
        kv.put("session.token", "tok-1").await.unwrap();
        kv.put("bookmarks", "[\"p1\",\"p2\"]").await.unwrap();
        db.close().await.unwrap();
    }

    let db = Database::open_with_config(&config).await.unwrap();
    let kv = SqliteKvStore::new(db);
    assert_eq!(
        kv.get("session.token").await.unwrap().as_deref(),
        Some("tok-1")
    );
    assert_eq!(
        kv.get("bookmarks").await.unwrap().as_deref(),
        Some("[\"p1\",\"p2\"]")
    );
}

#[tokio::test]
async fn reopening_does_not_rerun_migrations() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agora.db");
    Database::open(&path, false).await.unwrap();
    Database::open(&path, false).await.unwrap();
}
