// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection lifecycle: PRAGMA setup, migrations, WAL checkpoint on close.
//!
//! Every statement runs on tokio-rusqlite's background thread. Do not open a
//! second connection for writes.

use std::path::Path;

use agora_config::StorageConfig;
use agora_core::AgoraError;
use tracing::{debug, info};

/// Handle to the client state database.
#[derive(Clone)]
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn open(path: impl AsRef<Path>, wal_mode: bool) -> Result<Self, AgoraError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AgoraError::Storage(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }

        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| AgoraError::Storage(format!("cannot open {}: {e}", path.display())))?;
        let db = Self { conn };
        db.prepare(wal_mode).await?;
        info!(path = %path.display(), "client state database ready");
        Ok(db)
    }

    pub async fn open_with_config(config: &StorageConfig) -> Result<Self, AgoraError> {
        Self::open(&config.database_path, config.wal_mode).await
    }

    /// In-memory database, migrated. Used by tests and `--ephemeral` runs.
    pub async fn open_in_memory() -> Result<Self, AgoraError> {
        let conn = tokio_rusqlite::Connection::open_in_memory()
            .await
            .map_err(|e| AgoraError::Storage(format!("cannot open in-memory database: {e}")))?;
        let db = Self { conn };
        db.prepare(false).await?;
        Ok(db)
    }

    async fn prepare(&self, wal_mode: bool) -> Result<(), AgoraError> {
        // Outer error is SQLite, inner is the migration runner.
        self.conn
            .call(
                move |conn| -> Result<Result<(), AgoraError>, rusqlite::Error> {
                    if wal_mode {
                        conn.execute_batch(
                            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;",
                        )?;
                    }
                    conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
                    Ok(crate::migrations::run_migrations(conn))
                },
            )
            .await
            .map_err(map_tr_err)?
    }

    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL so the main file is self-contained.
    pub async fn close(&self) -> Result<(), AgoraError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
            })
            .await
            .map_err(map_tr_err)?;
        debug!("client state database checkpointed");
        Ok(())
    }
}

/// Convert a tokio-rusqlite error into `AgoraError::Storage`.
pub(crate) fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> AgoraError {
    AgoraError::Storage(e.to_string())
}

