// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable client key-value storage.

use async_trait::async_trait;

use crate::error::AgoraError;

/// A single write in a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KvWrite {
    Put { key: String, value: String },
    Remove { key: String },
}

impl KvWrite {
    pub fn put(key: &str, value: impl Into<String>) -> Self {
        KvWrite::Put {
            key: key.to_string(),
            value: value.into(),
        }
    }

    pub fn remove(key: &str) -> Self {
        KvWrite::Remove {
            key: key.to_string(),
        }
    }
}

/// Persistent string key-value store for session, bookmark, and preference state.
///
/// Values are read once at startup and written on every change.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Reads the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, AgoraError>;

    /// Applies every write in `batch` atomically: all of them land or none do.
    async fn apply(&self, batch: Vec<KvWrite>) -> Result<(), AgoraError>;

    /// Stores `value` under `key`.
    async fn put(&self, key: &str, value: &str) -> Result<(), AgoraError> {
        self.apply(vec![KvWrite::put(key, value)]).await
    }

    /// Deletes `key`. Deleting a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), AgoraError> {
        self.apply(vec![KvWrite::remove(key)]).await
    }
}
