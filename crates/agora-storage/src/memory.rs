// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory [`KeyValueStore`] for tests and ephemeral sessions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use agora_core::{AgoraError, KeyValueStore, KvWrite};
use async_trait::async_trait;

#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `apply` fail with a storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AgoraError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    async fn apply(&self, writes: Vec<KvWrite>) -> Result<(), AgoraError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AgoraError::Storage("write rejected".into()));
        }
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        for write in writes {
            match write {
                KvWrite::Put { key, value } => {
                    entries.insert(key, value);
                }
                KvWrite::Remove { key } => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failed_writes_leave_entries_untouched() {
        let kv = MemoryKvStore::new();
        kv.put("bookmarks", "[]").await.unwrap();
        kv.set_fail_writes(true);
        assert!(kv.put("bookmarks", "[\"p1\"]").await.is_err());
        assert_eq!(kv.get("bookmarks").await.unwrap().as_deref(), Some("[]"));
    }
}
