// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-local state: the bookmark set, the last-used filter, and the
//! composer draft. Read once at startup, written on every change.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use agora_core::types::PostDraft;
use agora_core::{AgoraError, FilterKey, KeyValueStore, PostId, PostSummary};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const BOOKMARKS_KEY: &str = "bookmarks";
pub const FILTER_KEY: &str = "prefs.filter";
pub const DRAFT_KEY: &str = "composer.draft";

/// Lightweight copy of a bookmarked post, kept so bookmarks can be listed
/// without the post being loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkEntry {
    pub title: String,
    pub category: String,
    pub author_display: String,
    pub saved_at: i64,
}

impl BookmarkEntry {
    pub fn of(post: &PostSummary) -> Self {
        Self {
            title: post.title.clone(),
            category: post.category.clone(),
            author_display: post.author_display.clone(),
            saved_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// The user's bookmark set. Never invalidated by server events.
pub struct Bookmarks {
    store: Arc<dyn KeyValueStore>,
    entries: Mutex<HashMap<PostId, BookmarkEntry>>,
}

impl Bookmarks {
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, AgoraError> {
        let entries = match store.get(BOOKMARKS_KEY).await? {
            Some(raw) => match serde_json::from_str::<HashMap<String, BookmarkEntry>>(&raw) {
                Ok(map) => map.into_iter().map(|(k, v)| (PostId(k), v)).collect(),
                Err(e) => {
                    warn!(error = %e, "persisted bookmarks are corrupt, starting empty");
                    HashMap::new()
                }
            },
            None => HashMap::new(),
        };
        debug!(count = entries.len(), "bookmarks restored");
        Ok(Self {
            store,
            entries: Mutex::new(entries),
        })
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<PostId, BookmarkEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, id: &PostId) -> bool {
        self.entries().contains_key(id)
    }

    /// Bookmarks, most recently saved first.
    pub fn list(&self) -> Vec<(PostId, BookmarkEntry)> {
        let mut list: Vec<_> = self
            .entries()
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        list.sort_by(|a, b| b.1.saved_at.cmp(&a.1.saved_at).then_with(|| a.0.cmp(&b.0)));
        list
    }

    /// Adds (`Some`) or removes (`None`) a bookmark and persists the set.
    /// On a failed write the in-memory set is put back.
    pub async fn set(&self, id: &PostId, entry: Option<BookmarkEntry>) -> Result<(), AgoraError> {
        let (previous, encoded) = {
            let mut entries = self.entries();
            let previous = match entry {
                Some(entry) => entries.insert(id.clone(), entry),
                None => entries.remove(id),
            };
            (previous, encode(&entries)?)
        };

        if let Err(e) = self.store.put(BOOKMARKS_KEY, &encoded).await {
            let mut entries = self.entries();
            match previous {
                Some(entry) => entries.insert(id.clone(), entry),
                None => entries.remove(id),
            };
            return Err(e);
        }
        Ok(())
    }
}

fn encode(entries: &HashMap<PostId, BookmarkEntry>) -> Result<String, AgoraError> {
    let plain: HashMap<&str, &BookmarkEntry> =
        entries.iter().map(|(k, v)| (k.as_str(), v)).collect();
    serde_json::to_string(&plain).map_err(|e| AgoraError::Internal(format!("cannot encode bookmarks: {e}")))
}

/// Persisted filter preference and composer draft.
#[derive(Clone)]
pub struct LocalPrefs {
    store: Arc<dyn KeyValueStore>,
}

impl LocalPrefs {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The last-used filter, or the default when none (or garbage) is stored.
    pub async fn load_filter(&self) -> FilterKey {
        match self.store.get(FILTER_KEY).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "persisted filter is corrupt, using default");
                FilterKey::default()
            }),
            Ok(None) => FilterKey::default(),
            Err(e) => {
                warn!(error = %e, "cannot read filter preference");
                FilterKey::default()
            }
        }
    }

    pub async fn save_filter(&self, key: &FilterKey) -> Result<(), AgoraError> {
        let raw = serde_json::to_string(key)
            .map_err(|e| AgoraError::Internal(format!("cannot encode filter: {e}")))?;
        self.store.put(FILTER_KEY, &raw).await
    }

    pub async fn load_draft(&self) -> Result<Option<PostDraft>, AgoraError> {
        Ok(self
            .store
            .get(DRAFT_KEY)
            .await?
            .and_then(|raw| serde_json::from_str(&raw).ok()))
    }

    /// Stores the draft, stamping it with the save time.
    pub async fn save_draft(&self, draft: &PostDraft) -> Result<(), AgoraError> {
        let stamped = PostDraft {
            at: Some(chrono::Utc::now().timestamp_millis()),
            ..draft.clone()
        };
        let raw = serde_json::to_string(&stamped)
            .map_err(|e| AgoraError::Internal(format!("cannot encode draft: {e}")))?;
        self.store.put(DRAFT_KEY, &raw).await
    }

    pub async fn clear_draft(&self) -> Result<(), AgoraError> {
        self.store.remove(DRAFT_KEY).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::SortMode;
    use agora_storage::MemoryKvStore;

    fn entry(title: &str, saved_at: i64) -> BookmarkEntry {
        BookmarkEntry {
            title: title.into(),
            category: "free".into(),
            author_display: "kim".into(),
            saved_at,
        }
    }

    #[tokio::test]
    async fn bookmarks_round_trip_through_store() {
        let kv = Arc::new(MemoryKvStore::new());
        let bookmarks = Bookmarks::load(kv.clone()).await.unwrap();
        bookmarks.set(&PostId::from("p1"), Some(entry("a", 1))).await.unwrap();
        bookmarks.set(&PostId::from("p2"), Some(entry("b", 2))).await.unwrap();
        bookmarks.set(&PostId::from("p1"), None).await.unwrap();

        let reloaded = Bookmarks::load(kv).await.unwrap();
        assert!(!reloaded.contains(&PostId::from("p1")));
        assert_eq!(reloaded.list(), vec![(PostId::from("p2"), entry("b", 2))]);
    }

    #[tokio::test]
    async fn failed_write_restores_memory() {
        let kv = Arc::new(MemoryKvStore::new());
        let bookmarks = Bookmarks::load(kv.clone()).await.unwrap();
        kv.set_fail_writes(true);
        assert!(bookmarks.set(&PostId::from("p1"), Some(entry("a", 1))).await.is_err());
        assert!(!bookmarks.contains(&PostId::from("p1")));
    }

    #[tokio::test]
    async fn list_is_newest_first() {
        let kv = Arc::new(MemoryKvStore::new());
        let bookmarks = Bookmarks::load(kv).await.unwrap();
        bookmarks.set(&PostId::from("old"), Some(entry("o", 10))).await.unwrap();
        bookmarks.set(&PostId::from("new"), Some(entry("n", 20))).await.unwrap();
        let ids: Vec<_> = bookmarks.list().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![PostId::from("new"), PostId::from("old")]);
    }

    #[tokio::test]
    async fn filter_preference_persists() {
        let prefs = LocalPrefs::new(Arc::new(MemoryKvStore::new()));
        assert_eq!(prefs.load_filter().await, FilterKey::default());
        let key = FilterKey::new("notice").with_sort(SortMode::Engagement);
        prefs.save_filter(&key).await.unwrap();
        assert_eq!(prefs.load_filter().await, key);
    }

    #[tokio::test]
    async fn draft_is_stamped_and_clearable() {
        let prefs = LocalPrefs::new(Arc::new(MemoryKvStore::new()));
        let draft = PostDraft {
            category: "free".into(),
            title: "half".into(),
            body_md: "written".into(),
            ..PostDraft::default()
        };
        prefs.save_draft(&draft).await.unwrap();
        let loaded = prefs.load_draft().await.unwrap().unwrap();
        assert_eq!(loaded.title, "half");
        assert!(loaded.at.is_some());
        prefs.clear_draft().await.unwrap();
        assert!(prefs.load_draft().await.unwrap().is_none());
    }
}
