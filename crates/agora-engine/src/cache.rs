// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Windowed feed cache.
//!
//! One window per [`FilterKey`], each with its own cursor and ordered item
//! list. Server order is kept as delivered; later pages are appended and
//! never re-sorted. Removed ids are tombstoned so that late patches and page
//! merges cannot bring them back.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agora_core::{
    AgoraError, CommentId, CommentSummary, CountUpdate, FilterKey, PageQuery, PostId, PostPatch,
    PostSummary,
};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::{debug, trace};

use crate::gateway::RemoteGateway;
use crate::local::Bookmarks;

type PageFuture = Shared<BoxFuture<'static, Result<PageOutcome, AgoraError>>>;

/// Windows kept at once; the least recently used inactive one goes first.
pub const MAX_WINDOWS: usize = 4;

/// Removed ids remembered; the oldest are forgotten first.
pub const MAX_TOMBSTONES: usize = 1024;

/// Result of a page load that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageOutcome {
    /// The window changed; `added` new posts were stored.
    Loaded { added: usize },
    /// Nothing to do: the window is exhausted or not loaded yet.
    Unchanged,
    /// The window was reset or cancelled while the response was in flight.
    Stale,
}

#[derive(Default)]
struct Window {
    items: Vec<PostSummary>,
    cursor: String,
    loaded: bool,
    generation: u64,
    next_page: Option<(u64, PageFuture)>,
    /// Cache clock value at the last load or activation.
    touched: u64,
}

impl Window {
    fn position(&self, id: &PostId) -> Option<usize> {
        self.items.iter().position(|p| p.id == *id)
    }
}

/// The post shown in detail view, with its comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPost {
    pub id: PostId,
    pub post: Option<PostSummary>,
    pub comments: Vec<CommentSummary>,
}

/// Where a detached post sat, so an undo can put it back.
#[derive(Debug, Clone)]
pub struct Detached {
    pub id: PostId,
    positions: Vec<(FilterKey, usize, PostSummary)>,
}

#[derive(Default)]
struct CacheState {
    windows: HashMap<FilterKey, Window>,
    tombstones: HashSet<PostId>,
    tombstone_order: VecDeque<PostId>,
    /// Optimistically deleted, awaiting confirmation. Skipped by merges.
    detached: HashSet<PostId>,
    stale: HashSet<PostId>,
    active: FilterKey,
    open: Option<OpenPost>,
    clock: u64,
}

impl CacheState {
    fn hidden(&self, id: &PostId) -> bool {
        self.tombstones.contains(id) || self.detached.contains(id)
    }

    /// The window for `key`, created if needed, marked as just used.
    fn touch(&mut self, key: &FilterKey) -> &mut Window {
        self.clock += 1;
        if !self.windows.contains_key(key) {
            self.evict_for(key);
        }
        let clock = self.clock;
        let window = self.windows.entry(key.clone()).or_default();
        window.touched = clock;
        window
    }

    fn evict_for(&mut self, incoming: &FilterKey) {
        while self.windows.len() >= MAX_WINDOWS {
            let victim = self
                .windows
                .iter()
                .filter(|(k, _)| **k != self.active && *k != incoming)
                .min_by_key(|(_, w)| w.touched)
                .map(|(k, _)| k.clone());
            let Some(victim) = victim else { break };
            debug!(key = %victim, "evicting feed window");
            self.windows.remove(&victim);
        }
        self.forget_unreachable_stale();
    }

    /// Drops every window except the active one.
    fn retain_active(&mut self) {
        let active = self.active.clone();
        self.windows.retain(|k, _| *k == active);
        self.forget_unreachable_stale();
    }

    fn forget_unreachable_stale(&mut self) {
        let CacheState {
            windows,
            stale,
            open,
            ..
        } = self;
        stale.retain(|id| {
            open.as_ref().is_some_and(|o| o.id == *id)
                || windows.values().any(|w| w.position(id).is_some())
        });
    }

    fn tombstone(&mut self, id: &PostId) -> bool {
        if !self.tombstones.insert(id.clone()) {
            return false;
        }
        self.tombstone_order.push_back(id.clone());
        while self.tombstone_order.len() > MAX_TOMBSTONES {
            if let Some(oldest) = self.tombstone_order.pop_front() {
                self.tombstones.remove(&oldest);
            }
        }
        true
    }
}

struct Inner {
    state: Mutex<CacheState>,
    gateway: RemoteGateway,
    bookmarks: Arc<Bookmarks>,
    page_size: u32,
}

#[derive(Clone)]
pub struct FeedCache {
    inner: Arc<Inner>,
}

impl FeedCache {
    pub fn new(gateway: RemoteGateway, bookmarks: Arc<Bookmarks>, page_size: u32) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(CacheState::default()),
                gateway,
                bookmarks,
                page_size,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn query(&self, key: &FilterKey, cursor: Option<String>) -> PageQuery {
        PageQuery {
            key: key.clone(),
            cursor,
            page_size: self.inner.page_size,
        }
    }

    fn annotate(&self, mut post: PostSummary) -> PostSummary {
        post.bookmarked = self.inner.bookmarks.contains(&post.id);
        post
    }

    /// Discards the window for `key` and loads its first page.
    ///
    /// The previous items stay visible until the response lands; a failure
    /// leaves them untouched.
    pub async fn load_first_page(&self, key: &FilterKey) -> Result<PageOutcome, AgoraError> {
        let generation = {
            let mut state = self.state();
            let window = state.touch(key);
            window.generation += 1;
            window.next_page = None;
            window.generation
        };

        let page = self.inner.gateway.list_posts(&self.query(key, None)).await?;

        let mut state = self.state();
        let CacheState {
            windows,
            tombstones,
            detached,
            ..
        } = &mut *state;
        let Some(window) = windows.get_mut(key).filter(|w| w.generation == generation) else {
            debug!(key = %key, "discarding stale first page");
            return Ok(PageOutcome::Stale);
        };

        let mut seen = HashSet::new();
        window.items = page
            .posts
            .into_iter()
            .filter(|p| !tombstones.contains(&p.id) && !detached.contains(&p.id))
            .filter(|p| seen.insert(p.id.clone()))
            .map(|p| self.annotate(p))
            .collect();
        window.cursor = page.next_cursor;
        window.loaded = true;
        debug!(key = %key, items = window.items.len(), exhausted = window.cursor.is_empty(), "first page loaded");
        Ok(PageOutcome::Loaded {
            added: window.items.len(),
        })
    }

    /// Appends the next page. Concurrent calls for the same key share one
    /// request; a call on an exhausted or unloaded window does nothing.
    pub async fn load_next_page(&self, key: &FilterKey) -> Result<PageOutcome, AgoraError> {
        let pending = {
            let mut state = self.state();
            let Some(window) = state.windows.get_mut(key) else {
                return Ok(PageOutcome::Unchanged);
            };
            if !window.loaded || window.cursor.is_empty() {
                return Ok(PageOutcome::Unchanged);
            }
            match &window.next_page {
                Some((generation, fut)) if *generation == window.generation => {
                    trace!(key = %key, "joining in-flight page load");
                    fut.clone()
                }
                _ => {
                    let fut = self
                        .clone()
                        .fetch_next(key.clone(), window.generation, window.cursor.clone())
                        .boxed()
                        .shared();
                    window.next_page = Some((window.generation, fut.clone()));
                    fut
                }
            }
        };
        pending.await
    }

    async fn fetch_next(
        self,
        key: FilterKey,
        generation: u64,
        cursor: String,
    ) -> Result<PageOutcome, AgoraError> {
        let result = self
            .inner
            .gateway
            .list_posts(&self.query(&key, Some(cursor)))
            .await;

        let mut state = self.state();
        let CacheState {
            windows,
            tombstones,
            detached,
            ..
        } = &mut *state;
        let Some(window) = windows.get_mut(&key).filter(|w| w.generation == generation) else {
            debug!(key = %key, "discarding stale page");
            return Ok(PageOutcome::Stale);
        };
        window.next_page = None;
        let page = result?;

        let before = window.items.len();
        for post in page.posts {
            if tombstones.contains(&post.id) || detached.contains(&post.id) {
                continue;
            }
            if window.position(&post.id).is_some() {
                trace!(id = %post.id, "skipping duplicate post");
                continue;
            }
            window.items.push(self.annotate(post));
        }
        window.cursor = page.next_cursor;
        let added = window.items.len() - before;
        debug!(key = %key, added, exhausted = window.cursor.is_empty(), "page appended");
        Ok(PageOutcome::Loaded { added })
    }

    /// Refetches the first page and splices it ahead of the loaded tail,
    /// keeping the cursor so scrolled-in pages survive.
    pub async fn refresh_head(&self, key: &FilterKey) -> Result<PageOutcome, AgoraError> {
        let generation = {
            let state = self.state();
            state
                .windows
                .get(key)
                .filter(|w| w.loaded)
                .map(|w| w.generation)
        };
        let Some(generation) = generation else {
            return self.load_first_page(key).await;
        };

        let page = self.inner.gateway.list_posts(&self.query(key, None)).await?;

        let mut state = self.state();
        let CacheState {
            windows,
            tombstones,
            detached,
            ..
        } = &mut *state;
        let Some(window) = windows.get_mut(key).filter(|w| w.generation == generation) else {
            return Ok(PageOutcome::Stale);
        };

        let mut head: Vec<PostSummary> = Vec::with_capacity(page.posts.len());
        for post in page.posts {
            if tombstones.contains(&post.id)
                || detached.contains(&post.id)
                || head.iter().any(|p| p.id == post.id)
            {
                continue;
            }
            head.push(self.annotate(post));
        }
        let added = head
            .iter()
            .filter(|p| window.position(&p.id).is_none())
            .count();
        let head_ids: HashSet<&PostId> = head.iter().map(|p| &p.id).collect();
        let tail: Vec<PostSummary> = window
            .items
            .iter()
            .filter(|p| !head_ids.contains(&p.id))
            .cloned()
            .collect();
        head.extend(tail);
        window.items = head;
        debug!(key = %key, added, "feed head refreshed");
        Ok(PageOutcome::Loaded { added })
    }

    /// Invalidates in-flight loads for `key`; their responses are dropped.
    pub fn cancel(&self, key: &FilterKey) {
        if let Some(window) = self.state().windows.get_mut(key) {
            window.generation += 1;
            window.next_page = None;
        }
    }

    /// Merges `patch` into every copy of the post. Tombstoned ids are ignored.
    pub fn apply_patch(&self, id: &PostId, patch: &PostPatch) -> bool {
        let mut state = self.state();
        if state.tombstones.contains(id) {
            trace!(id = %id, "ignoring patch for removed post");
            return false;
        }
        let mut changed = false;
        for window in state.windows.values_mut() {
            if let Some(i) = window.position(id) {
                changed |= patch.apply(&mut window.items[i]);
            }
        }
        if let Some(post) = state
            .open
            .as_mut()
            .filter(|o| o.id == *id)
            .and_then(|o| o.post.as_mut())
        {
            changed |= patch.apply(post);
        }
        changed
    }

    /// Stores a freshly fetched post over every cached copy.
    pub fn merge_post(&self, post: PostSummary) -> bool {
        let post = self.annotate(post);
        let id = post.id.clone();
        let mut changed = self.apply_patch(&id, &PostPatch::from_summary(&post));
        let mut state = self.state();
        if state.tombstones.contains(&id) {
            return false;
        }
        state.stale.remove(&id);
        if let Some(open) = state.open.as_mut().filter(|o| o.id == id) {
            if open.post.as_ref() != Some(&post) {
                open.post = Some(post);
                changed = true;
            }
        }
        changed
    }

    /// Drops the post from every window and tombstones its id.
    pub fn remove(&self, id: &PostId) -> bool {
        let mut state = self.state();
        let mut removed = state.tombstone(id);
        state.detached.remove(id);
        state.stale.remove(id);
        for window in state.windows.values_mut() {
            let before = window.items.len();
            window.items.retain(|p| p.id != *id);
            removed |= window.items.len() != before;
        }
        if state.open.as_ref().is_some_and(|o| o.id == *id) {
            state.open = None;
        }
        removed
    }

    /// Takes the post out of every window without tombstoning it.
    pub fn detach(&self, id: &PostId) -> Detached {
        let mut state = self.state();
        state.detached.insert(id.clone());
        let mut positions = Vec::new();
        for (key, window) in state.windows.iter_mut() {
            if let Some(i) = window.position(id) {
                positions.push((key.clone(), i, window.items.remove(i)));
            }
        }
        Detached {
            id: id.clone(),
            positions,
        }
    }

    /// Puts a detached post back where it was, unless it has been removed
    /// for good in the meantime.
    pub fn restore(&self, detached: Detached) -> bool {
        let mut state = self.state();
        state.detached.remove(&detached.id);
        if state.tombstones.contains(&detached.id) {
            return false;
        }
        let mut restored = false;
        for (key, index, post) in detached.positions {
            if let Some(window) = state.windows.get_mut(&key) {
                if window.position(&post.id).is_none() {
                    let at = index.min(window.items.len());
                    window.items.insert(at, post);
                    restored = true;
                }
            }
        }
        restored
    }

    pub fn is_removed(&self, id: &PostId) -> bool {
        self.state().tombstones.contains(id)
    }

    pub fn snapshot(&self, key: &FilterKey) -> Vec<PostSummary> {
        self.state()
            .windows
            .get(key)
            .map(|w| w.items.clone())
            .unwrap_or_default()
    }

    /// Latest cached copy of a post: the open post first, then the active
    /// window, then any window.
    pub fn get(&self, id: &PostId) -> Option<PostSummary> {
        let state = self.state();
        if state.hidden(id) {
            return None;
        }
        let open = state
            .open
            .as_ref()
            .filter(|o| o.id == *id)
            .and_then(|o| o.post.clone());
        open.or_else(|| {
            let active = state.windows.get(&state.active);
            active
                .into_iter()
                .chain(state.windows.values())
                .find_map(|w| w.position(id).map(|i| w.items[i].clone()))
        })
    }

    pub fn in_window(&self, key: &FilterKey, id: &PostId) -> bool {
        self.state()
            .windows
            .get(key)
            .is_some_and(|w| w.position(id).is_some())
    }

    #[cfg(test)]
    fn window_count(&self) -> usize {
        self.state().windows.len()
    }

    pub fn is_loaded(&self, key: &FilterKey) -> bool {
        self.state().windows.get(key).is_some_and(|w| w.loaded)
    }

    /// True once the server returned an empty cursor for the window.
    pub fn is_exhausted(&self, key: &FilterKey) -> bool {
        self.state()
            .windows
            .get(key)
            .is_some_and(|w| w.loaded && w.cursor.is_empty())
    }

    pub fn set_active(&self, key: FilterKey) {
        let mut state = self.state();
        state.active = key.clone();
        if state.windows.contains_key(&key) {
            state.touch(&key);
        }
    }

    /// Forgets every window but the active one, as after missing updates.
    pub fn drop_inactive(&self) {
        self.state().retain_active();
    }

    pub fn active(&self) -> FilterKey {
        self.state().active.clone()
    }

    pub fn mark_stale(&self, id: &PostId) {
        let mut state = self.state();
        if !state.tombstones.contains(id) {
            state.stale.insert(id.clone());
        }
    }

    /// Clears and returns the stale flag of a post.
    pub fn take_stale(&self, id: &PostId) -> bool {
        self.state().stale.remove(id)
    }

    pub fn set_open(&self, id: &PostId) {
        let post = self.get(id);
        self.state().open = Some(OpenPost {
            id: id.clone(),
            post,
            comments: Vec::new(),
        });
    }

    pub fn close_open(&self) -> Option<PostId> {
        self.state().open.take().map(|o| o.id)
    }

    pub fn open_post(&self) -> Option<OpenPost> {
        self.state().open.clone()
    }

    pub fn open_id(&self) -> Option<PostId> {
        self.state().open.as_ref().map(|o| o.id.clone())
    }

    /// Replaces the comment list of the open post. Ignored when `post_id`
    /// is not the open post.
    pub fn set_comments(&self, post_id: &PostId, comments: Vec<CommentSummary>) -> bool {
        match self.state().open.as_mut().filter(|o| o.id == *post_id) {
            Some(open) => {
                open.comments = comments;
                true
            }
            None => false,
        }
    }

    pub fn append_comment(&self, comment: CommentSummary) -> bool {
        let mut state = self.state();
        match state.open.as_mut().filter(|o| o.id == comment.post_id) {
            Some(open) if !open.comments.iter().any(|c| c.id == comment.id) => {
                open.comments.push(comment);
                true
            }
            _ => false,
        }
    }

    pub fn comment_like_count(&self, id: &CommentId) -> Option<u64> {
        let state = self.state();
        state
            .open
            .as_ref()?
            .comments
            .iter()
            .find(|c| c.id == *id)
            .map(|c| c.like_count)
    }

    pub fn update_comment_likes(&self, id: &CommentId, update: CountUpdate) -> bool {
        let mut state = self.state();
        let Some(comment) = state
            .open
            .as_mut()
            .and_then(|o| o.comments.iter_mut().find(|c| c.id == *id))
        else {
            return false;
        };
        let next = update.apply(comment.like_count);
        let changed = next != comment.like_count;
        comment.like_count = next;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionStore;
    use agora_storage::MemoryKvStore;
    use agora_test_utils::MockFeedApi;
    use std::time::Duration;

    async fn cache_with(api: Arc<MockFeedApi>, page_size: u32) -> FeedCache {
        let kv = Arc::new(MemoryKvStore::new());
        let session = Arc::new(SessionStore::load(kv.clone()).await.unwrap());
        let bookmarks = Arc::new(Bookmarks::load(kv).await.unwrap());
        FeedCache::new(RemoteGateway::new(api, session), bookmarks, page_size)
    }

    fn ids(posts: &[PostSummary]) -> Vec<String> {
        posts.iter().map(|p| p.id.0.clone()).collect()
    }

    #[tokio::test]
    async fn pages_concatenate_until_cursor_is_empty() {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(60);
        let cache = cache_with(api.clone(), 50).await;
        let key = FilterKey::default();

        assert_eq!(cache.load_first_page(&key).await.unwrap(), PageOutcome::Loaded { added: 50 });
        assert!(!cache.is_exhausted(&key));
        assert_eq!(cache.load_next_page(&key).await.unwrap(), PageOutcome::Loaded { added: 10 });
        assert!(cache.is_exhausted(&key));
        assert_eq!(cache.load_next_page(&key).await.unwrap(), PageOutcome::Unchanged);
        assert_eq!(api.calls("list_posts"), 2);

        let snapshot = cache.snapshot(&key);
        assert_eq!(ids(&snapshot), ids(&api.feed(&key)));
    }

    #[tokio::test]
    async fn next_page_before_first_load_is_a_no_op() {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(3);
        let cache = cache_with(api.clone(), 2).await;
        let key = FilterKey::default();
        assert_eq!(cache.load_next_page(&key).await.unwrap(), PageOutcome::Unchanged);
        assert_eq!(api.calls("list_posts"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_next_page_calls_share_one_request() {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(20);
        let cache = cache_with(api.clone(), 10).await;
        let key = FilterKey::default();
        cache.load_first_page(&key).await.unwrap();

        api.set_latency(Duration::from_millis(200));
        let (a, b) = tokio::join!(cache.load_next_page(&key), cache.load_next_page(&key));
        assert_eq!(a.unwrap(), PageOutcome::Loaded { added: 10 });
        assert_eq!(b.unwrap(), PageOutcome::Loaded { added: 10 });
        assert_eq!(api.calls("list_posts"), 2);
        assert_eq!(cache.snapshot(&key).len(), 20);
    }

    #[tokio::test]
    async fn shifted_pages_do_not_duplicate() {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(4);
        let cache = cache_with(api.clone(), 2).await;
        let key = FilterKey::default();
        cache.load_first_page(&key).await.unwrap();
        // A new post pushes p3 back onto the next page boundary.
        api.insert_post(api.make_post("p5", "free"));
        cache.load_next_page(&key).await.unwrap();
        let snapshot = cache.snapshot(&key);
        let unique: HashSet<_> = snapshot.iter().map(|p| p.id.clone()).collect();
        assert_eq!(unique.len(), snapshot.len());
    }

    #[tokio::test]
    async fn failed_load_keeps_previous_items() {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(5);
        let cache = cache_with(api.clone(), 10).await;
        let key = FilterKey::default();
        cache.load_first_page(&key).await.unwrap();

        api.fail_next("list_posts", AgoraError::NetworkFailure("offline".into()));
        assert!(cache.load_first_page(&key).await.is_err());
        assert_eq!(cache.snapshot(&key).len(), 5);
        assert_eq!(cache.load_first_page(&key).await.unwrap(), PageOutcome::Loaded { added: 5 });
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_load_is_discarded() {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(5);
        api.set_latency(Duration::from_millis(100));
        let cache = cache_with(api.clone(), 10).await;
        let key = FilterKey::default();

        let loading = tokio::spawn({
            let cache = cache.clone();
            let key = key.clone();
            async move { cache.load_first_page(&key).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.cancel(&key);
        assert_eq!(loading.await.unwrap().unwrap(), PageOutcome::Stale);
        assert!(cache.snapshot(&key).is_empty());
    }

    #[tokio::test]
    async fn windows_are_independent() {
        let api = Arc::new(MockFeedApi::new());
        api.insert_post(api.make_post("n1", "notice"));
        api.insert_post(api.make_post("f1", "free"));
        let cache = cache_with(api.clone(), 10).await;
        let notice = FilterKey::new("notice");
        let free = FilterKey::new("free");
        cache.load_first_page(&notice).await.unwrap();
        cache.load_first_page(&free).await.unwrap();
        assert_eq!(ids(&cache.snapshot(&notice)), vec!["n1"]);
        assert_eq!(ids(&cache.snapshot(&free)), vec!["f1"]);
    }

    #[tokio::test]
    async fn removed_posts_stay_removed() {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(3);
        let cache = cache_with(api.clone(), 10).await;
        let key = FilterKey::default();
        cache.load_first_page(&key).await.unwrap();

        let id = PostId::from("p2");
        assert!(cache.remove(&id));
        assert!(!cache.apply_patch(&id, &PostPatch::default().with_title("late")));
        cache.load_first_page(&key).await.unwrap();
        assert!(!cache.in_window(&key, &id));
        assert!(cache.get(&id).is_none());
    }

    #[tokio::test]
    async fn detach_and_restore_keep_position() {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(3);
        let cache = cache_with(api.clone(), 10).await;
        let key = FilterKey::default();
        cache.load_first_page(&key).await.unwrap();
        let before = cache.snapshot(&key);

        let detached = cache.detach(&PostId::from("p2"));
        assert_eq!(cache.snapshot(&key).len(), 2);
        assert!(cache.restore(detached));
        assert_eq!(cache.snapshot(&key), before);
    }

    #[tokio::test]
    async fn head_refresh_keeps_scrolled_tail() {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(6);
        let cache = cache_with(api.clone(), 3).await;
        let key = FilterKey::default();
        cache.load_first_page(&key).await.unwrap();
        cache.load_next_page(&key).await.unwrap();
        assert_eq!(cache.snapshot(&key).len(), 6);

        api.insert_post(api.make_post("p7", "free"));
        assert_eq!(cache.refresh_head(&key).await.unwrap(), PageOutcome::Loaded { added: 1 });
        let snapshot = cache.snapshot(&key);
        assert_eq!(snapshot.len(), 7);
        assert_eq!(snapshot[0].id, PostId::from("p7"));
    }

    #[tokio::test]
    async fn patch_reaches_open_post() {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(2);
        let cache = cache_with(api.clone(), 10).await;
        let key = FilterKey::default();
        cache.load_first_page(&key).await.unwrap();
        let id = PostId::from("p1");
        cache.set_open(&id);

        cache.apply_patch(&id, &PostPatch::default().with_comment_count(CountUpdate::Add(2)));
        let open = cache.open_post().unwrap();
        assert_eq!(open.post.unwrap().comment_count, 2);
        assert_eq!(cache.snapshot(&key)[1].comment_count, 2);
    }

    #[tokio::test]
    async fn least_recently_used_window_is_evicted() {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(2);
        let cache = cache_with(api.clone(), 10).await;
        let keys: Vec<FilterKey> = (0..=MAX_WINDOWS)
            .map(|i| FilterKey::default().with_search(format!("q{i}")))
            .collect();
        cache.set_active(keys[0].clone());
        for key in &keys {
            cache.load_first_page(key).await.unwrap();
        }
        assert_eq!(cache.window_count(), MAX_WINDOWS);
        assert!(cache.is_loaded(&keys[0]));
        assert!(!cache.is_loaded(&keys[1]));
        assert!(cache.is_loaded(&keys[MAX_WINDOWS]));

        cache.drop_inactive();
        assert_eq!(cache.window_count(), 1);
        assert!(cache.is_loaded(&keys[0]));
    }

    #[tokio::test]
    async fn next_page_on_unknown_key_creates_nothing() {
        let api = Arc::new(MockFeedApi::new());
        let cache = cache_with(api, 10).await;
        cache.load_next_page(&FilterKey::new("notice")).await.unwrap();
        assert_eq!(cache.window_count(), 0);
    }

    #[tokio::test]
    async fn oldest_tombstones_are_forgotten() {
        let api = Arc::new(MockFeedApi::new());
        let cache = cache_with(api, 10).await;
        for i in 0..=MAX_TOMBSTONES {
            cache.remove(&PostId(format!("gone{i}")));
        }
        assert!(!cache.is_removed(&PostId::from("gone0")));
        assert!(cache.is_removed(&PostId::from("gone1")));
        assert!(cache.is_removed(&PostId(format!("gone{MAX_TOMBSTONES}"))));
    }

    #[tokio::test]
    async fn stale_flag_is_taken_once() {
        let api = Arc::new(MockFeedApi::new());
        let cache = cache_with(api, 10).await;
        let id = PostId::from("p1");
        cache.mark_stale(&id);
        assert!(cache.take_stale(&id));
        assert!(!cache.take_stale(&id));
    }
}
