// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Optimistic mutation log.
//!
//! A mutation is applied to the [`FeedCache`] as soon as the intent is issued,
//! recorded with the change that undoes it, and settled when its remote call
//! returns. At most one mutation per `(kind, target)` is in flight: a second
//! intent joins the first and shares its outcome.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agora_core::{
    AgoraError, CommentId, CommentSummary, CountUpdate, MutationKind, MutationStatus, PostId,
    PostPatch,
};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::cache::{Detached, FeedCache};

const EVENT_BUFFER: usize = 128;

/// What a mutation targets. `key` identifies it for single-flight purposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationTarget {
    pub key: String,
    pub post_id: PostId,
    pub comment_id: Option<CommentId>,
}

impl MutationTarget {
    pub fn post(id: &PostId) -> Self {
        Self {
            key: format!("post:{id}"),
            post_id: id.clone(),
            comment_id: None,
        }
    }

    pub fn comment(post_id: &PostId, id: &CommentId) -> Self {
        Self {
            key: format!("comment:{id}"),
            post_id: post_id.clone(),
            comment_id: Some(id.clone()),
        }
    }

    /// A comment that does not exist yet, identified by its body so a
    /// double submit joins while distinct comments stay independent.
    pub fn new_comment(post_id: &PostId, body: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        body.hash(&mut hasher);
        Self {
            key: format!("post:{post_id}/new-comment:{:016x}", hasher.finish()),
            post_id: post_id.clone(),
            comment_id: None,
        }
    }
}

/// A change to cached state, applied optimistically or as the server's
/// authoritative answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheChange {
    Patch(PostPatch),
    CommentLikes {
        comment_id: CommentId,
        update: CountUpdate,
    },
    AppendComment(CommentSummary),
    /// Hide the post until the mutation settles.
    Detach,
}

#[derive(Debug, Clone)]
enum Undo {
    Patch(PostPatch),
    CommentLikes(CommentId, CountUpdate),
    Restore(Detached),
    Nothing,
}

fn apply_change(cache: &FeedCache, post_id: &PostId, change: &CacheChange) -> Undo {
    match change {
        CacheChange::Patch(patch) => {
            let undo = cache
                .get(post_id)
                .map(|before| Undo::Patch(patch.inverse_of(&before)))
                .unwrap_or(Undo::Nothing);
            cache.apply_patch(post_id, patch);
            undo
        }
        CacheChange::CommentLikes { comment_id, update } => {
            let undo = cache
                .comment_like_count(comment_id)
                .map(|n| {
                    let back = i64::try_from(n).unwrap_or(i64::MAX)
                        - i64::try_from(update.apply(n)).unwrap_or(i64::MAX);
                    Undo::CommentLikes(comment_id.clone(), CountUpdate::Add(back))
                })
                .unwrap_or(Undo::Nothing);
            cache.update_comment_likes(comment_id, *update);
            undo
        }
        CacheChange::AppendComment(comment) => {
            cache.append_comment(comment.clone());
            Undo::Nothing
        }
        CacheChange::Detach => Undo::Restore(cache.detach(post_id)),
    }
}

fn apply_undo(cache: &FeedCache, post_id: &PostId, undo: Undo) {
    match undo {
        Undo::Patch(inverse) => {
            cache.apply_patch(post_id, &inverse);
        }
        Undo::CommentLikes(comment_id, update) => {
            cache.update_comment_likes(&comment_id, update);
        }
        Undo::Restore(detached) => {
            cache.restore(detached);
        }
        Undo::Nothing => {}
    }
}

/// How a mutation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The server accepted it. `authoritative` is true when the response
    /// carried the resulting state.
    Confirmed { authoritative: bool },
    RolledBack(AgoraError),
    /// The target was removed while the call was in flight.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationEvent {
    pub id: u64,
    pub kind: MutationKind,
    pub target: MutationTarget,
    pub settlement: Settlement,
}

/// Remote half of a mutation. Resolves to the authoritative change, if the
/// server reported one.
pub type RemoteCall = BoxFuture<'static, Result<Option<CacheChange>, AgoraError>>;

type Outcome = Shared<BoxFuture<'static, Result<(), AgoraError>>>;

struct PendingMutation {
    id: u64,
    target: MutationTarget,
    applied_at: i64,
    undo: Undo,
    status: MutationStatus,
    cancelled: bool,
    outcome: Outcome,
}

#[derive(Default)]
struct LogState {
    next_id: u64,
    pending: HashMap<(MutationKind, String), PendingMutation>,
}

struct Inner {
    state: Mutex<LogState>,
    cache: FeedCache,
    events: broadcast::Sender<MutationEvent>,
}

/// Handle to an in-flight mutation.
pub struct MutationHandle {
    pub id: u64,
    /// True if this intent joined a mutation that was already in flight.
    pub joined: bool,
    outcome: Outcome,
}

impl MutationHandle {
    /// Waits for the remote call to settle.
    pub async fn outcome(self) -> Result<(), AgoraError> {
        self.outcome.await
    }
}

#[derive(Clone)]
pub struct MutationLog {
    inner: Arc<Inner>,
}

impl MutationLog {
    pub fn new(cache: FeedCache) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(LogState::default()),
                cache,
                events: broadcast::channel(EVENT_BUFFER).0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, LogState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MutationEvent> {
        self.inner.events.subscribe()
    }

    /// Starts a mutation, or joins the one already in flight for the same
    /// `(kind, target)`. `remote` is only polled when a new mutation starts.
    pub fn begin(
        &self,
        kind: MutationKind,
        target: MutationTarget,
        optimistic: Option<CacheChange>,
        remote: RemoteCall,
    ) -> MutationHandle {
        let key = (kind, target.key.clone());
        let mut state = self.state();
        if let Some(existing) = state.pending.get(&key) {
            debug!(kind = %kind, target = %target.key, id = existing.id, "joining in-flight mutation");
            return MutationHandle {
                id: existing.id,
                joined: true,
                outcome: existing.outcome.clone(),
            };
        }

        state.next_id += 1;
        let id = state.next_id;
        let undo = match &optimistic {
            Some(change) => apply_change(&self.inner.cache, &target.post_id, change),
            None => Undo::Nothing,
        };

        let log = self.clone();
        let settle_key = key.clone();
        let task = tokio::spawn(async move {
            let result = remote.await;
            log.settle(settle_key, id, result)
        });
        let outcome = async move {
            task.await
                .unwrap_or_else(|e| Err(AgoraError::Internal(format!("mutation task failed: {e}"))))
        }
        .boxed()
        .shared();

        debug!(kind = %kind, target = %target.key, id, "mutation in flight");
        state.pending.insert(
            key,
            PendingMutation {
                id,
                target,
                applied_at: chrono::Utc::now().timestamp_millis(),
                undo,
                status: MutationStatus::InFlight,
                cancelled: false,
                outcome: outcome.clone(),
            },
        );
        MutationHandle {
            id,
            joined: false,
            outcome,
        }
    }

    fn settle(
        &self,
        key: (MutationKind, String),
        id: u64,
        result: Result<Option<CacheChange>, AgoraError>,
    ) -> Result<(), AgoraError> {
        let kind = key.0;
        let event = {
            let mut state = self.state();
            if state.pending.get(&key).is_none_or(|m| m.id != id) {
                warn!(kind = %kind, id, "settled mutation missing from log");
                return result.map(|_| ());
            }
            let Some(mut entry) = state.pending.remove(&key) else {
                return result.map(|_| ());
            };
            let cache = &self.inner.cache;
            let post_id = entry.target.post_id.clone();
            let elapsed_ms = chrono::Utc::now().timestamp_millis() - entry.applied_at;

            let settlement = if entry.cancelled {
                debug!(kind = %kind, id, "mutation settled after its target was removed");
                Settlement::Cancelled
            } else {
                match &result {
                    Ok(authoritative) => {
                        entry.status = MutationStatus::Confirmed;
                        if kind == MutationKind::PostDelete {
                            cache.remove(&post_id);
                        }
                        if let Some(change) = authoritative {
                            apply_change(cache, &post_id, change);
                        }
                        Settlement::Confirmed {
                            authoritative: authoritative.is_some(),
                        }
                    }
                    Err(e) => {
                        entry.status = MutationStatus::Failed;
                        apply_undo(cache, &post_id, entry.undo);
                        info!(kind = %kind, id, error = %e, "mutation rolled back");
                        Settlement::RolledBack(e.clone())
                    }
                }
            };
            debug!(kind = %kind, id, status = %entry.status, elapsed_ms, "mutation settled");
            MutationEvent {
                id,
                kind,
                target: entry.target,
                settlement,
            }
        };
        // Nobody listening is fine.
        let _ = self.inner.events.send(event);
        result.map(|_| ())
    }

    /// Detaches in-flight mutations on a removed post from the cache: they
    /// still settle, but neither confirm nor roll back cached state.
    pub fn cancel_target(&self, post_id: &PostId) -> usize {
        let mut state = self.state();
        let mut cancelled = 0;
        for entry in state.pending.values_mut() {
            if entry.target.post_id == *post_id && !entry.cancelled {
                entry.cancelled = true;
                cancelled += 1;
            }
        }
        if cancelled > 0 {
            debug!(post = %post_id, cancelled, "cancelled mutations on removed post");
        }
        cancelled
    }

    pub fn in_flight(&self, kind: MutationKind, target: &MutationTarget) -> bool {
        self.state()
            .pending
            .contains_key(&(kind, target.key.clone()))
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::RemoteGateway;
    use crate::local::Bookmarks;
    use crate::session::SessionStore;
    use agora_core::FilterKey;
    use agora_storage::MemoryKvStore;
    use agora_test_utils::MockFeedApi;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn loaded_cache(posts: usize) -> FeedCache {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(posts);
        let kv = Arc::new(MemoryKvStore::new());
        let session = Arc::new(SessionStore::load(kv.clone()).await.unwrap());
        let bookmarks = Arc::new(Bookmarks::load(kv).await.unwrap());
        let cache = FeedCache::new(RemoteGateway::new(api, session), bookmarks, 50);
        cache.load_first_page(&FilterKey::default()).await.unwrap();
        cache
    }

    fn like_patch() -> PostPatch {
        PostPatch::default()
            .with_liked(true)
            .with_like_count(CountUpdate::Add(1))
    }

    fn delayed(result: Result<Option<CacheChange>, AgoraError>) -> RemoteCall {
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            result
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn failure_restores_pre_mutation_state() {
        let cache = loaded_cache(3).await;
        let log = MutationLog::new(cache.clone());
        let id = PostId::from("p1");
        let before = cache.snapshot(&FilterKey::default());

        let handle = log.begin(
            MutationKind::LikeToggle,
            MutationTarget::post(&id),
            Some(CacheChange::Patch(like_patch())),
            delayed(Err(AgoraError::ServerFault {
                status: 500,
                message: "boom".into(),
            })),
        );
        assert_eq!(cache.get(&id).unwrap().like_count, 1);
        assert!(handle.outcome().await.is_err());
        assert_eq!(cache.snapshot(&FilterKey::default()), before);
        assert_eq!(log.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rollback_keeps_counts_bumped_by_others() {
        let cache = loaded_cache(2).await;
        let log = MutationLog::new(cache.clone());
        let id = PostId::from("p1");

        let handle = log.begin(
            MutationKind::CommentCreate,
            MutationTarget::new_comment(&id, "mine"),
            Some(CacheChange::Patch(
                PostPatch::default().with_comment_count(CountUpdate::Add(1)),
            )),
            delayed(Err(AgoraError::NetworkFailure("offline".into()))),
        );
        // Another user's comment arrives while ours is in flight.
        cache.apply_patch(
            &id,
            &PostPatch::default().with_comment_count(CountUpdate::Add(1)),
        );
        assert_eq!(cache.get(&id).unwrap().comment_count, 2);

        assert!(handle.outcome().await.is_err());
        assert_eq!(cache.get(&id).unwrap().comment_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn authoritative_value_overwrites_optimistic_one() {
        let cache = loaded_cache(1).await;
        let log = MutationLog::new(cache.clone());
        let id = PostId::from("p1");
        let server = PostPatch::default()
            .with_liked(true)
            .with_like_count(CountUpdate::Set(7));

        let mut events = log.subscribe();
        log.begin(
            MutationKind::LikeToggle,
            MutationTarget::post(&id),
            Some(CacheChange::Patch(like_patch())),
            delayed(Ok(Some(CacheChange::Patch(server)))),
        )
        .outcome()
        .await
        .unwrap();
        assert_eq!(cache.get(&id).unwrap().like_count, 7);
        let event = events.recv().await.unwrap();
        assert_eq!(event.settlement, Settlement::Confirmed { authoritative: true });
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_intent_joins_without_second_call() {
        let cache = loaded_cache(1).await;
        let log = MutationLog::new(cache.clone());
        let id = PostId::from("p1");
        let calls = Arc::new(AtomicUsize::new(0));
        let remote = |calls: Arc<AtomicUsize>| -> RemoteCall {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(None)
            }
            .boxed()
        };

        let first = log.begin(
            MutationKind::LikeToggle,
            MutationTarget::post(&id),
            Some(CacheChange::Patch(like_patch())),
            remote(calls.clone()),
        );
        let second = log.begin(
            MutationKind::LikeToggle,
            MutationTarget::post(&id),
            Some(CacheChange::Patch(like_patch())),
            remote(calls.clone()),
        );
        assert!(second.joined);
        assert_eq!(first.id, second.id);
        first.outcome().await.unwrap();
        second.outcome().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get(&id).unwrap().like_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn removal_cancels_pending_edit() {
        let cache = loaded_cache(2).await;
        let log = MutationLog::new(cache.clone());
        let id = PostId::from("p1");
        let mut events = log.subscribe();

        let handle = log.begin(
            MutationKind::PostEdit,
            MutationTarget::post(&id),
            Some(CacheChange::Patch(PostPatch::default().with_title("edited"))),
            delayed(Err(AgoraError::NetworkFailure("gone".into()))),
        );
        cache.remove(&id);
        assert_eq!(log.cancel_target(&id), 1);
        assert!(handle.outcome().await.is_err());

        assert!(cache.get(&id).is_none());
        assert!(!cache.in_window(&FilterKey::default(), &id));
        assert_eq!(events.recv().await.unwrap().settlement, Settlement::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_delete_tombstones_post() {
        let cache = loaded_cache(2).await;
        let log = MutationLog::new(cache.clone());
        let id = PostId::from("p2");
        let handle = log.begin(
            MutationKind::PostDelete,
            MutationTarget::post(&id),
            Some(CacheChange::Detach),
            delayed(Ok(None)),
        );
        assert!(!cache.in_window(&FilterKey::default(), &id));
        handle.outcome().await.unwrap();
        assert!(cache.is_removed(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delete_puts_post_back() {
        let cache = loaded_cache(3).await;
        let log = MutationLog::new(cache.clone());
        let id = PostId::from("p2");
        let before = cache.snapshot(&FilterKey::default());
        let handle = log.begin(
            MutationKind::PostDelete,
            MutationTarget::post(&id),
            Some(CacheChange::Detach),
            delayed(Err(AgoraError::ValidationRejected {
                status: 403,
                message: "not yours".into(),
            })),
        );
        assert!(handle.outcome().await.is_err());
        assert_eq!(cache.snapshot(&FilterKey::default()), before);
    }

    #[test]
    fn new_comment_targets_differ_by_body() {
        let post = PostId::from("p1");
        assert_eq!(
            MutationTarget::new_comment(&post, "hi"),
            MutationTarget::new_comment(&post, "hi")
        );
        assert_ne!(
            MutationTarget::new_comment(&post, "hi").key,
            MutationTarget::new_comment(&post, "hello").key
        );
    }
}
