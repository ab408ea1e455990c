// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns push notifications and mutation settlements into targeted cache
//! refreshes.
//!
//! Actions are keyed and debounced: every event for a key pushes that key's
//! deadline out by the quiet period, so a burst collapses into one action
//! that fires after the burst ends. Removals skip the queue and apply at once.
//! The reconciler is a single task; events and due actions are processed one
//! at a time.

use std::collections::HashMap;
use std::time::Duration;

use agora_config::UpdatePolicy;
use agora_core::{ConnectionState, CountUpdate, EventKind, MutationKind, PostId, PostPatch, PushEnvelope};
use agora_realtime::ChannelEvent;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::cache::{FeedCache, PageOutcome};
use crate::events::{EngineEvent, EventBus};
use crate::gateway::RemoteGateway;
use crate::mutation::{MutationEvent, MutationLog, Settlement};

/// A deferred refresh, identified by what it refreshes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionKey {
    /// Refetch the first page of the active window.
    FeedHead,
    /// Reload the active window from scratch.
    FeedReload,
    /// Refetch one post.
    Post(PostId),
    /// Refetch the comments of the open post.
    Comments(PostId),
    /// Bump the comment count of a post that is not open.
    CommentCount(PostId),
}

impl ActionKey {
    fn post_id(&self) -> Option<&PostId> {
        match self {
            ActionKey::FeedHead | ActionKey::FeedReload => None,
            ActionKey::Post(id) | ActionKey::Comments(id) | ActionKey::CommentCount(id) => Some(id),
        }
    }
}

struct Scheduled {
    due: Instant,
    /// Events folded into this action.
    hits: u64,
}

/// Lets the engine queue actions on the reconciler.
#[derive(Clone)]
pub struct ReconcilerHandle {
    tx: mpsc::UnboundedSender<ActionKey>,
}

impl ReconcilerHandle {
    pub fn schedule(&self, key: ActionKey) {
        if self.tx.send(key).is_err() {
            debug!("reconciler stopped, dropping action");
        }
    }
}

pub struct Reconciler {
    cache: FeedCache,
    log: MutationLog,
    gateway: RemoteGateway,
    events: EventBus,
    policy: UpdatePolicy,
    debounce: Duration,
    pending: HashMap<ActionKey, Scheduled>,
    /// Our own confirmed comments per post whose push echo has not arrived.
    own_comments: HashMap<PostId, u32>,
    seen_open: bool,
}

impl Reconciler {
    pub fn new(
        cache: FeedCache,
        log: MutationLog,
        gateway: RemoteGateway,
        events: EventBus,
        policy: UpdatePolicy,
        debounce: Duration,
    ) -> Self {
        Self {
            cache,
            log,
            gateway,
            events,
            policy,
            debounce,
            pending: HashMap::new(),
            own_comments: HashMap::new(),
            seen_open: false,
        }
    }

    /// Runs the reconciler until `cancel` fires. `channel` is `None` when
    /// push updates are disabled.
    pub fn spawn(
        self,
        channel: Option<mpsc::Receiver<ChannelEvent>>,
        cancel: CancellationToken,
    ) -> (ReconcilerHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mutations = self.log.subscribe();
        let task = tokio::spawn(self.run(channel, mutations, rx, cancel));
        (ReconcilerHandle { tx }, task)
    }

    async fn run(
        mut self,
        mut channel: Option<mpsc::Receiver<ChannelEvent>>,
        mut mutations: broadcast::Receiver<MutationEvent>,
        mut requests: mpsc::UnboundedReceiver<ActionKey>,
        cancel: CancellationToken,
    ) {
        let mut mutations_open = true;
        let mut requests_open = true;
        loop {
            let next_due = self.pending.values().map(|s| s.due).min();
            tokio::select! {
                _ = cancel.cancelled() => break,
                event = next_channel_event(&mut channel) => match event {
                    Some(event) => self.on_channel_event(event),
                    None => {
                        debug!("push channel closed");
                        channel = None;
                    }
                },
                event = mutations.recv(), if mutations_open => match event {
                    Ok(event) => self.on_mutation(event),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "reconciler lagged behind mutation events");
                        self.schedule(ActionKey::FeedHead);
                    }
                    Err(broadcast::error::RecvError::Closed) => mutations_open = false,
                },
                request = requests.recv(), if requests_open => match request {
                    Some(key) => self.schedule(key),
                    None => requests_open = false,
                },
                _ = sleep_until(next_due), if next_due.is_some() => self.run_due().await,
            }
        }
        debug!(pending = self.pending.len(), "reconciler stopped");
    }

    /// Queues `key`, or pushes its deadline out if it is already queued.
    ///
    /// Actions that read the server's state absorb queued actions that would
    /// only adjust ours: a post refetch replaces a pending comment-count bump,
    /// a reload replaces a pending head refresh.
    fn schedule(&mut self, key: ActionKey) {
        let key = match key {
            ActionKey::CommentCount(id) if self.pending.contains_key(&ActionKey::Post(id.clone())) => {
                ActionKey::Post(id)
            }
            ActionKey::FeedHead if self.pending.contains_key(&ActionKey::FeedReload) => {
                ActionKey::FeedReload
            }
            key => key,
        };
        match &key {
            ActionKey::Post(id) | ActionKey::Comments(id) => {
                self.pending.remove(&ActionKey::CommentCount(id.clone()));
            }
            ActionKey::FeedReload => {
                self.pending.remove(&ActionKey::FeedHead);
            }
            _ => {}
        }
        let due = Instant::now() + self.debounce;
        let entry = self
            .pending
            .entry(key.clone())
            .or_insert(Scheduled { due, hits: 0 });
        entry.due = due;
        entry.hits += 1;
        trace!(action = ?key, hits = entry.hits, "action scheduled");
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::State(state) => {
                self.events.emit(EngineEvent::ConnectionChanged(state));
                if state == ConnectionState::Open {
                    if self.seen_open {
                        info!("push channel reopened, resynchronizing");
                        self.resync();
                    }
                    self.seen_open = true;
                }
            }
            ChannelEvent::Envelope(envelope) => self.on_envelope(envelope),
        }
    }

    /// Recovers whatever was missed while the channel was down. The active
    /// window is reloaded, since removals during the gap are not replayed;
    /// other windows are dropped and load afresh when selected.
    fn resync(&mut self) {
        self.cache.drop_inactive();
        self.own_comments.clear();
        self.schedule(ActionKey::FeedReload);
        if let Some(id) = self.cache.open_id() {
            self.schedule(ActionKey::Post(id.clone()));
            self.schedule(ActionKey::Comments(id));
        }
    }

    fn on_envelope(&mut self, envelope: PushEnvelope) {
        let id = envelope.post_id;
        debug!(kind = %envelope.kind, post = %id, "push event");
        match envelope.kind {
            EventKind::PostCreated => {
                let active = self.cache.active();
                let admitted = envelope
                    .category
                    .as_deref()
                    .is_none_or(|c| active.admits_category(c));
                if admitted {
                    self.schedule(ActionKey::FeedHead);
                }
            }
            EventKind::PostUpdated => {
                let is_open = self.cache.open_id().as_ref() == Some(&id);
                match self.policy {
                    UpdatePolicy::Eager => {
                        if is_open || self.cache.get(&id).is_some() {
                            self.schedule(ActionKey::Post(id));
                        }
                    }
                    UpdatePolicy::Lazy => {
                        if is_open || self.cache.in_window(&self.cache.active(), &id) {
                            self.schedule(ActionKey::Post(id));
                        } else if self.cache.get(&id).is_some() {
                            self.cache.mark_stale(&id);
                        }
                    }
                }
            }
            EventKind::PostRemoved => self.remove_now(&id),
            EventKind::CommentCreated => {
                let echo = self.take_own_comment(&id);
                if self.cache.open_id().as_ref() == Some(&id) {
                    self.schedule(ActionKey::Comments(id));
                } else if echo {
                    // Our count already includes it; let the server say so.
                    self.schedule(ActionKey::Post(id));
                } else {
                    self.schedule(ActionKey::CommentCount(id));
                }
            }
        }
    }

    fn take_own_comment(&mut self, id: &PostId) -> bool {
        match self.own_comments.get_mut(id) {
            Some(n) if *n > 1 => {
                *n -= 1;
                true
            }
            Some(_) => {
                self.own_comments.remove(id);
                true
            }
            None => false,
        }
    }

    fn remove_now(&mut self, id: &PostId) {
        let was_open = self.cache.open_id().as_ref() == Some(id);
        self.cache.remove(id);
        self.log.cancel_target(id);
        self.pending.retain(|key, _| key.post_id() != Some(id));
        self.own_comments.remove(id);
        info!(post = %id, was_open, "post removed");
        self.events.emit(EngineEvent::PostRemoved { id: id.clone() });
    }

    fn on_mutation(&mut self, event: MutationEvent) {
        let post_id = event.target.post_id.clone();
        match event.settlement {
            Settlement::Confirmed { authoritative } => {
                let is_open = self.cache.open_id().as_ref() == Some(&post_id);
                match event.kind {
                    MutationKind::PostDelete => {
                        self.pending.retain(|key, _| key.post_id() != Some(&post_id));
                        self.events.emit(EngineEvent::PostRemoved { id: post_id });
                        return;
                    }
                    MutationKind::BookmarkToggle => {}
                    MutationKind::CommentCreate => {
                        *self.own_comments.entry(post_id.clone()).or_default() += 1;
                        self.schedule(ActionKey::Post(post_id.clone()));
                        if is_open {
                            self.schedule(ActionKey::Comments(post_id.clone()));
                        }
                    }
                    MutationKind::LikeToggle if event.target.comment_id.is_some() => {
                        if !authoritative && is_open {
                            self.schedule(ActionKey::Comments(post_id.clone()));
                        }
                        self.events.emit(EngineEvent::CommentsChanged {
                            post_id: post_id.clone(),
                        });
                    }
                    MutationKind::LikeToggle | MutationKind::PostEdit => {
                        if !authoritative {
                            self.schedule(ActionKey::Post(post_id.clone()));
                        }
                    }
                }
                self.events.emit(EngineEvent::PostChanged { id: post_id });
            }
            Settlement::RolledBack(error) => {
                self.events.emit(EngineEvent::Notice(format!(
                    "{} failed: {}",
                    describe(event.kind),
                    error.user_message()
                )));
                self.events.emit(EngineEvent::PostChanged { id: post_id });
                self.events.emit(EngineEvent::FeedChanged {
                    key: self.cache.active(),
                });
            }
            Settlement::Cancelled => {}
        }
    }

    async fn run_due(&mut self) {
        let now = Instant::now();
        let mut due: Vec<(ActionKey, Scheduled)> = Vec::new();
        self.pending.retain(|key, scheduled| {
            if scheduled.due <= now {
                due.push((key.clone(), Scheduled { due: scheduled.due, hits: scheduled.hits }));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(_, s)| s.due);
        for (key, scheduled) in due {
            debug!(action = ?key, coalesced = scheduled.hits, "running action");
            self.run_action(key, scheduled.hits).await;
        }
    }

    async fn run_action(&mut self, key: ActionKey, hits: u64) {
        match key {
            ActionKey::FeedHead => {
                let active = self.cache.active();
                match self.cache.refresh_head(&active).await {
                    Ok(PageOutcome::Loaded { .. }) => {
                        self.events.emit(EngineEvent::FeedChanged { key: active });
                    }
                    Ok(_) => {}
                    Err(e) => warn!(key = %active, error = %e, "head refresh failed"),
                }
            }
            ActionKey::FeedReload => {
                let active = self.cache.active();
                match self.cache.load_first_page(&active).await {
                    Ok(PageOutcome::Loaded { .. }) => {
                        self.events.emit(EngineEvent::FeedChanged { key: active });
                    }
                    Ok(_) => {}
                    Err(e) => warn!(key = %active, error = %e, "feed reload failed"),
                }
            }
            ActionKey::Post(id) => {
                if self.cache.is_removed(&id) {
                    return;
                }
                match self.gateway.get_post(&id).await {
                    Ok(post) => {
                        if self.cache.merge_post(post) {
                            self.events.emit(EngineEvent::PostChanged { id });
                        }
                    }
                    Err(e) if e.is_not_found() => self.remove_now(&id),
                    Err(e) => warn!(post = %id, error = %e, "post refetch failed"),
                }
            }
            ActionKey::Comments(id) => {
                if self.cache.open_id().as_ref() != Some(&id) {
                    return;
                }
                match self.gateway.list_comments(&id).await {
                    Ok(comments) => {
                        let count = comments.len() as u64;
                        if self.cache.set_comments(&id, comments) {
                            self.cache.apply_patch(
                                &id,
                                &PostPatch::default().with_comment_count(CountUpdate::Set(count)),
                            );
                            self.events.emit(EngineEvent::CommentsChanged { post_id: id.clone() });
                            self.events.emit(EngineEvent::PostChanged { id });
                        }
                    }
                    Err(e) if e.is_not_found() => self.remove_now(&id),
                    Err(e) => warn!(post = %id, error = %e, "comment refetch failed"),
                }
            }
            ActionKey::CommentCount(id) => {
                let delta = i64::try_from(hits).unwrap_or(i64::MAX);
                let patch = PostPatch::default().with_comment_count(CountUpdate::Add(delta));
                if self.cache.apply_patch(&id, &patch) {
                    self.events.emit(EngineEvent::PostChanged { id });
                }
            }
        }
    }
}

fn describe(kind: MutationKind) -> &'static str {
    match kind {
        MutationKind::LikeToggle => "like",
        MutationKind::BookmarkToggle => "bookmark",
        MutationKind::PostEdit => "edit",
        MutationKind::PostDelete => "delete",
        MutationKind::CommentCreate => "comment",
    }
}

async fn next_channel_event(channel: &mut Option<mpsc::Receiver<ChannelEvent>>) -> Option<ChannelEvent> {
    match channel {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::Bookmarks;
    use crate::mutation::{CacheChange, MutationTarget, RemoteCall};
    use crate::session::SessionStore;
    use agora_core::FilterKey;
    use futures::FutureExt;
    use agora_storage::MemoryKvStore;
    use agora_test_utils::MockFeedApi;
    use std::sync::Arc;

    const DEBOUNCE: Duration = Duration::from_millis(400);

    struct Rig {
        api: Arc<MockFeedApi>,
        cache: FeedCache,
        log: MutationLog,
        push: mpsc::Sender<ChannelEvent>,
        events: broadcast::Receiver<EngineEvent>,
        cancel: CancellationToken,
    }

    async fn rig(policy: UpdatePolicy, posts: usize) -> Rig {
        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(posts);
        let kv = Arc::new(MemoryKvStore::new());
        let session = Arc::new(SessionStore::load(kv.clone()).await.unwrap());
        let bookmarks = Arc::new(Bookmarks::load(kv).await.unwrap());
        let gateway = RemoteGateway::new(api.clone(), session);
        let cache = FeedCache::new(gateway.clone(), bookmarks, 50);
        cache.load_first_page(&FilterKey::default()).await.unwrap();
        let log = MutationLog::new(cache.clone());
        let bus = EventBus::new();
        let events = bus.subscribe();
        let (push, rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        Reconciler::new(cache.clone(), log.clone(), gateway, bus, policy, DEBOUNCE)
            .spawn(Some(rx), cancel.clone());
        Rig {
            api,
            cache,
            log,
            push,
            events,
            cancel,
        }
    }

    fn envelope(kind: EventKind, id: &str) -> ChannelEvent {
        ChannelEvent::Envelope(PushEnvelope {
            kind,
            post_id: PostId::from(id),
            category: None,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn comment_burst_collapses_into_one_refetch() {
        let rig = rig(UpdatePolicy::Eager, 2).await;
        let id = PostId::from("p1");
        rig.cache.set_open(&id);
        rig.api.add_comment(&id, "first");

        let start = Instant::now();
        for i in 0..3 {
            if i > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            rig.push.send(envelope(EventKind::CommentCreated, "p1")).await.unwrap();
        }
        // Last event at ~200ms; the refetch is due at ~600ms.
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(rig.api.calls("list_comments"), 0);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rig.api.calls("list_comments"), 1);
        assert!(start.elapsed() >= Duration::from_millis(600));

        let open = rig.cache.open_post().unwrap();
        assert_eq!(open.comments.len(), 1);
        assert_eq!(open.post.unwrap().comment_count, 1);
        rig.cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn comment_counts_for_closed_posts_are_summed() {
        let rig = rig(UpdatePolicy::Eager, 2).await;
        for _ in 0..3 {
            rig.push.send(envelope(EventKind::CommentCreated, "p2")).await.unwrap();
        }
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(rig.cache.get(&PostId::from("p2")).unwrap().comment_count, 3);
        assert_eq!(rig.api.calls("list_comments"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn removal_is_immediate_and_drops_pending_work() {
        let mut rig = rig(UpdatePolicy::Eager, 2).await;
        rig.push.send(envelope(EventKind::PostUpdated, "p1")).await.unwrap();
        rig.push.send(envelope(EventKind::PostRemoved, "p1")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!rig.cache.in_window(&FilterKey::default(), &PostId::from("p1")));

        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(rig.api.calls("get_post"), 0);
        let mut removed = false;
        while let Ok(event) = rig.events.try_recv() {
            removed |= event == EngineEvent::PostRemoved { id: PostId::from("p1") };
        }
        assert!(removed);
    }

    #[tokio::test(start_paused = true)]
    async fn eager_update_refetches_cached_post() {
        let rig = rig(UpdatePolicy::Eager, 2).await;
        rig.api.edit_post_remote(&PostId::from("p2"), "retitled");
        rig.push.send(envelope(EventKind::PostUpdated, "p2")).await.unwrap();
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(rig.api.calls("get_post"), 1);
        assert_eq!(rig.cache.get(&PostId::from("p2")).unwrap().title, "retitled");
    }

    #[tokio::test(start_paused = true)]
    async fn lazy_update_marks_off_window_posts_stale() {
        let rig = rig(UpdatePolicy::Lazy, 2).await;
        // Load a second window, then make it the only one holding p9.
        let notice = FilterKey::new("notice");
        rig.api.insert_post(rig.api.make_post("p9", "notice"));
        rig.cache.load_first_page(&notice).await.unwrap();
        rig.push.send(envelope(EventKind::PostUpdated, "p9")).await.unwrap();
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(rig.api.calls("get_post"), 0);
        assert!(rig.cache.take_stale(&PostId::from("p9")));
    }

    #[tokio::test(start_paused = true)]
    async fn post_created_outside_active_category_is_ignored() {
        let rig = rig(UpdatePolicy::Eager, 1).await;
        rig.cache.set_active(FilterKey::new("free"));
        rig.cache.load_first_page(&FilterKey::new("free")).await.unwrap();
        let before = rig.api.calls("list_posts");
        rig.push
            .send(ChannelEvent::Envelope(PushEnvelope {
                kind: EventKind::PostCreated,
                post_id: PostId::from("p5"),
                category: Some("notice".into()),
            }))
            .await
            .unwrap();
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(rig.api.calls("list_posts"), before);
    }

    #[tokio::test(start_paused = true)]
    async fn reopen_after_drop_resyncs_once() {
        let rig = rig(UpdatePolicy::Eager, 1).await;
        let before = rig.api.calls("list_posts");
        for state in [
            ConnectionState::Open,
            ConnectionState::Closed,
            ConnectionState::Connecting,
            ConnectionState::Open,
        ] {
            rig.push.send(ChannelEvent::State(state)).await.unwrap();
        }
        tokio::time::sleep(DEBOUNCE * 3).await;
        assert_eq!(rig.api.calls("list_posts"), before + 1);
    }

    /// Posts a comment on `post` through the log; the server stores it and
    /// confirms without returning it.
    async fn comment_as_self(rig: &Rig, post: &str) {
        let id = PostId::from(post);
        let api = rig.api.clone();
        let on = id.clone();
        let remote: RemoteCall = async move {
            api.add_comment(&on, "mine");
            Ok(None)
        }
        .boxed();
        rig.log
            .begin(
                MutationKind::CommentCreate,
                MutationTarget::new_comment(&id, "mine"),
                Some(CacheChange::Patch(
                    PostPatch::default().with_comment_count(CountUpdate::Add(1)),
                )),
                remote,
            )
            .outcome()
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn own_comment_echo_after_confirmation_is_not_counted_twice() {
        let rig = rig(UpdatePolicy::Eager, 2).await;
        let id = PostId::from("p2");
        comment_as_self(&rig, "p2").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        rig.push.send(envelope(EventKind::CommentCreated, "p2")).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rig.api.post(&id).unwrap().comment_count, 1);
        assert_eq!(rig.cache.get(&id).unwrap().comment_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn own_comment_echo_after_refetch_is_not_counted_twice() {
        let rig = rig(UpdatePolicy::Eager, 2).await;
        let id = PostId::from("p2");
        comment_as_self(&rig, "p2").await;
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(rig.cache.get(&id).unwrap().comment_count, 1);

        rig.push.send(envelope(EventKind::CommentCreated, "p2")).await.unwrap();
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(rig.cache.get(&id).unwrap().comment_count, 1);

        // Someone else's comment still bumps the count.
        rig.api.add_comment(&id, "theirs");
        rig.push.send(envelope(EventKind::CommentCreated, "p2")).await.unwrap();
        tokio::time::sleep(DEBOUNCE * 2).await;
        assert_eq!(rig.cache.get(&id).unwrap().comment_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn echo_before_confirmation_is_absorbed_by_refetch() {
        let rig = rig(UpdatePolicy::Eager, 2).await;
        let id = PostId::from("p2");
        let confirming = tokio::spawn({
            let api = rig.api.clone();
            let log = rig.log.clone();
            let on = id.clone();
            async move {
                // Stored at once; the response reaches us after the push.
                let remote: RemoteCall = async move {
                    api.add_comment(&on, "mine");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(None)
                }
                .boxed();
                log.begin(
                    MutationKind::CommentCreate,
                    MutationTarget::new_comment(&PostId::from("p2"), "mine"),
                    Some(CacheChange::Patch(
                        PostPatch::default().with_comment_count(CountUpdate::Add(1)),
                    )),
                    remote,
                )
                .outcome()
                .await
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        rig.push.send(envelope(EventKind::CommentCreated, "p2")).await.unwrap();
        confirming.await.unwrap().unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rig.cache.get(&id).unwrap().comment_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn removal_during_outage_is_recovered_on_reopen() {
        let rig = rig(UpdatePolicy::Eager, 3).await;
        let key = FilterKey::default();
        for state in [ConnectionState::Open, ConnectionState::Closed] {
            rig.push.send(ChannelEvent::State(state)).await.unwrap();
        }
        rig.api.remove_post_remote(&PostId::from("p2"));
        for state in [ConnectionState::Connecting, ConnectionState::Open] {
            rig.push.send(ChannelEvent::State(state)).await.unwrap();
        }
        tokio::time::sleep(DEBOUNCE * 3).await;

        assert!(!rig.cache.in_window(&key, &PostId::from("p2")));
        let ids: Vec<String> = rig.cache.snapshot(&key).into_iter().map(|p| p.id.0).collect();
        assert_eq!(ids, vec!["p3", "p1"]);
    }
}
