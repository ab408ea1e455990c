// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The engine facade: wires the components together and exposes the
//! intents a UI issues.

use std::sync::{Arc, Mutex, PoisonError};

use agora_config::AgoraConfig;
use agora_core::types::{
    CommentDraft, Credentials, PostDraft, PostEdit, Registration, ReportRequest, TargetRef,
};
use agora_core::{
    AgoraError, CommentId, ConnectionState, CountUpdate, FeedApi, FilterKey, KeyValueStore,
    MutationKind, PostId, PostPatch, PostSummary, Session, User,
};
use agora_realtime::{
    Backoff, JitterBackoff, PushTransport, RealtimeChannel, RealtimeSettings, WsTransport,
};
use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{FeedCache, OpenPost, PageOutcome};
use crate::events::{EngineEvent, EventBus};
use crate::gateway::RemoteGateway;
use crate::local::{BookmarkEntry, Bookmarks, LocalPrefs};
use crate::mutation::{CacheChange, MutationLog, MutationTarget};
use crate::reconciler::{ActionKey, Reconciler, ReconcilerHandle};
use crate::session::SessionStore;

/// Read-only view of the active feed window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSnapshot {
    pub key: FilterKey,
    pub posts: Vec<PostSummary>,
    pub loaded: bool,
    pub exhausted: bool,
}

pub struct FeedEngineBuilder {
    api: Arc<dyn FeedApi>,
    store: Arc<dyn KeyValueStore>,
    config: AgoraConfig,
    transport: Option<Arc<dyn PushTransport>>,
    backoff: Option<Box<dyn Backoff>>,
}

impl FeedEngineBuilder {
    pub fn with_config(mut self, config: &AgoraConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Replaces the WebSocket transport.
    pub fn with_transport(mut self, transport: Arc<dyn PushTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the jittered reconnect backoff.
    pub fn with_backoff(mut self, backoff: Box<dyn Backoff>) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// Restores local state and starts the push channel and reconciler.
    pub async fn build(self) -> Result<FeedEngine, AgoraError> {
        let config = self.config;
        let session = Arc::new(SessionStore::load(self.store.clone()).await?);
        let bookmarks = Arc::new(Bookmarks::load(self.store.clone()).await?);
        let prefs = LocalPrefs::new(self.store);

        let gateway = RemoteGateway::new(self.api, session.clone());
        let cache = FeedCache::new(gateway.clone(), bookmarks.clone(), config.api.page_size);
        cache.set_active(prefs.load_filter().await);
        let log = MutationLog::new(cache.clone());
        let events = EventBus::new();
        let cancel = CancellationToken::new();

        let (channel, channel_events) = if config.realtime.enabled {
            let transport = self.transport.unwrap_or_else(|| Arc::new(WsTransport));
            let backoff = self
                .backoff
                .unwrap_or_else(|| Box::new(JitterBackoff::from_config(&config.realtime)));
            let settings = RealtimeSettings::from_config(&config.realtime, &config.api.base_url);
            info!(url = %settings.url, "starting push channel");
            let (channel, rx) = RealtimeChannel::spawn(transport, backoff, settings);
            (Some(channel), Some(rx))
        } else {
            info!("push updates disabled");
            (None, None)
        };

        let (reconciler, reconciler_task) = Reconciler::new(
            cache.clone(),
            log.clone(),
            gateway.clone(),
            events.clone(),
            config.reconciler.update_policy,
            config.reconciler.debounce(),
        )
        .spawn(channel_events, cancel.child_token());
        let session_task = spawn_session_watcher(&session, events.clone(), cancel.child_token());

        debug!(filter = %cache.active(), signed_in = session.is_signed_in(), "engine ready");
        Ok(FeedEngine {
            session,
            gateway,
            cache,
            log,
            bookmarks,
            prefs,
            events,
            reconciler,
            channel,
            cancel,
            tasks: Mutex::new(vec![reconciler_task, session_task]),
        })
    }
}

fn spawn_session_watcher(
    session: &SessionStore,
    events: EventBus,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut changes = session.on_change();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = changes.borrow_and_update().clone();
                    events.emit(EngineEvent::SessionChanged(current));
                }
            }
        }
    })
}

/// Client-side feed synchronization engine.
pub struct FeedEngine {
    session: Arc<SessionStore>,
    gateway: RemoteGateway,
    cache: FeedCache,
    log: MutationLog,
    bookmarks: Arc<Bookmarks>,
    prefs: LocalPrefs,
    events: EventBus,
    reconciler: ReconcilerHandle,
    channel: Option<RealtimeChannel>,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl FeedEngine {
    pub fn builder(api: Arc<dyn FeedApi>, store: Arc<dyn KeyValueStore>) -> FeedEngineBuilder {
        FeedEngineBuilder {
            api,
            store,
            config: AgoraConfig::default(),
            transport: None,
            backoff: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    pub fn session(&self) -> Session {
        self.session.get()
    }

    /// `Closed` when push updates are disabled.
    pub fn connection_state(&self) -> ConnectionState {
        self.channel
            .as_ref()
            .map_or(ConnectionState::Closed, RealtimeChannel::state)
    }

    fn require_session(&self) -> Result<(), AgoraError> {
        if self.session.is_signed_in() {
            Ok(())
        } else {
            Err(AgoraError::SignInRequired)
        }
    }

    fn page_loaded(&self, key: &FilterKey, result: Result<PageOutcome, AgoraError>) -> Result<(), AgoraError> {
        match result {
            Ok(PageOutcome::Loaded { .. }) => {
                self.events.emit(EngineEvent::FeedChanged { key: key.clone() });
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(key = %key, error = %e, "page load failed");
                self.events.emit(EngineEvent::Notice(format!(
                    "couldn't load posts: {}. Pull to retry.",
                    e.user_message()
                )));
                Err(e)
            }
        }
    }

    // Feed

    pub fn active_filter(&self) -> FilterKey {
        self.cache.active()
    }

    /// Switches the active window and loads it from the first page.
    pub async fn set_filter(&self, key: FilterKey) -> Result<(), AgoraError> {
        let previous = self.cache.active();
        if previous != key {
            self.cache.cancel(&previous);
            self.cache.set_active(key.clone());
            if let Err(e) = self.prefs.save_filter(&key).await {
                warn!(error = %e, "cannot persist filter preference");
            }
        }
        let result = self.cache.load_first_page(&key).await;
        self.page_loaded(&key, result)
    }

    /// Reloads the active window from its first page.
    pub async fn refresh(&self) -> Result<(), AgoraError> {
        let key = self.cache.active();
        let result = self.cache.load_first_page(&key).await;
        self.page_loaded(&key, result)
    }

    pub async fn load_more(&self) -> Result<(), AgoraError> {
        let key = self.cache.active();
        let result = self.cache.load_next_page(&key).await;
        self.page_loaded(&key, result)
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        let key = self.cache.active();
        FeedSnapshot {
            posts: self.cache.snapshot(&key),
            loaded: self.cache.is_loaded(&key),
            exhausted: self.cache.is_exhausted(&key),
            key,
        }
    }

    pub fn post(&self, id: &PostId) -> Option<PostSummary> {
        self.cache.get(id)
    }

    // Detail view

    /// Opens a post in detail view, fetching it and its comments together.
    pub async fn open_post(&self, id: &PostId) -> Result<OpenPost, AgoraError> {
        self.cache.set_open(id);
        let (post, comments) =
            futures::join!(self.gateway.get_post(id), self.gateway.list_comments(id));

        match post {
            Ok(post) => {
                self.cache.merge_post(post);
            }
            Err(e) if e.is_not_found() => {
                self.cache.remove(id);
                self.log.cancel_target(id);
                self.events.emit(EngineEvent::PostRemoved { id: id.clone() });
                return Err(e);
            }
            Err(e) => {
                self.cache.close_open();
                return Err(e);
            }
        }
        match comments {
            Ok(comments) => {
                let count = comments.len() as u64;
                self.cache.set_comments(id, comments);
                self.cache.apply_patch(
                    id,
                    &PostPatch::default().with_comment_count(CountUpdate::Set(count)),
                );
            }
            Err(e) => warn!(post = %id, error = %e, "cannot load comments"),
        }
        self.events.emit(EngineEvent::PostChanged { id: id.clone() });
        self.events.emit(EngineEvent::CommentsChanged { post_id: id.clone() });
        self.cache
            .open_post()
            .ok_or_else(|| AgoraError::Internal("opened post was closed concurrently".into()))
    }

    pub fn close_post(&self) {
        if let Some(id) = self.cache.close_open() {
            debug!(post = %id, "post closed");
        }
    }

    pub fn opened(&self) -> Option<OpenPost> {
        self.cache.open_post()
    }

    /// Returns the post, refetching it first if an update was deferred.
    pub async fn ensure_fresh(&self, id: &PostId) -> Result<Option<PostSummary>, AgoraError> {
        if self.cache.take_stale(id) {
            match self.gateway.get_post(id).await {
                Ok(post) => {
                    if self.cache.merge_post(post) {
                        self.events.emit(EngineEvent::PostChanged { id: id.clone() });
                    }
                }
                Err(e) => {
                    self.cache.mark_stale(id);
                    return Err(e);
                }
            }
        }
        Ok(self.cache.get(id))
    }

    // Optimistic mutations

    /// Toggles the like on a post. A second toggle while the first is in
    /// flight joins it instead of toggling back.
    pub async fn toggle_like(&self, id: &PostId) -> Result<(), AgoraError> {
        self.require_session()?;
        let optimistic = self.cache.get(id).map(|post| {
            let delta = if post.liked { -1 } else { 1 };
            CacheChange::Patch(
                PostPatch::default()
                    .with_liked(!post.liked)
                    .with_like_count(CountUpdate::Add(delta)),
            )
        });
        let gateway = self.gateway.clone();
        let target = TargetRef::post(id);
        let remote = async move {
            let result = gateway.toggle_like(&target).await?;
            Ok(result.like_count.map(|n| {
                CacheChange::Patch(
                    PostPatch::default()
                        .with_liked(result.liked)
                        .with_like_count(CountUpdate::Set(n)),
                )
            }))
        }
        .boxed();

        let handle = self
            .log
            .begin(MutationKind::LikeToggle, MutationTarget::post(id), optimistic, remote);
        if !handle.joined {
            self.events.emit(EngineEvent::PostChanged { id: id.clone() });
        }
        handle.outcome().await
    }

    pub async fn toggle_comment_like(
        &self,
        post_id: &PostId,
        comment_id: &CommentId,
    ) -> Result<(), AgoraError> {
        self.require_session()?;
        let gateway = self.gateway.clone();
        let target = TargetRef::comment(comment_id);
        let changed = comment_id.clone();
        let remote = async move {
            let result = gateway.toggle_like(&target).await?;
            Ok(result.like_count.map(|n| CacheChange::CommentLikes {
                comment_id: changed,
                update: CountUpdate::Set(n),
            }))
        }
        .boxed();
        self.log
            .begin(
                MutationKind::LikeToggle,
                MutationTarget::comment(post_id, comment_id),
                None,
                remote,
            )
            .outcome()
            .await
    }

    /// Adds or removes a bookmark. Local only, so no sign-in is needed.
    /// Returns whether the post is now bookmarked.
    pub async fn toggle_bookmark(&self, id: &PostId) -> Result<bool, AgoraError> {
        let bookmarked = !self.bookmarks.contains(id);
        let entry = if bookmarked {
            let post = self
                .cache
                .get(id)
                .ok_or_else(|| AgoraError::InvalidInput("post is not loaded".into()))?;
            Some(BookmarkEntry::of(&post))
        } else {
            None
        };

        let bookmarks = self.bookmarks.clone();
        let target = id.clone();
        let remote = async move {
            bookmarks.set(&target, entry).await?;
            Ok(None)
        }
        .boxed();
        let optimistic = CacheChange::Patch(PostPatch::default().with_bookmarked(bookmarked));
        let handle = self.log.begin(
            MutationKind::BookmarkToggle,
            MutationTarget::post(id),
            Some(optimistic),
            remote,
        );
        self.events.emit(EngineEvent::PostChanged { id: id.clone() });
        handle.outcome().await?;
        Ok(self.bookmarks.contains(id))
    }

    pub fn bookmarks(&self) -> Vec<(PostId, BookmarkEntry)> {
        self.bookmarks.list()
    }

    pub async fn edit_post(&self, id: &PostId, edit: PostEdit) -> Result<(), AgoraError> {
        self.require_session()?;
        if edit.title.trim().is_empty() || edit.body_md.trim().is_empty() {
            return Err(AgoraError::InvalidInput("a post needs a title and a body".into()));
        }
        let gateway = self.gateway.clone();
        let target = id.clone();
        let optimistic = CacheChange::Patch(edit.to_patch());
        let remote = async move {
            let updated = gateway.update_post(&target, &edit).await?;
            Ok(updated.map(|post| CacheChange::Patch(PostPatch::from_summary(&post))))
        }
        .boxed();
        let handle =
            self.log
                .begin(MutationKind::PostEdit, MutationTarget::post(id), Some(optimistic), remote);
        self.events.emit(EngineEvent::PostChanged { id: id.clone() });
        handle.outcome().await
    }

    /// Hides the post at once; it returns if the server refuses.
    pub async fn delete_post(&self, id: &PostId) -> Result<(), AgoraError> {
        self.require_session()?;
        let gateway = self.gateway.clone();
        let target = id.clone();
        let remote = async move {
            gateway.delete_post(&target).await?;
            Ok(None)
        }
        .boxed();
        let handle = self.log.begin(
            MutationKind::PostDelete,
            MutationTarget::post(id),
            Some(CacheChange::Detach),
            remote,
        );
        if !handle.joined {
            self.events.emit(EngineEvent::FeedChanged {
                key: self.cache.active(),
            });
        }
        handle.outcome().await
    }

    pub async fn create_comment(&self, post_id: &PostId, draft: CommentDraft) -> Result<(), AgoraError> {
        self.require_session()?;
        let body = draft.body_md.trim().to_string();
        if body.is_empty() {
            return Err(AgoraError::InvalidInput("a comment cannot be empty".into()));
        }
        let draft = CommentDraft {
            body_md: body,
            ..draft
        };
        let target = MutationTarget::new_comment(post_id, &draft.body_md);
        let gateway = self.gateway.clone();
        let on = post_id.clone();
        let remote = async move {
            let created = gateway.create_comment(&on, &draft).await?;
            Ok(created.map(CacheChange::AppendComment))
        }
        .boxed();
        let optimistic =
            CacheChange::Patch(PostPatch::default().with_comment_count(CountUpdate::Add(1)));
        let handle = self
            .log
            .begin(MutationKind::CommentCreate, target, Some(optimistic), remote);
        if !handle.joined {
            self.events.emit(EngineEvent::PostChanged { id: post_id.clone() });
        }
        handle.outcome().await
    }

    // Plain remote intents

    /// Publishes a post. The saved draft is cleared once the server accepts it.
    pub async fn create_post(&self, draft: &PostDraft) -> Result<PostId, AgoraError> {
        self.require_session()?;
        let draft = draft.normalized()?;
        let id = self.gateway.create_post(&draft).await?;
        info!(post = %id, "post created");
        if let Err(e) = self.prefs.clear_draft().await {
            warn!(error = %e, "cannot clear saved draft");
        }
        self.reconciler.schedule(ActionKey::FeedHead);
        Ok(id)
    }

    pub async fn report(&self, report: &ReportRequest) -> Result<(), AgoraError> {
        self.require_session()?;
        if report.reason.trim().is_empty() {
            return Err(AgoraError::InvalidInput("choose a reason for the report".into()));
        }
        self.gateway.report(report).await
    }

    // Session

    pub async fn login(&self, identifier: &str, password: &str) -> Result<User, AgoraError> {
        if identifier.trim().is_empty() || password.is_empty() {
            return Err(AgoraError::InvalidInput("enter your id and password".into()));
        }
        let credentials = Credentials {
            identifier: identifier.trim().to_string(),
            password: password.to_string(),
        };
        let grant = self.gateway.login(&credentials).await?;
        self.session
            .set_session(grant.token, Some(grant.user.clone()))
            .await?;
        // Per-user fields (likes, edit rights) change with the session.
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "feed refresh after login failed");
        }
        Ok(grant.user)
    }

    pub async fn register(&self, registration: &Registration) -> Result<(), AgoraError> {
        if registration.nickname.trim().is_empty() || registration.password.is_empty() {
            return Err(AgoraError::InvalidInput("nickname and password are required".into()));
        }
        self.gateway.register(registration).await
    }

    /// Signs out. The local session is cleared even if the server call fails.
    pub async fn logout(&self) -> Result<(), AgoraError> {
        if !self.session.is_signed_in() {
            return Ok(());
        }
        if let Err(e) = self.gateway.logout().await {
            warn!(error = %e, "server logout failed, clearing local session anyway");
        }
        self.session.clear().await?;
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "feed refresh after logout failed");
        }
        Ok(())
    }

    /// Validates a restored session against the server. The session is
    /// cleared only when the server rejects the token; other failures keep
    /// it for a later retry.
    pub async fn refresh_me(&self) -> Result<Option<User>, AgoraError> {
        let Some(token) = self.session.token() else {
            return Ok(None);
        };
        match self.gateway.me().await {
            Ok(user) => {
                if self.session.get().user.as_ref() != Some(&user) {
                    self.session.set_session(token, Some(user.clone())).await?;
                }
                Ok(Some(user))
            }
            Err(e) if e.is_auth_invalid() => Ok(None),
            Err(e) => Err(e),
        }
    }

    // Composer draft

    pub async fn save_draft(&self, draft: &PostDraft) -> Result<(), AgoraError> {
        self.prefs.save_draft(draft).await
    }

    pub async fn load_draft(&self) -> Result<Option<PostDraft>, AgoraError> {
        self.prefs.load_draft().await
    }

    pub async fn clear_draft(&self) -> Result<(), AgoraError> {
        self.prefs.clear_draft().await
    }

    /// Stops the push channel and background tasks. In-flight mutations
    /// still settle.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(channel) = &self.channel {
            channel.shutdown().await;
        }
        let tasks: Vec<_> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "engine task ended abnormally");
            }
        }
        info!(pending_mutations = self.log.pending_count(), "engine stopped");
    }
}

impl Drop for FeedEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
