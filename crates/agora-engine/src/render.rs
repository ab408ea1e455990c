// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bridge from the engine event stream to a [`Renderer`].
//!
//! Events only name what changed. The bridge reads fresh snapshots from the
//! engine and hands them to the renderer, so a renderer never sees state
//! older than the event that triggered it.

use std::sync::Arc;

use agora_core::{ConnectionState, PostId, Session};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::cache::OpenPost;
use crate::engine::{FeedEngine, FeedSnapshot};
use crate::events::EngineEvent;

/// Paints engine state. Implementations must not block.
pub trait Renderer: Send + Sync + 'static {
    fn render_feed(&self, feed: &FeedSnapshot);

    fn render_post(&self, _post: &OpenPost) {}

    fn post_removed(&self, _id: &PostId) {}

    fn connection_changed(&self, _state: ConnectionState) {}

    fn session_changed(&self, _session: &Session) {}

    fn notice(&self, message: &str);
}

/// Forwards engine events to `renderer` until `cancel` fires.
pub fn spawn_renderer(
    engine: Arc<FeedEngine>,
    renderer: Arc<dyn Renderer>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut events = engine.subscribe();
    tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Ok(event) => dispatch(&engine, renderer.as_ref(), event),
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "renderer lagged, repainting everything");
                    repaint(&engine, renderer.as_ref());
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("renderer bridge stopped");
    })
}

fn open_matches(engine: &FeedEngine, id: &PostId) -> Option<OpenPost> {
    engine.opened().filter(|open| open.id == *id)
}

fn dispatch(engine: &FeedEngine, renderer: &dyn Renderer, event: EngineEvent) {
    match event {
        EngineEvent::FeedChanged { key } => {
            if key == engine.active_filter() {
                renderer.render_feed(&engine.snapshot());
            }
        }
        EngineEvent::PostChanged { id } => {
            let feed = engine.snapshot();
            if feed.posts.iter().any(|p| p.id == id) {
                renderer.render_feed(&feed);
            }
            if let Some(open) = open_matches(engine, &id) {
                renderer.render_post(&open);
            }
        }
        EngineEvent::CommentsChanged { post_id } => {
            if let Some(open) = open_matches(engine, &post_id) {
                renderer.render_post(&open);
            }
        }
        EngineEvent::PostRemoved { id } => {
            renderer.post_removed(&id);
            renderer.render_feed(&engine.snapshot());
        }
        EngineEvent::ConnectionChanged(state) => renderer.connection_changed(state),
        EngineEvent::SessionChanged(session) => renderer.session_changed(&session),
        EngineEvent::Notice(message) => renderer.notice(&message),
    }
}

fn repaint(engine: &FeedEngine, renderer: &dyn Renderer) {
    renderer.render_feed(&engine.snapshot());
    if let Some(open) = engine.opened() {
        renderer.render_post(&open);
    }
    renderer.connection_changed(engine.connection_state());
    renderer.session_changed(&engine.session());
}
