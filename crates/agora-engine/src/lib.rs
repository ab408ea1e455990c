// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client-side feed synchronization engine for the Agora board.
//!
//! [`FeedEngine`] keeps a windowed, locally materialized copy of the remote
//! feed consistent while the user paginates, while optimistic mutations are
//! in flight, and while push notifications arrive over a channel that may
//! drop and reconnect at any time.

pub mod cache;
pub mod engine;
pub mod events;
pub mod gateway;
pub mod local;
pub mod mutation;
pub mod reconciler;
pub mod render;
pub mod session;

pub use cache::{FeedCache, OpenPost, PageOutcome};
pub use engine::{FeedEngine, FeedEngineBuilder, FeedSnapshot};
pub use events::EngineEvent;
pub use local::{BookmarkEntry, Bookmarks, LocalPrefs};
pub use mutation::{CacheChange, MutationEvent, MutationLog, MutationTarget, Settlement};
pub use reconciler::{ActionKey, Reconciler};
pub use render::{Renderer, spawn_renderer};
pub use session::SessionStore;
