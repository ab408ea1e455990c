// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Agora feed engine.
//!
//! Provides the shared data model, the error taxonomy, and the collaborator
//! traits ([`FeedApi`], [`KeyValueStore`]) that the engine is written against.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::AgoraError;
pub use traits::{FeedApi, KeyValueStore, KvWrite};
pub use types::{
    CommentId, CommentSummary, ConnectionState, CountUpdate, EventKind, FilterKey, MutationKind,
    MutationStatus, Page, PageQuery, PostId, PostPatch, PostSummary, PushEnvelope, Role, Session,
    SortMode, User, UserId,
};
