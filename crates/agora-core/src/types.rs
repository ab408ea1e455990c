// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data model shared by the engine, the remote client, and the push channel.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use strum::{Display, EnumString};

/// Number of characters of a post body kept as its feed excerpt.
pub const EXCERPT_CHARS: usize = 180;

/// Cuts a markdown body down to its feed excerpt on a character boundary.
pub fn excerpt(body: &str) -> String {
    body.chars().take(EXCERPT_CHARS).collect()
}

/// Remote ids arrive as strings or integers depending on the endpoint.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Int(i64),
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Int(n) => n.to_string(),
    })
}

macro_rules! opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserialize_id(deserializer).map($name)
            }
        }
    };
}

opaque_id!(
    /// Stable identifier of a post.
    PostId
);
opaque_id!(
    /// Stable identifier of a comment.
    CommentId
);
opaque_id!(
    /// Stable identifier of a user account.
    UserId
);

/// Permission tier of a signed-in user.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    #[default]
    Member,
    Moderator,
    Admin,
}

/// A signed-in user as reported by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    #[serde(default, alias = "nickname")]
    pub display_name: String,
    #[serde(default)]
    pub role: Role,
}

/// Authentication state. An empty token means anonymous, read-only access.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user: Option<User>,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.token.is_empty()
    }

    /// The bearer token to attach to a remote call, if any.
    pub fn bearer(&self) -> Option<&str> {
        if self.token.is_empty() {
            None
        } else {
            Some(&self.token)
        }
    }
}

/// Feed ordering requested from the remote service.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum SortMode {
    /// Newest first.
    #[default]
    #[serde(rename = "latest")]
    #[strum(serialize = "latest")]
    Recency,
    /// Most liked and commented first.
    #[serde(rename = "popular")]
    #[strum(serialize = "popular")]
    Engagement,
}

/// Category that selects every post.
pub const ALL_CATEGORIES: &str = "all";

/// Identifies one independent feed window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterKey {
    pub category: String,
    pub sort: SortMode,
    #[serde(default)]
    pub search: String,
}

impl FilterKey {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            sort: SortMode::default(),
            search: String::new(),
        }
    }

    pub fn with_sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_search(mut self, search: impl AsRef<str>) -> Self {
        self.search = search.as_ref().trim().to_string();
        self
    }

    /// True if a post of `category` can show up in this window.
    pub fn admits_category(&self, category: &str) -> bool {
        self.category == ALL_CATEGORIES || self.category == category
    }
}

impl Default for FilterKey {
    fn default() -> Self {
        Self::new(ALL_CATEGORIES)
    }
}

impl fmt::Display for FilterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.category, self.sort)?;
        if !self.search.is_empty() {
            write!(f, "?q={}", self.search)?;
        }
        Ok(())
    }
}

/// Feed-level view of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostSummary {
    pub id: PostId,
    #[serde(default)]
    pub title: String,
    #[serde(default, alias = "bodyMd")]
    pub body_excerpt: String,
    #[serde(default, alias = "authorName")]
    pub author_display: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub comment_count: u64,
    #[serde(default)]
    pub can_edit: bool,
    #[serde(default)]
    pub can_delete: bool,
    /// Whether the current user likes the post, as last reported by the server.
    #[serde(default, alias = "likedByMe")]
    pub liked: bool,
    /// Client-local: the post is in the bookmark set.
    #[serde(skip)]
    pub bookmarked: bool,
}

/// A comment on a post. Loaded per opened post, never part of a feed window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentSummary {
    pub id: CommentId,
    pub post_id: PostId,
    #[serde(default)]
    pub body_md: String,
    #[serde(default, alias = "authorName")]
    pub author_display: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub like_count: u64,
}

/// Update applied to a counter field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountUpdate {
    Set(u64),
    Add(i64),
}

impl CountUpdate {
    pub fn apply(self, current: u64) -> u64 {
        match self {
            CountUpdate::Set(n) => n,
            CountUpdate::Add(delta) if delta < 0 => current.saturating_sub(delta.unsigned_abs()),
            CountUpdate::Add(delta) => current.saturating_add(delta as u64),
        }
    }
}

fn compensate(update: CountUpdate, before: u64) -> CountUpdate {
    let after = update.apply(before);
    let delta = i128::from(before) - i128::from(after);
    CountUpdate::Add(i64::try_from(delta).unwrap_or(if delta < 0 { i64::MIN } else { i64::MAX }))
}

/// A partial update of a [`PostSummary`]. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostPatch {
    pub title: Option<String>,
    pub body_excerpt: Option<String>,
    pub author_display: Option<String>,
    pub category: Option<String>,
    pub created_at: Option<i64>,
    pub pinned: Option<bool>,
    pub like_count: Option<CountUpdate>,
    pub comment_count: Option<CountUpdate>,
    pub can_edit: Option<bool>,
    pub can_delete: Option<bool>,
    pub liked: Option<bool>,
    pub bookmarked: Option<bool>,
}

impl PostPatch {
    /// Patch that overwrites every server-owned field with `post`'s values.
    ///
    /// `bookmarked` is client-local and left alone.
    pub fn from_summary(post: &PostSummary) -> Self {
        Self {
            title: Some(post.title.clone()),
            body_excerpt: Some(post.body_excerpt.clone()),
            author_display: Some(post.author_display.clone()),
            category: Some(post.category.clone()),
            created_at: Some(post.created_at),
            pinned: Some(post.pinned),
            like_count: Some(CountUpdate::Set(post.like_count)),
            comment_count: Some(CountUpdate::Set(post.comment_count)),
            can_edit: Some(post.can_edit),
            can_delete: Some(post.can_delete),
            liked: Some(post.liked),
            bookmarked: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_body_excerpt(mut self, body: impl Into<String>) -> Self {
        self.body_excerpt = Some(body.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_like_count(mut self, update: CountUpdate) -> Self {
        self.like_count = Some(update);
        self
    }

    pub fn with_comment_count(mut self, update: CountUpdate) -> Self {
        self.comment_count = Some(update);
        self
    }

    pub fn with_liked(mut self, liked: bool) -> Self {
        self.liked = Some(liked);
        self
    }

    pub fn with_bookmarked(mut self, bookmarked: bool) -> Self {
        self.bookmarked = Some(bookmarked);
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merges the patch into `post`. Returns true if any field changed.
    pub fn apply(&self, post: &mut PostSummary) -> bool {
        let before = post.clone();
        if let Some(v) = &self.title {
            post.title.clone_from(v);
        }
        if let Some(v) = &self.body_excerpt {
            post.body_excerpt.clone_from(v);
        }
        if let Some(v) = &self.author_display {
            post.author_display.clone_from(v);
        }
        if let Some(v) = &self.category {
            post.category.clone_from(v);
        }
        if let Some(v) = self.created_at {
            post.created_at = v;
        }
        if let Some(v) = self.pinned {
            post.pinned = v;
        }
        if let Some(u) = self.like_count {
            post.like_count = u.apply(post.like_count);
        }
        if let Some(u) = self.comment_count {
            post.comment_count = u.apply(post.comment_count);
        }
        if let Some(v) = self.can_edit {
            post.can_edit = v;
        }
        if let Some(v) = self.can_delete {
            post.can_delete = v;
        }
        if let Some(v) = self.liked {
            post.liked = v;
        }
        if let Some(v) = self.bookmarked {
            post.bookmarked = v;
        }
        *post != before
    }

    /// The patch that restores every field this patch touches to its value in `post`.
    ///
    /// Counts are restored with a compensating `Add`, so increments applied
    /// by others in the meantime survive the undo.
    pub fn inverse_of(&self, post: &PostSummary) -> PostPatch {
        PostPatch {
            title: self.title.as_ref().map(|_| post.title.clone()),
            body_excerpt: self.body_excerpt.as_ref().map(|_| post.body_excerpt.clone()),
            author_display: self
                .author_display
                .as_ref()
                .map(|_| post.author_display.clone()),
            category: self.category.as_ref().map(|_| post.category.clone()),
            created_at: self.created_at.map(|_| post.created_at),
            pinned: self.pinned.map(|_| post.pinned),
            like_count: self.like_count.map(|u| compensate(u, post.like_count)),
            comment_count: self.comment_count.map(|u| compensate(u, post.comment_count)),
            can_edit: self.can_edit.map(|_| post.can_edit),
            can_delete: self.can_delete.map(|_| post.can_delete),
            liked: self.liked.map(|_| post.liked),
            bookmarked: self.bookmarked.map(|_| post.bookmarked),
        }
    }
}

/// One page of a feed window as returned by the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub posts: Vec<PostSummary>,
    /// Opaque cursor for the next page; empty when the feed is exhausted.
    pub next_cursor: String,
}

/// Parameters of a feed page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    pub key: FilterKey,
    pub cursor: Option<String>,
    pub page_size: u32,
}

/// Kind of entity a like or report points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TargetType {
    Post,
    Comment,
}

/// Reference to a likeable or reportable entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub target_type: TargetType,
    pub target_id: String,
}

impl TargetRef {
    pub fn post(id: &PostId) -> Self {
        Self {
            target_type: TargetType::Post,
            target_id: id.0.clone(),
        }
    }

    pub fn comment(id: &CommentId) -> Self {
        Self {
            target_type: TargetType::Comment,
            target_id: id.0.clone(),
        }
    }
}

/// Result of a like toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LikeResult {
    pub liked: bool,
    /// Authoritative like count, when the server reports one.
    pub like_count: Option<u64>,
}

/// A new post, also persisted as the composer draft.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDraft {
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body_md: String,
    #[serde(default)]
    pub anonymous: bool,
    /// Epoch ms when the draft was saved. Not sent on submission.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<i64>,
}

impl PostDraft {
    /// Trims the text fields and rejects an empty title or body.
    pub fn normalized(&self) -> Result<PostDraft, crate::AgoraError> {
        let title = self.title.trim().to_string();
        let body_md = self.body_md.trim().to_string();
        if title.is_empty() || body_md.is_empty() {
            return Err(crate::AgoraError::InvalidInput(
                "a post needs a title and a body".into(),
            ));
        }
        Ok(PostDraft {
            category: self.category.clone(),
            title,
            body_md,
            anonymous: self.anonymous,
            at: None,
        })
    }
}

/// Changes to an existing post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEdit {
    pub category: String,
    pub title: String,
    pub body_md: String,
}

impl PostEdit {
    /// The optimistic feed patch for this edit.
    pub fn to_patch(&self) -> PostPatch {
        PostPatch::default()
            .with_title(self.title.clone())
            .with_body_excerpt(excerpt(&self.body_md))
            .with_category(self.category.clone())
    }
}

/// A new comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentDraft {
    pub body_md: String,
    #[serde(default)]
    pub anonymous: bool,
}

/// A moderation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    #[serde(flatten)]
    pub target: TargetRef,
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

/// Login credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

/// A registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub nickname: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthGrant {
    pub token: String,
    pub user: User,
}

/// State of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ConnectionState {
    #[strum(serialize = "connecting")]
    Connecting,
    #[strum(serialize = "open")]
    Open,
    #[strum(serialize = "closed")]
    Closed,
}

/// Kind of change announced on the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    PostCreated,
    PostUpdated,
    PostRemoved,
    CommentCreated,
}

/// A change notification received on the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEnvelope {
    pub kind: EventKind,
    pub post_id: PostId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

/// Kind of optimistic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MutationKind {
    LikeToggle,
    BookmarkToggle,
    PostEdit,
    PostDelete,
    CommentCreate,
}

/// Lifecycle of an optimistic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum MutationStatus {
    InFlight,
    Confirmed,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post() -> PostSummary {
        PostSummary {
            id: PostId::from("p1"),
            title: "Hello".into(),
            body_excerpt: "body".into(),
            author_display: "ann".into(),
            category: "free".into(),
            created_at: 1_700_000_000_000,
            pinned: false,
            like_count: 3,
            comment_count: 1,
            can_edit: true,
            can_delete: false,
            liked: false,
            bookmarked: false,
        }
    }

    #[test]
    fn post_summary_accepts_wire_aliases_and_numeric_ids() {
        let json = r#"{"id": 42, "title": "t", "bodyMd": "md", "authorName": "kim",
                       "category": "free", "createdAt": 5, "likeCount": 2}"#;
        let p: PostSummary = serde_json::from_str(json).unwrap();
        assert_eq!(p.id, PostId::from("42"));
        assert_eq!(p.body_excerpt, "md");
        assert_eq!(p.author_display, "kim");
        assert_eq!(p.like_count, 2);
        assert!(!p.bookmarked);
    }

    #[test]
    fn sort_mode_wire_names() {
        assert_eq!(serde_json::to_string(&SortMode::Recency).unwrap(), "\"latest\"");
        assert_eq!(SortMode::Engagement.to_string(), "popular");
        assert_eq!("latest".parse::<SortMode>().unwrap(), SortMode::Recency);
    }

    #[test]
    fn filter_key_trims_search_and_displays() {
        let key = FilterKey::new("free").with_search("  rust ");
        assert_eq!(key.search, "rust");
        assert_eq!(key.to_string(), "free/latest?q=rust");
        assert!(FilterKey::default().admits_category("anything"));
        assert!(!key.admits_category("notice"));
    }

    #[test]
    fn count_update_saturates() {
        assert_eq!(CountUpdate::Add(-5).apply(2), 0);
        assert_eq!(CountUpdate::Add(2).apply(2), 4);
        assert_eq!(CountUpdate::Set(9).apply(2), 9);
    }

    #[test]
    fn count_undo_keeps_concurrent_increments() {
        let original = post();
        let patch = PostPatch::default().with_comment_count(CountUpdate::Add(1));
        let inverse = patch.inverse_of(&original);

        let mut p = original.clone();
        patch.apply(&mut p);
        // Someone else's comment lands while ours is in flight.
        PostPatch::default()
            .with_comment_count(CountUpdate::Add(1))
            .apply(&mut p);
        inverse.apply(&mut p);
        assert_eq!(p.comment_count, original.comment_count + 1);
    }

    #[test]
    fn patch_inverse_restores_touched_fields() {
        let original = post();
        let patch = PostPatch::default()
            .with_liked(true)
            .with_like_count(CountUpdate::Add(1));
        let inverse = patch.inverse_of(&original);

        let mut p = original.clone();
        assert!(patch.apply(&mut p));
        assert_eq!(p.like_count, 4);
        assert!(p.liked);
        inverse.apply(&mut p);
        assert_eq!(p, original);
    }

    #[test]
    fn from_summary_leaves_bookmark_alone() {
        let mut local = post();
        local.bookmarked = true;
        let mut server = post();
        server.title = "Edited".into();
        PostPatch::from_summary(&server).apply(&mut local);
        assert_eq!(local.title, "Edited");
        assert!(local.bookmarked);
    }

    #[test]
    fn push_envelope_payload_shape() {
        let env: PushEnvelope =
            serde_json::from_str(r#"{"kind":"comment_created","postId":"p9"}"#).unwrap();
        assert_eq!(env.kind, EventKind::CommentCreated);
        assert_eq!(env.post_id.as_str(), "p9");
        assert!(env.category.is_none());
    }

    #[test]
    fn draft_normalization_rejects_blank_fields() {
        let draft = PostDraft {
            category: "free".into(),
            title: "  ".into(),
            body_md: "text".into(),
            ..PostDraft::default()
        };
        assert!(matches!(
            draft.normalized(),
            Err(crate::AgoraError::InvalidInput(_))
        ));
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let body = "가".repeat(EXCERPT_CHARS + 10);
        assert_eq!(excerpt(&body).chars().count(), EXCERPT_CHARS);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn arb_count() -> impl Strategy<Value = Option<CountUpdate>> {
            prop_oneof![
                Just(None),
                (0u64..1000).prop_map(|n| Some(CountUpdate::Set(n))),
                (-50i64..50).prop_map(|d| Some(CountUpdate::Add(d))),
            ]
        }

        proptest! {
            #[test]
            fn apply_then_inverse_is_identity(
                likes in 0u64..1000,
                comments in 0u64..1000,
                like_update in arb_count(),
                comment_update in arb_count(),
                liked in proptest::option::of(any::<bool>()),
                title in proptest::option::of("[a-z]{0,12}"),
            ) {
                let mut original = post();
                original.like_count = likes;
                original.comment_count = comments;
                let patch = PostPatch {
                    title,
                    like_count: like_update,
                    comment_count: comment_update,
                    liked,
                    ..PostPatch::default()
                };
                let inverse = patch.inverse_of(&original);
                let mut p = original.clone();
                patch.apply(&mut p);
                inverse.apply(&mut p);
                prop_assert_eq!(p, original);
            }
        }
    }
}
