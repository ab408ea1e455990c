// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire shapes of the board service's JSON responses.
//!
//! Every response carries an `ok` flag; errors carry an `error` message.

use agora_core::types::{CommentId, CommentSummary, PostId, PostSummary, User};
use serde::Deserialize;

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListPostsResponse {
    #[serde(default = "default_true")]
    pub ok: bool,
    #[serde(default)]
    pub posts: Vec<PostSummary>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PostResponse {
    #[serde(default = "default_true")]
    pub ok: bool,
    #[serde(default)]
    pub post: Option<PostSummary>,
}

#[derive(Debug, Deserialize)]
pub struct CommentsResponse {
    #[serde(default = "default_true")]
    pub ok: bool,
    #[serde(default)]
    pub comments: Vec<WireComment>,
}

#[derive(Debug, Deserialize)]
pub struct CommentResponse {
    #[serde(default)]
    pub comment: Option<WireComment>,
}

/// A comment as listed under its post. The post id is implied by the URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireComment {
    pub id: CommentId,
    #[serde(default)]
    pub post_id: Option<PostId>,
    #[serde(default)]
    pub body_md: String,
    #[serde(default, alias = "authorName")]
    pub author_display: String,
    #[serde(default)]
    pub created_at: i64,
    #[serde(default)]
    pub like_count: u64,
}

impl WireComment {
    pub fn into_summary(self, post_id: &PostId) -> CommentSummary {
        CommentSummary {
            id: self.id,
            post_id: self.post_id.unwrap_or_else(|| post_id.clone()),
            body_md: self.body_md,
            author_display: self.author_display,
            created_at: self.created_at,
            like_count: self.like_count,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostResponse {
    pub post_id: PostId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub liked: bool,
    #[serde(default)]
    pub like_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct MeResponse {
    #[serde(default = "default_true")]
    pub ok: bool,
    #[serde(default)]
    pub user: Option<User>,
}

/// Body of a non-2xx response.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}
