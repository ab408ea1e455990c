// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The remote board service as seen by the engine.

use async_trait::async_trait;

use crate::error::AgoraError;
use crate::types::{
    AuthGrant, CommentDraft, CommentSummary, Credentials, LikeResult, Page, PageQuery, PostDraft,
    PostEdit, PostId, PostSummary, Registration, ReportRequest, TargetRef, User,
};

/// Request/response surface of the board service.
///
/// Every method takes the bearer token explicitly. Callers read it from the
/// session immediately before dispatch; implementations never cache it.
/// Failures are classified into the [`AgoraError`] taxonomy: 401 maps to
/// `AuthInvalid`, other 4xx to `ValidationRejected`, 5xx to `ServerFault`,
/// and transport errors to `NetworkFailure`.
#[async_trait]
pub trait FeedApi: Send + Sync + 'static {
    /// Fetches one page of a feed window.
    async fn list_posts(&self, token: Option<&str>, query: &PageQuery)
    -> Result<Page, AgoraError>;

    /// Fetches the current summary of a single post.
    async fn get_post(&self, token: Option<&str>, id: &PostId) -> Result<PostSummary, AgoraError>;

    /// Creates a post and returns its id.
    async fn create_post(&self, token: Option<&str>, draft: &PostDraft)
    -> Result<PostId, AgoraError>;

    /// Edits a post. Returns the updated summary when the server includes one.
    async fn update_post(
        &self,
        token: Option<&str>,
        id: &PostId,
        edit: &PostEdit,
    ) -> Result<Option<PostSummary>, AgoraError>;

    /// Deletes a post.
    async fn delete_post(&self, token: Option<&str>, id: &PostId) -> Result<(), AgoraError>;

    /// Lists the comments of a post, oldest first.
    async fn list_comments(
        &self,
        token: Option<&str>,
        post_id: &PostId,
    ) -> Result<Vec<CommentSummary>, AgoraError>;

    /// Adds a comment. Returns the stored comment when the server includes one.
    async fn create_comment(
        &self,
        token: Option<&str>,
        post_id: &PostId,
        draft: &CommentDraft,
    ) -> Result<Option<CommentSummary>, AgoraError>;

    /// Toggles the current user's like on a post or comment.
    async fn toggle_like(&self, token: Option<&str>, target: &TargetRef)
    -> Result<LikeResult, AgoraError>;

    /// Files a moderation report.
    async fn report(&self, token: Option<&str>, report: &ReportRequest) -> Result<(), AgoraError>;

    /// Exchanges credentials for a session token.
    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, AgoraError>;

    /// Creates an account. Does not sign in.
    async fn register(&self, registration: &Registration) -> Result<(), AgoraError>;

    /// Invalidates the token server-side.
    async fn logout(&self, token: Option<&str>) -> Result<(), AgoraError>;

    /// Returns the user the token belongs to.
    async fn me(&self, token: Option<&str>) -> Result<User, AgoraError>;
}
