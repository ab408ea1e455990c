// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session-aware wrapper around [`FeedApi`].
//!
//! The token is read from the [`SessionStore`] immediately before each
//! dispatch. A call rejected with `AuthInvalid` clears the session, but only
//! if the rejected token is still the current one.

use std::sync::Arc;

use agora_core::types::{
    AuthGrant, CommentDraft, Credentials, LikeResult, PostDraft, PostEdit, Registration,
    ReportRequest, TargetRef,
};
use agora_core::{
    AgoraError, CommentSummary, FeedApi, Page, PageQuery, PostId, PostSummary, User,
};
use tracing::warn;

use crate::session::SessionStore;

#[derive(Clone)]
pub struct RemoteGateway {
    api: Arc<dyn FeedApi>,
    session: Arc<SessionStore>,
}

impl RemoteGateway {
    pub fn new(api: Arc<dyn FeedApi>, session: Arc<SessionStore>) -> Self {
        Self { api, session }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Current token for a call that needs a signed-in session.
    fn required_token(&self) -> Result<String, AgoraError> {
        self.session.token().ok_or(AgoraError::SignInRequired)
    }

    async fn settle<T>(
        &self,
        token: Option<&str>,
        result: Result<T, AgoraError>,
    ) -> Result<T, AgoraError> {
        if let (Err(AgoraError::AuthInvalid(reason)), Some(token)) = (&result, token) {
            match self.session.clear_if_current(token).await {
                Ok(true) => warn!(reason = %reason, "session token rejected, signed out"),
                Ok(false) => {}
                Err(e) => warn!(error = %e, "cannot persist sign-out after token rejection"),
            }
        }
        result
    }

    pub async fn list_posts(&self, query: &PageQuery) -> Result<Page, AgoraError> {
        let token = self.session.token();
        let result = self.api.list_posts(token.as_deref(), query).await;
        self.settle(token.as_deref(), result).await
    }

    pub async fn get_post(&self, id: &PostId) -> Result<PostSummary, AgoraError> {
        let token = self.session.token();
        let result = self.api.get_post(token.as_deref(), id).await;
        self.settle(token.as_deref(), result).await
    }

    pub async fn list_comments(&self, post_id: &PostId) -> Result<Vec<CommentSummary>, AgoraError> {
        let token = self.session.token();
        let result = self.api.list_comments(token.as_deref(), post_id).await;
        self.settle(token.as_deref(), result).await
    }

    pub async fn create_post(&self, draft: &PostDraft) -> Result<PostId, AgoraError> {
        let token = self.required_token()?;
        let result = self.api.create_post(Some(&token), draft).await;
        self.settle(Some(&token), result).await
    }

    pub async fn update_post(
        &self,
        id: &PostId,
        edit: &PostEdit,
    ) -> Result<Option<PostSummary>, AgoraError> {
        let token = self.required_token()?;
        let result = self.api.update_post(Some(&token), id, edit).await;
        self.settle(Some(&token), result).await
    }

    pub async fn delete_post(&self, id: &PostId) -> Result<(), AgoraError> {
        let token = self.required_token()?;
        let result = self.api.delete_post(Some(&token), id).await;
        self.settle(Some(&token), result).await
    }

    pub async fn create_comment(
        &self,
        post_id: &PostId,
        draft: &CommentDraft,
    ) -> Result<Option<CommentSummary>, AgoraError> {
        let token = self.required_token()?;
        let result = self.api.create_comment(Some(&token), post_id, draft).await;
        self.settle(Some(&token), result).await
    }

    pub async fn toggle_like(&self, target: &TargetRef) -> Result<LikeResult, AgoraError> {
        let token = self.required_token()?;
        let result = self.api.toggle_like(Some(&token), target).await;
        self.settle(Some(&token), result).await
    }

    pub async fn report(&self, report: &ReportRequest) -> Result<(), AgoraError> {
        let token = self.required_token()?;
        let result = self.api.report(Some(&token), report).await;
        self.settle(Some(&token), result).await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, AgoraError> {
        self.api.login(credentials).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<(), AgoraError> {
        self.api.register(registration).await
    }

    /// Server-side logout. Does not touch the local session.
    pub async fn logout(&self) -> Result<(), AgoraError> {
        let token = self.required_token()?;
        self.api.logout(Some(&token)).await
    }

    pub async fn me(&self) -> Result<User, AgoraError> {
        let token = self.required_token()?;
        let result = self.api.me(Some(&token)).await;
        self.settle(Some(&token), result).await
    }
}
