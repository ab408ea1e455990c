// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory board service.
//!
//! `MockFeedApi` implements `FeedApi` over a list of posts held in memory.
//! It pages with offset cursors, counts calls per operation, checks bearer
//! tokens, and can inject failures and latency.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use agora_core::types::{
    AuthGrant, CommentDraft, Credentials, LikeResult, PostDraft, PostEdit, Registration,
    ReportRequest, TargetRef, TargetType, excerpt,
};
use agora_core::{
    AgoraError, CommentId, CommentSummary, FeedApi, FilterKey, Page, PageQuery, PostId,
    PostSummary, Role, SortMode, User, UserId,
};
use async_trait::async_trait;

struct ApiState {
    posts: Vec<PostSummary>,
    comments: HashMap<PostId, Vec<CommentSummary>>,
    clock: i64,
    next_id: u64,
    calls: HashMap<String, usize>,
    failures: HashMap<String, VecDeque<AgoraError>>,
    accepted: HashSet<String>,
    login_token: String,
    last_token: Option<String>,
    latency: Duration,
    report_like_counts: bool,
    return_updated: bool,
    reports: Vec<ReportRequest>,
    user: User,
}

impl ApiState {
    fn tick(&mut self) -> i64 {
        self.clock += 1000;
        self.clock
    }

    fn post_mut(&mut self, id: &PostId) -> Result<&mut PostSummary, AgoraError> {
        self.posts
            .iter_mut()
            .find(|p| p.id == *id)
            .ok_or_else(not_found)
    }
}

fn not_found() -> AgoraError {
    AgoraError::ValidationRejected {
        status: 404,
        message: "not found".into(),
    }
}

pub struct MockFeedApi {
    state: Mutex<ApiState>,
}

impl MockFeedApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ApiState {
                posts: Vec::new(),
                comments: HashMap::new(),
                clock: 1_700_000_000_000,
                next_id: 0,
                calls: HashMap::new(),
                failures: HashMap::new(),
                accepted: HashSet::new(),
                login_token: "tok".into(),
                last_token: None,
                latency: Duration::ZERO,
                report_like_counts: true,
                return_updated: true,
                reports: Vec::new(),
                user: User {
                    id: UserId::from("u1"),
                    display_name: "kim".into(),
                    role: Role::Member,
                },
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ApiState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Server-side data

    /// A post newer than every post created so far. Not stored.
    pub fn make_post(&self, id: &str, category: &str) -> PostSummary {
        let created_at = self.state().tick();
        PostSummary {
            id: PostId::from(id),
            title: format!("title {id}"),
            body_excerpt: format!("body of {id}"),
            author_display: "ann".into(),
            category: category.into(),
            created_at,
            pinned: false,
            like_count: 0,
            comment_count: 0,
            can_edit: true,
            can_delete: true,
            liked: false,
            bookmarked: false,
        }
    }

    pub fn insert_post(&self, post: PostSummary) {
        self.state().posts.push(post);
    }

    /// Stores posts `p1..=pn` in category `free`, `pn` newest.
    pub fn seed_posts(&self, n: usize) {
        for i in 1..=n {
            let post = self.make_post(&format!("p{i}"), "free");
            self.insert_post(post);
        }
    }

    /// Changes a post's title without going through the API.
    pub fn edit_post_remote(&self, id: &PostId, title: &str) {
        if let Ok(post) = self.state().post_mut(id) {
            post.title = title.to_string();
        }
    }

    pub fn remove_post_remote(&self, id: &PostId) {
        self.state().posts.retain(|p| p.id != *id);
    }

    /// Adds a comment without going through the API.
    pub fn add_comment(&self, post_id: &PostId, body: &str) -> CommentSummary {
        let mut state = self.state();
        state.next_id += 1;
        let comment = CommentSummary {
            id: CommentId(format!("c{}", state.next_id)),
            post_id: post_id.clone(),
            body_md: body.to_string(),
            author_display: "lee".into(),
            created_at: state.tick(),
            like_count: 0,
        };
        state
            .comments
            .entry(post_id.clone())
            .or_default()
            .push(comment.clone());
        if let Ok(post) = state.post_mut(post_id) {
            post.comment_count += 1;
        }
        comment
    }

    pub fn post(&self, id: &PostId) -> Option<PostSummary> {
        self.state().posts.iter().find(|p| p.id == *id).cloned()
    }

    /// Every post the window for `key` would contain, in server order.
    pub fn feed(&self, key: &FilterKey) -> Vec<PostSummary> {
        let state = self.state();
        let mut posts: Vec<PostSummary> = state
            .posts
            .iter()
            .filter(|p| key.admits_category(&p.category))
            .filter(|p| {
                key.search.is_empty()
                    || p.title.contains(&key.search)
                    || p.body_excerpt.contains(&key.search)
            })
            .cloned()
            .collect();
        match key.sort {
            SortMode::Recency => posts.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            SortMode::Engagement => posts.sort_by(|a, b| {
                b.like_count
                    .cmp(&a.like_count)
                    .then(b.created_at.cmp(&a.created_at))
            }),
        }
        posts
    }

    pub fn reports(&self) -> Vec<ReportRequest> {
        self.state().reports.clone()
    }

    // Behavior

    /// Tokens in this set are valid; `login` hands out `token`.
    pub fn accept_token(&self, token: &str) {
        let mut state = self.state();
        state.accepted.insert(token.to_string());
        state.login_token = token.to_string();
    }

    pub fn revoke_token(&self, token: &str) {
        self.state().accepted.remove(token);
    }

    /// The next call to `op` fails with `error`. Queued per operation.
    pub fn fail_next(&self, op: &str, error: AgoraError) {
        self.state()
            .failures
            .entry(op.to_string())
            .or_default()
            .push_back(error);
    }

    /// Delay applied to every call, on the tokio clock.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    /// Whether like toggles report the resulting count. On by default.
    pub fn set_report_like_counts(&self, on: bool) {
        self.state().report_like_counts = on;
    }

    /// Whether edits return the updated post. On by default.
    pub fn set_return_updated(&self, on: bool) {
        self.state().return_updated = on;
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state().calls.get(op).copied().unwrap_or(0)
    }

    pub fn last_token(&self) -> Option<String> {
        self.state().last_token.clone()
    }

    /// Counts the call, waits out the latency, then applies injected
    /// failures and the token check.
    async fn enter(&self, op: &str, token: Option<&str>, needs_auth: bool) -> Result<(), AgoraError> {
        let latency = {
            let mut state = self.state();
            *state.calls.entry(op.to_string()).or_default() += 1;
            state.last_token = token.map(str::to_string);
            state.latency
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state();
        if let Some(error) = state.failures.get_mut(op).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        match token {
            Some(token) if !state.accepted.contains(token) => {
                Err(AgoraError::AuthInvalid("token expired".into()))
            }
            None if needs_auth => Err(AgoraError::AuthInvalid("missing token".into())),
            _ => Ok(()),
        }
    }
}

impl Default for MockFeedApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FeedApi for MockFeedApi {
    async fn list_posts(&self, token: Option<&str>, query: &PageQuery) -> Result<Page, AgoraError> {
        self.enter("list_posts", token, false).await?;
        let all = self.feed(&query.key);
        let start = match &query.cursor {
            Some(cursor) => cursor.parse::<usize>().map_err(|_| AgoraError::ValidationRejected {
                status: 400,
                message: "bad cursor".into(),
            })?,
            None => 0,
        };
        let start = start.min(all.len());
        let end = (start + query.page_size as usize).min(all.len());
        Ok(Page {
            posts: all[start..end].to_vec(),
            next_cursor: if end < all.len() {
                end.to_string()
            } else {
                String::new()
            },
        })
    }

    async fn get_post(&self, token: Option<&str>, id: &PostId) -> Result<PostSummary, AgoraError> {
        self.enter("get_post", token, false).await?;
        self.post(id).ok_or_else(not_found)
    }

    async fn create_post(&self, token: Option<&str>, draft: &PostDraft) -> Result<PostId, AgoraError> {
        self.enter("create_post", token, true).await?;
        let id = {
            let mut state = self.state();
            state.next_id += 1;
            format!("n{}", state.next_id)
        };
        let mut post = self.make_post(&id, &draft.category);
        post.title.clone_from(&draft.title);
        post.body_excerpt = excerpt(&draft.body_md);
        post.author_display = if draft.anonymous {
            "anonymous".into()
        } else {
            self.state().user.display_name.clone()
        };
        self.insert_post(post);
        Ok(PostId(id))
    }

    async fn update_post(
        &self,
        token: Option<&str>,
        id: &PostId,
        edit: &PostEdit,
    ) -> Result<Option<PostSummary>, AgoraError> {
        self.enter("update_post", token, true).await?;
        let mut state = self.state();
        let return_updated = state.return_updated;
        let post = state.post_mut(id)?;
        post.title.clone_from(&edit.title);
        post.body_excerpt = excerpt(&edit.body_md);
        post.category.clone_from(&edit.category);
        Ok(return_updated.then(|| post.clone()))
    }

    async fn delete_post(&self, token: Option<&str>, id: &PostId) -> Result<(), AgoraError> {
        self.enter("delete_post", token, true).await?;
        let mut state = self.state();
        state.post_mut(id)?;
        state.posts.retain(|p| p.id != *id);
        Ok(())
    }

    async fn list_comments(
        &self,
        token: Option<&str>,
        post_id: &PostId,
    ) -> Result<Vec<CommentSummary>, AgoraError> {
        self.enter("list_comments", token, false).await?;
        let state = self.state();
        if !state.posts.iter().any(|p| p.id == *post_id) {
            return Err(not_found());
        }
        Ok(state.comments.get(post_id).cloned().unwrap_or_default())
    }

    async fn create_comment(
        &self,
        token: Option<&str>,
        post_id: &PostId,
        draft: &CommentDraft,
    ) -> Result<Option<CommentSummary>, AgoraError> {
        self.enter("create_comment", token, true).await?;
        if self.post(post_id).is_none() {
            return Err(not_found());
        }
        Ok(Some(self.add_comment(post_id, &draft.body_md)))
    }

    async fn toggle_like(&self, token: Option<&str>, target: &TargetRef) -> Result<LikeResult, AgoraError> {
        self.enter("toggle_like", token, true).await?;
        let mut state = self.state();
        let report = state.report_like_counts;
        let (liked, count) = match target.target_type {
            TargetType::Post => {
                let post = state.post_mut(&PostId(target.target_id.clone()))?;
                post.liked = !post.liked;
                post.like_count = if post.liked {
                    post.like_count + 1
                } else {
                    post.like_count.saturating_sub(1)
                };
                (post.liked, post.like_count)
            }
            TargetType::Comment => {
                let comment = state
                    .comments
                    .values_mut()
                    .flatten()
                    .find(|c| c.id.0 == target.target_id)
                    .ok_or_else(not_found)?;
                comment.like_count += 1;
                (true, comment.like_count)
            }
        };
        Ok(LikeResult {
            liked,
            like_count: report.then_some(count),
        })
    }

    async fn report(&self, token: Option<&str>, report: &ReportRequest) -> Result<(), AgoraError> {
        self.enter("report", token, true).await?;
        self.state().reports.push(report.clone());
        Ok(())
    }

    async fn login(&self, _credentials: &Credentials) -> Result<AuthGrant, AgoraError> {
        self.enter("login", None, false).await?;
        let mut state = self.state();
        let token = state.login_token.clone();
        state.accepted.insert(token.clone());
        Ok(AuthGrant {
            token,
            user: state.user.clone(),
        })
    }

    async fn register(&self, _registration: &Registration) -> Result<(), AgoraError> {
        self.enter("register", None, false).await
    }

    async fn logout(&self, token: Option<&str>) -> Result<(), AgoraError> {
        self.enter("logout", token, true).await?;
        if let Some(token) = token {
            self.state().accepted.remove(token);
        }
        Ok(())
    }

    async fn me(&self, token: Option<&str>) -> Result<User, AgoraError> {
        self.enter("me", token, true).await?;
        Ok(self.state().user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pages_with_offset_cursors() {
        let api = MockFeedApi::new();
        api.seed_posts(5);
        let mut query = PageQuery {
            key: FilterKey::default(),
            cursor: None,
            page_size: 2,
        };
        let first = api.list_posts(None, &query).await.unwrap();
        assert_eq!(first.posts[0].id, PostId::from("p5"));
        assert_eq!(first.next_cursor, "2");
        query.cursor = Some("4".into());
        let last = api.list_posts(None, &query).await.unwrap();
        assert_eq!(last.posts.len(), 1);
        assert!(last.next_cursor.is_empty());
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let api = MockFeedApi::new();
        api.seed_posts(1);
        let err = api.get_post(Some("nope"), &PostId::from("p1")).await.unwrap_err();
        assert!(err.is_auth_invalid());
        assert_eq!(api.calls("get_post"), 1);
    }
}
