// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the board service REST API.
//!
//! Provides [`HttpFeedApi`], which builds requests, attaches the bearer
//! token, maps status codes onto [`AgoraError`], and retries idempotent
//! reads on transient failures.

use std::time::Duration;

use agora_config::ApiConfig;
use agora_core::types::{
    AuthGrant, CommentDraft, CommentSummary, Credentials, LikeResult, Page, PageQuery, PostDraft,
    PostEdit, PostId, PostSummary, Registration, ReportRequest, TargetRef, User, excerpt,
};
use agora_core::{AgoraError, FeedApi};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::{debug, warn};

use crate::types::{
    CommentResponse, CommentsResponse, CreatePostResponse, ErrorBody, LikeResponse,
    ListPostsResponse, LoginResponse, MeResponse, PostResponse,
};

/// Delay before retrying a transient read failure.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// [`FeedApi`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpFeedApi {
    client: reqwest::Client,
    base_url: Url,
    max_retries: u32,
}

impl HttpFeedApi {
    pub fn new(config: &ApiConfig) -> Result<Self, AgoraError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("agora/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgoraError::Config(format!("failed to build HTTP client: {e}")))?;

        // A trailing slash makes `Url::join` append instead of replace.
        let base = format!("{}/", config.base_url.trim_end_matches('/'));
        let base_url = Url::parse(&base)
            .map_err(|e| AgoraError::Config(format!("invalid api.base_url `{base}`: {e}")))?;

        Ok(Self {
            client,
            base_url,
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, AgoraError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| AgoraError::Internal(format!("bad request path `{path}`: {e}")))
    }

    fn post_url(&self, id: &PostId, suffix: &str) -> Result<Url, AgoraError> {
        let mut url = self.url("posts")?;
        url.path_segments_mut()
            .map_err(|_| AgoraError::Internal("base url cannot take path segments".into()))?
            .push(id.as_str());
        if !suffix.is_empty() {
            url.path_segments_mut()
                .map_err(|_| AgoraError::Internal("base url cannot take path segments".into()))?
                .push(suffix);
        }
        Ok(url)
    }

    /// Sends one request and decodes the 2xx body as `T`.
    ///
    /// GETs are retried up to `max_retries` times on network failures, 429
    /// and 5xx. Writes are never retried.
    async fn send<T, B>(
        &self,
        method: Method,
        url: Url,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<T, AgoraError>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let retries = if method == Method::GET {
            self.max_retries
        } else {
            0
        };
        let mut last_error = None;

        for attempt in 0..=retries {
            if attempt > 0 {
                warn!(attempt, %url, "retrying request after transient error");
                tokio::time::sleep(RETRY_DELAY).await;
            }

            let mut request = self.client.request(method.clone(), url.clone());
            if let Some(token) = token {
                request = request.bearer_auth(token);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = AgoraError::NetworkFailure(e.to_string());
                    if attempt < retries {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();
            debug!(%method, %url, status = %status, attempt, "response received");
            let text = response
                .text()
                .await
                .map_err(|e| AgoraError::NetworkFailure(format!("failed to read body: {e}")))?;

            if status.is_success() {
                let raw = if text.trim().is_empty() { "{}" } else { &text };
                return serde_json::from_str(raw).map_err(|e| {
                    AgoraError::Internal(format!("malformed response from {url}: {e}"))
                });
            }

            let err = classify_status(status, &text);
            if is_transient_error(status) && attempt < retries {
                warn!(status = %status, "transient error, will retry");
                last_error = Some(err);
                continue;
            }
            return Err(err);
        }

        Err(last_error
            .unwrap_or_else(|| AgoraError::NetworkFailure("request failed after retries".into())))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, token: Option<&str>) -> Result<T, AgoraError> {
        self.send::<T, ()>(Method::GET, url, token, None).await
    }
}

/// Maps a non-2xx response onto the error taxonomy.
fn classify_status(status: StatusCode, body: &str) -> AgoraError {
    let message = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    match status.as_u16() {
        401 => AgoraError::AuthInvalid(message),
        code @ 400..=499 => AgoraError::ValidationRejected {
            status: code,
            message,
        },
        code => AgoraError::ServerFault {
            status: code,
            message,
        },
    }
}

/// Returns true for status codes worth retrying.
fn is_transient_error(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn rejected_ok_flag(what: &str) -> AgoraError {
    AgoraError::ServerFault {
        status: 200,
        message: format!("{what} failed"),
    }
}

/// Feed rows carry an excerpt, never the full body.
fn into_feed_summary(mut post: PostSummary) -> PostSummary {
    if post.body_excerpt.chars().count() > agora_core::types::EXCERPT_CHARS {
        post.body_excerpt = excerpt(&post.body_excerpt);
    }
    post
}

#[async_trait]
impl FeedApi for HttpFeedApi {
    async fn list_posts(&self, token: Option<&str>, query: &PageQuery) -> Result<Page, AgoraError> {
        let mut url = self.url("posts")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("category", &query.key.category);
            pairs.append_pair("sort", &query.key.sort.to_string());
            if !query.key.search.is_empty() {
                pairs.append_pair("q", &query.key.search);
            }
            if let Some(cursor) = query.cursor.as_deref().filter(|c| !c.is_empty()) {
                pairs.append_pair("cursor", cursor);
            }
            pairs.append_pair("pageSize", &query.page_size.to_string());
        }

        let response: ListPostsResponse = self.get(url, token).await?;
        if !response.ok {
            return Err(rejected_ok_flag("feed load"));
        }
        Ok(Page {
            posts: response.posts.into_iter().map(into_feed_summary).collect(),
            next_cursor: response.next_cursor.unwrap_or_default(),
        })
    }

    async fn get_post(&self, token: Option<&str>, id: &PostId) -> Result<PostSummary, AgoraError> {
        let response: PostResponse = self.get(self.post_url(id, "")?, token).await?;
        match response.post {
            Some(post) if response.ok => Ok(into_feed_summary(post)),
            _ => Err(AgoraError::ValidationRejected {
                status: 404,
                message: format!("post {id} not found"),
            }),
        }
    }

    async fn create_post(&self, token: Option<&str>, draft: &PostDraft) -> Result<PostId, AgoraError> {
        let response: CreatePostResponse = self
            .send(Method::POST, self.url("posts")?, token, Some(draft))
            .await?;
        Ok(response.post_id)
    }

    async fn update_post(
        &self,
        token: Option<&str>,
        id: &PostId,
        edit: &PostEdit,
    ) -> Result<Option<PostSummary>, AgoraError> {
        let response: PostResponse = self
            .send(Method::PATCH, self.post_url(id, "")?, token, Some(edit))
            .await?;
        Ok(response.post.map(into_feed_summary))
    }

    async fn delete_post(&self, token: Option<&str>, id: &PostId) -> Result<(), AgoraError> {
        self.send::<IgnoredAny, ()>(Method::DELETE, self.post_url(id, "")?, token, None)
            .await?;
        Ok(())
    }

    async fn list_comments(
        &self,
        token: Option<&str>,
        post_id: &PostId,
    ) -> Result<Vec<CommentSummary>, AgoraError> {
        let response: CommentsResponse = self.get(self.post_url(post_id, "comments")?, token).await?;
        if !response.ok {
            return Err(rejected_ok_flag("comment load"));
        }
        Ok(response
            .comments
            .into_iter()
            .map(|c| c.into_summary(post_id))
            .collect())
    }

    async fn create_comment(
        &self,
        token: Option<&str>,
        post_id: &PostId,
        draft: &CommentDraft,
    ) -> Result<Option<CommentSummary>, AgoraError> {
        let response: CommentResponse = self
            .send(
                Method::POST,
                self.post_url(post_id, "comments")?,
                token,
                Some(draft),
            )
            .await?;
        Ok(response.comment.map(|c| c.into_summary(post_id)))
    }

    async fn toggle_like(&self, token: Option<&str>, target: &TargetRef) -> Result<LikeResult, AgoraError> {
        let response: LikeResponse = self
            .send(Method::POST, self.url("likes/toggle")?, token, Some(target))
            .await?;
        Ok(LikeResult {
            liked: response.liked,
            like_count: response.like_count,
        })
    }

    async fn report(&self, token: Option<&str>, report: &ReportRequest) -> Result<(), AgoraError> {
        self.send::<IgnoredAny, _>(Method::POST, self.url("reports")?, token, Some(report))
            .await?;
        Ok(())
    }

    async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, AgoraError> {
        let response: LoginResponse = self
            .send(Method::POST, self.url("auth/login")?, None, Some(credentials))
            .await?;
        Ok(AuthGrant {
            token: response.token,
            user: response.user,
        })
    }

    async fn register(&self, registration: &Registration) -> Result<(), AgoraError> {
        self.send::<IgnoredAny, _>(
            Method::POST,
            self.url("auth/register")?,
            None,
            Some(registration),
        )
        .await?;
        Ok(())
    }

    async fn logout(&self, token: Option<&str>) -> Result<(), AgoraError> {
        self.send::<IgnoredAny, ()>(Method::POST, self.url("auth/logout")?, token, None)
            .await?;
        Ok(())
    }

    async fn me(&self, token: Option<&str>) -> Result<User, AgoraError> {
        let response: MeResponse = self.get(self.url("auth/me")?, token).await?;
        match response.user {
            Some(user) if response.ok => Ok(user),
            _ => Err(AgoraError::AuthInvalid("session has no user".into())),
        }
    }
}
