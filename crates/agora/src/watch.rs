// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `agora watch`: follow the live feed until interrupted.

use std::sync::{Arc, Mutex, PoisonError};

use agora_core::{AgoraError, ConnectionState, FilterKey, PostId, PostSummary, Session};
use agora_engine::{FeedEngine, FeedSnapshot, OpenPost, Renderer, spawn_renderer};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Prints the feed to stdout, one line per post, whenever it changes.
///
/// Repaints are skipped when nothing visible changed.
#[derive(Default)]
pub struct LogRenderer {
    last: Mutex<Vec<String>>,
}

fn format_post(post: &PostSummary) -> String {
    let when = chrono::DateTime::from_timestamp_millis(post.created_at)
        .map(|t| t.format("%m-%d %H:%M").to_string())
        .unwrap_or_default();
    let mut flags = String::new();
    if post.pinned {
        flags.push('^');
    }
    if post.bookmarked {
        flags.push('*');
    }
    if post.liked {
        flags.push('+');
    }
    format!(
        "{when} [{}] {}{} ({}) likes {} comments {}",
        post.category,
        post.title,
        if flags.is_empty() { String::new() } else { format!(" {flags}") },
        post.author_display,
        post.like_count,
        post.comment_count,
    )
}

impl Renderer for LogRenderer {
    fn render_feed(&self, feed: &FeedSnapshot) {
        let lines: Vec<String> = feed.posts.iter().map(format_post).collect();
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if *last == lines {
            return;
        }
        println!("-- {} ({} posts{})", feed.key, lines.len(), if feed.exhausted { ", end" } else { "" });
        for line in &lines {
            println!("{line}");
        }
        *last = lines;
    }

    fn render_post(&self, post: &OpenPost) {
        if let Some(summary) = &post.post {
            println!("== {}", format_post(summary));
        }
        for comment in &post.comments {
            println!("   {}: {}", comment.author_display, comment.body_md);
        }
    }

    fn post_removed(&self, id: &PostId) {
        info!(post = %id, "post removed");
    }

    fn connection_changed(&self, state: ConnectionState) {
        match state {
            ConnectionState::Open => info!("live updates connected"),
            ConnectionState::Closed => warn!("live updates disconnected, reconnecting"),
            ConnectionState::Connecting => debug!("connecting to live updates"),
        }
    }

    fn session_changed(&self, session: &Session) {
        match &session.user {
            Some(user) => info!(user = %user.display_name, "signed in"),
            None => info!("signed out"),
        }
    }

    fn notice(&self, message: &str) {
        eprintln!("! {message}");
    }
}

/// Waits for SIGINT or SIGTERM and cancels the returned token.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT, stopping"),
                        _ = sigterm.recv() => info!("received SIGTERM, stopping"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "cannot install SIGTERM handler");
                    let _ = ctrl_c.await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, stopping");
        }

        token_clone.cancel();
    });

    token
}

pub async fn run_watch(engine: Arc<FeedEngine>, key: FilterKey, pages: u32) -> Result<(), AgoraError> {
    let shutdown = install_signal_handler();
    let renderer = Arc::new(LogRenderer::default());
    let bridge = spawn_renderer(engine.clone(), renderer, shutdown.child_token());

    if let Err(e) = engine.refresh_me().await {
        warn!(error = %e, "cannot verify saved session");
    }
    engine.set_filter(key).await?;
    for _ in 1..pages {
        if engine.snapshot().exhausted {
            break;
        }
        engine.load_more().await?;
    }

    info!("following the feed, press Ctrl+C to stop");
    shutdown.cancelled().await;
    if let Err(e) = bridge.await {
        warn!(error = %e, "renderer task ended abnormally");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_line_shows_flags_and_counts() {
        let post = PostSummary {
            id: PostId::from("p1"),
            title: "Hello".into(),
            body_excerpt: String::new(),
            author_display: "kim".into(),
            category: "free".into(),
            created_at: 0,
            pinned: true,
            like_count: 3,
            comment_count: 1,
            can_edit: false,
            can_delete: false,
            liked: true,
            bookmarked: false,
        };
        let line = format_post(&post);
        assert!(line.contains("[free] Hello ^+ (kim)"), "{line}");
        assert!(line.ends_with("likes 3 comments 1"));
    }
}
