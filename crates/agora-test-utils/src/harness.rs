// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end test harness.
//!
//! `TestHarness` assembles a complete engine over the in-memory board
//! service, the scriptable push transport, and a SQLite store in a temporary
//! directory. Reconnects use a fixed one-second backoff so paused-time tests
//! can step through them.

use std::sync::Arc;
use std::time::Duration;

use agora_config::{AgoraConfig, UpdatePolicy};
use agora_core::{AgoraError, ConnectionState, KeyValueStore};
use agora_engine::{EngineEvent, FeedEngine};
use agora_realtime::FixedBackoff;
use agora_storage::{Database, SqliteKvStore};
use tempfile::TempDir;
use tokio::sync::broadcast;

use crate::mock_remote::MockFeedApi;
use crate::mock_transport::MockTransport;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

pub struct TestHarnessBuilder {
    posts: usize,
    page_size: u32,
    policy: UpdatePolicy,
    debounce_ms: u64,
    signed_in: bool,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            posts: 0,
            page_size: 50,
            policy: UpdatePolicy::Eager,
            debounce_ms: 400,
            signed_in: false,
        }
    }

    /// Seed the board with posts `p1..=pn`.
    pub fn with_posts(mut self, n: usize) -> Self {
        self.posts = n;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_update_policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    /// Log in as the mock user before returning.
    pub fn signed_in(mut self) -> Self {
        self.signed_in = true;
        self
    }

    pub async fn build(self) -> Result<TestHarness, AgoraError> {
        let temp_dir =
            TempDir::new().map_err(|e| AgoraError::Storage(format!("temp dir: {e}")))?;
        let db = Database::open(temp_dir.path().join("agora.db"), true).await?;
        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKvStore::new(db));

        let api = Arc::new(MockFeedApi::new());
        api.seed_posts(self.posts);
        let transport = MockTransport::new();

        let mut config = AgoraConfig::default();
        config.api.page_size = self.page_size;
        config.reconciler.update_policy = self.policy;
        config.reconciler.debounce_ms = self.debounce_ms;

        let engine = FeedEngine::builder(api.clone(), store.clone())
            .with_config(&config)
            .with_transport(Arc::new(transport.clone()))
            .with_backoff(Box::new(FixedBackoff(RECONNECT_DELAY)))
            .build()
            .await?;
        let events = engine.subscribe();

        if self.signed_in {
            engine.login("kim", "password").await?;
        }

        Ok(TestHarness {
            api,
            transport,
            engine: Arc::new(engine),
            store,
            events,
            config,
            _temp_dir: temp_dir,
        })
    }
}

pub struct TestHarness {
    pub api: Arc<MockFeedApi>,
    pub transport: MockTransport,
    pub engine: Arc<FeedEngine>,
    pub store: Arc<dyn KeyValueStore>,
    pub events: broadcast::Receiver<EngineEvent>,
    pub config: AgoraConfig,
    _temp_dir: TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Waits until the push channel reports `state`.
    pub async fn wait_for_state(&self, state: ConnectionState) {
        while self.engine.connection_state() != state {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Every event received so far, without waiting.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut drained = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            drained.push(event);
        }
        drained
    }

    /// Builds a second engine over the same store, as after a restart.
    pub async fn restart(&self) -> Result<FeedEngine, AgoraError> {
        let mut config = self.config.clone();
        config.realtime.enabled = false;
        FeedEngine::builder(self.api.clone(), self.store.clone())
            .with_config(&config)
            .build()
            .await
    }
}
