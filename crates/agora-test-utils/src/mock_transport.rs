// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scriptable push transport.
//!
//! `MockTransport` implements `PushTransport` without a network. Tests push
//! frames into the current connection, drop it, make connects fail, and
//! count connects and keepalives.

use std::sync::{Arc, Mutex, PoisonError};

use agora_core::{AgoraError, PushEnvelope};
use agora_realtime::{Frame, PushConnection, PushTransport};
use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

/// `None` closes the connection cleanly.
type Item = Option<Result<Frame, AgoraError>>;

struct TransportState {
    current: Option<(u64, mpsc::UnboundedSender<Item>)>,
    next_id: u64,
    fail_next: usize,
    auto_pong: bool,
    keepalives: usize,
    urls: Vec<String>,
}

#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<TransportState>>,
    connects: Arc<watch::Sender<usize>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(TransportState {
                current: None,
                next_id: 0,
                fail_next: 0,
                auto_pong: true,
                keepalives: 0,
                urls: Vec::new(),
            })),
            connects: Arc::new(watch::channel(0).0),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, TransportState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The next `n` connect attempts fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.state().fail_next = n;
    }

    /// Whether a keepalive is answered with a pong. On by default.
    pub fn set_auto_pong(&self, on: bool) {
        self.state().auto_pong = on;
    }

    /// Successful connects so far.
    pub fn connect_count(&self) -> usize {
        *self.connects.borrow()
    }

    pub async fn wait_for_connects(&self, n: usize) {
        let mut rx = self.connects.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    pub fn keepalive_count(&self) -> usize {
        self.state().keepalives
    }

    pub fn urls(&self) -> Vec<String> {
        self.state().urls.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().current.is_some()
    }

    /// Delivers a text frame to the open connection. False if none is open.
    pub fn push_text(&self, text: &str) -> bool {
        self.send(Some(Ok(Frame::Text(text.to_string()))))
    }

    /// Delivers `envelope` wrapped the way the server sends events.
    pub fn push_envelope(&self, envelope: &PushEnvelope) -> bool {
        let frame = serde_json::json!({ "type": "event", "payload": envelope });
        self.push_text(&frame.to_string())
    }

    /// Fails the open connection with a transport error.
    pub fn drop_connection(&self) -> bool {
        let sent = self.send(Some(Err(AgoraError::ChannelDropped("mock drop".into()))));
        self.state().current = None;
        sent
    }

    /// Closes the open connection from the server side.
    pub fn close_connection(&self) -> bool {
        let sent = self.send(None);
        self.state().current = None;
        sent
    }

    fn send(&self, item: Item) -> bool {
        match &self.state().current {
            Some((_, tx)) => tx.send(item).is_ok(),
            None => false,
        }
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTransport for MockTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushConnection>, AgoraError> {
        let (id, tx, rx) = {
            let mut state = self.state();
            state.urls.push(url.to_string());
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(AgoraError::ChannelDropped("mock connect refused".into()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            let id = state.next_id;
            state.next_id += 1;
            state.current = Some((id, tx.clone()));
            (id, tx, rx)
        };
        self.connects.send_modify(|count| *count += 1);
        Ok(Box::new(MockConnection {
            id,
            rx,
            tx,
            state: self.state.clone(),
        }))
    }
}

struct MockConnection {
    id: u64,
    rx: mpsc::UnboundedReceiver<Item>,
    tx: mpsc::UnboundedSender<Item>,
    state: Arc<Mutex<TransportState>>,
}

#[async_trait]
impl PushConnection for MockConnection {
    async fn send_keepalive(&mut self) -> Result<(), AgoraError> {
        let auto_pong = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.keepalives += 1;
            state.auto_pong
        };
        if auto_pong {
            let _ = self.tx.send(Some(Ok(Frame::Other)));
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, AgoraError>> {
        self.rx.recv().await.flatten()
    }

    async fn close(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(&state.current, Some((id, _)) if *id == self.id) {
            state.current = None;
        }
    }
}
