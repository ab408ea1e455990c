// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use agora_core::{ConnectionState, FilterKey, PostId, Session};
use tokio::sync::broadcast;

const EVENT_BUFFER: usize = 256;

/// Something the rendering layer should react to. Events carry identities,
/// not data; read the current state from the engine's snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    FeedChanged { key: FilterKey },
    PostChanged { id: PostId },
    CommentsChanged { post_id: PostId },
    PostRemoved { id: PostId },
    ConnectionChanged(ConnectionState),
    SessionChanged(Session),
    /// A user-facing message, such as a rolled-back mutation.
    Notice(String),
}

/// Cloneable sender side of the engine event stream.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            tx: broadcast::channel(EVENT_BUFFER).0,
        }
    }

    pub fn emit(&self, event: EngineEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
