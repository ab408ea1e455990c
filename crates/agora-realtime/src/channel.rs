// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection state machine of the push channel.
//!
//! `CONNECTING -> OPEN` on handshake, `OPEN -> CLOSED` on transport error,
//! server close or missed keepalive, and `CLOSED -> CONNECTING` after a
//! backoff delay. There is no terminal state until [`RealtimeChannel::shutdown`],
//! which also cancels a pending backoff sleep.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use agora_config::RealtimeConfig;
use agora_core::{AgoraError, ConnectionState, PushEnvelope};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backoff::Backoff;
use crate::envelope::parse_frame;
use crate::transport::{Frame, PushConnection, PushTransport};

/// Capacity of the event channel handed to the consumer.
const EVENT_BUFFER: usize = 256;

/// Something the consumer of the channel must react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    State(ConnectionState),
    Envelope(PushEnvelope),
}

/// Resolved connection parameters.
#[derive(Debug, Clone)]
pub struct RealtimeSettings {
    pub url: String,
    pub keepalive: Duration,
    pub idle_timeout: Duration,
}

impl RealtimeSettings {
    pub fn from_config(config: &RealtimeConfig, api_base: &str) -> Self {
        Self {
            url: config.resolve_url(api_base),
            keepalive: config.keepalive(),
            idle_timeout: config.idle_timeout(),
        }
    }
}

/// Handle to the background task that owns the push connection.
pub struct RealtimeChannel {
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeChannel {
    /// Starts connecting immediately. The returned receiver yields state
    /// transitions and decoded envelopes in arrival order.
    pub fn spawn(
        transport: Arc<dyn PushTransport>,
        backoff: Box<dyn Backoff>,
        settings: RealtimeSettings,
    ) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let cancel = CancellationToken::new();

        let worker = Worker {
            transport,
            backoff,
            settings,
            state: state_tx,
            events: events_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());

        (
            Self {
                state: state_rx,
                cancel,
                task: Mutex::new(Some(task)),
            },
            events_rx,
        )
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Closes the connection, cancels any pending reconnect, and waits for
    /// the background task to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "push channel task ended abnormally");
            }
        }
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Why a connection stopped pumping.
enum Exit {
    Cancelled,
    Dropped(AgoraError),
}

struct Worker {
    transport: Arc<dyn PushTransport>,
    backoff: Box<dyn Backoff>,
    settings: RealtimeSettings,
    state: watch::Sender<ConnectionState>,
    events: mpsc::Sender<ChannelEvent>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        info!(url = %self.settings.url, "push channel starting");
        loop {
            self.transition(ConnectionState::Connecting).await;

            let connected = tokio::select! {
                _ = self.cancel.cancelled() => break,
                result = self.transport.connect(&self.settings.url) => result,
            };

            match connected {
                Ok(mut conn) => {
                    self.backoff.reset();
                    self.transition(ConnectionState::Open).await;
                    let exit = self.pump(conn.as_mut()).await;
                    conn.close().await;
                    self.transition(ConnectionState::Closed).await;
                    match exit {
                        Exit::Cancelled => break,
                        Exit::Dropped(e) => warn!(error = %e, "push channel dropped"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "push channel connect failed");
                    self.transition(ConnectionState::Closed).await;
                }
            }

            let delay = self.backoff.next_delay();
            debug!(delay_ms = delay.as_millis() as u64, "push channel reconnect scheduled");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        self.transition(ConnectionState::Closed).await;
        info!("push channel stopped");
    }

    async fn pump(&mut self, conn: &mut dyn PushConnection) -> Exit {
        let keepalive_every = self.settings.keepalive;
        let idle_timeout = self.settings.idle_timeout;
        let mut keepalive = tokio::time::interval_at(Instant::now() + keepalive_every, keepalive_every);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let idle = tokio::time::sleep(idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Exit::Cancelled,
                _ = keepalive.tick() => {
                    trace!("sending keepalive");
                    if let Err(e) = conn.send_keepalive().await {
                        return Exit::Dropped(e);
                    }
                }
                _ = &mut idle => {
                    return Exit::Dropped(AgoraError::ChannelDropped(format!(
                        "no traffic for {}s",
                        idle_timeout.as_secs()
                    )));
                }
                frame = conn.next_frame() => match frame {
                    None => return Exit::Dropped(AgoraError::ChannelDropped("closed by server".into())),
                    Some(Err(e)) => return Exit::Dropped(e),
                    Some(Ok(frame)) => {
                        idle.as_mut().reset(Instant::now() + idle_timeout);
                        if let Frame::Text(text) = frame {
                            match parse_frame(&text) {
                                Some(envelope) => {
                                    debug!(kind = %envelope.kind, post_id = %envelope.post_id, "push event");
                                    // A closed receiver means nobody is listening; keep the
                                    // connection so state stays observable.
                                    let _ = self.events.send(ChannelEvent::Envelope(envelope)).await;
                                }
                                None => trace!(len = text.len(), "ignoring non-event frame"),
                            }
                        }
                    }
                },
            }
        }
    }

    /// Publishes a state change. Repeated states are not re-announced.
    async fn transition(&self, next: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(state = %next, "push channel state");
            let _ = self.events.send(ChannelEvent::State(next)).await;
        }
    }
}
