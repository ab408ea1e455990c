// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push transport abstraction and its WebSocket implementation.

use std::time::Duration;

use agora_core::AgoraError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// One inbound unit of traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    /// Control or binary traffic. Only proves the peer is alive.
    Other,
}

/// An open push connection.
#[async_trait]
pub trait PushConnection: Send {
    /// Sends the keepalive probe: a bare `ping` text frame, plus a protocol
    /// level ping where the transport has one.
    async fn send_keepalive(&mut self) -> Result<(), AgoraError>;

    /// Next inbound frame. `None` once the peer has closed the connection.
    async fn next_frame(&mut self) -> Option<Result<Frame, AgoraError>>;

    async fn close(&mut self);
}

/// Opens push connections.
#[async_trait]
pub trait PushTransport: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushConnection>, AgoraError>;
}

/// [`PushTransport`] over WebSocket.
#[derive(Debug, Clone, Default)]
pub struct WsTransport;

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn PushConnection>, AgoraError> {
        let (stream, response) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(url))
            .await
            .map_err(|_| AgoraError::ChannelDropped("connect timed out".into()))?
            .map_err(|e| AgoraError::ChannelDropped(format!("connect failed: {e}")))?;
        debug!(url, status = %response.status(), "push channel handshake complete");
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl PushConnection for WsConnection {
    async fn send_keepalive(&mut self) -> Result<(), AgoraError> {
        self.stream
            .send(Message::Text("ping".into()))
            .await
            .map_err(|e| AgoraError::ChannelDropped(format!("keepalive failed: {e}")))?;
        self.stream
            .send(Message::Ping(Vec::new().into()))
            .await
            .map_err(|e| AgoraError::ChannelDropped(format!("keepalive failed: {e}")))
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, AgoraError>> {
        match self.stream.next().await? {
            Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_string()))),
            Ok(Message::Close(frame)) => {
                debug!(?frame, "push channel closed by server");
                None
            }
            Ok(_) => Some(Ok(Frame::Other)),
            Err(e) => Some(Err(AgoraError::ChannelDropped(e.to_string()))),
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!(error = %e, "push channel close was not clean");
        }
    }
}
