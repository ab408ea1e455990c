// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push channel for the Agora feed engine.
//!
//! [`RealtimeChannel`] keeps one push connection alive: it sends keepalive
//! probes, treats prolonged silence as a drop, and reconnects after a
//! [`Backoff`] delay until torn down. Inbound change notifications and
//! connection state transitions are delivered as [`ChannelEvent`]s.

pub mod backoff;
pub mod channel;
pub mod envelope;
pub mod transport;

pub use backoff::{Backoff, FixedBackoff, JitterBackoff};
pub use channel::{ChannelEvent, RealtimeChannel, RealtimeSettings};
pub use envelope::parse_frame;
pub use transport::{Frame, PushConnection, PushTransport, WsTransport};
