// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Decoding of push channel text frames.
//!
//! The server sends `{"type": "event", "payload": {"kind", "postId", "category"?}}`.
//! Anything else (keepalive replies, other message types, garbage) yields `None`.

use agora_core::PushEnvelope;
use serde::Deserialize;

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    frame_type: String,
    payload: PushEnvelope,
}

pub fn parse_frame(text: &str) -> Option<PushEnvelope> {
    let frame: RawFrame = serde_json::from_str(text).ok()?;
    (frame.frame_type == "event").then_some(frame.payload)
}
