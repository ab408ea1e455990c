// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Agora board service.
//!
//! [`HttpFeedApi`] implements [`agora_core::FeedApi`] over the board's JSON
//! REST surface and classifies every failure into the engine's error taxonomy.

pub mod client;
pub mod types;

pub use client::HttpFeedApi;
