// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Agora integration tests.
//!
//! Provides mock collaborators and a test harness for fast, deterministic
//! tests without a server or network.
//!
//! # Components
//!
//! - [`MockFeedApi`] - In-memory board service with call counting and failure injection
//! - [`MockTransport`] - Scriptable push transport
//! - [`TestHarness`] - Complete engine wired to the mocks and a temporary SQLite store

pub mod harness;
pub mod mock_remote;
pub mod mock_transport;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_remote::MockFeedApi;
pub use mock_transport::MockTransport;
