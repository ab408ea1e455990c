// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits the engine depends on.
//!
//! Both traits use `#[async_trait]` so implementations can be held as
//! `Arc<dyn Trait>` and swapped for mocks in tests.

pub mod remote;
pub mod store;

pub use remote::FeedApi;
pub use store::{KeyValueStore, KvWrite};
