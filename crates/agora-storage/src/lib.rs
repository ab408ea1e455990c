// SPDX-FileCopyrightText: 2026 Agora Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable client state for the Agora feed engine.
//!
//! A WAL-mode SQLite database with embedded migrations holds the small set
//! of keys the engine persists across restarts. All access goes through
//! tokio-rusqlite's single background thread.

pub mod database;
pub mod kv;
pub mod memory;
pub mod migrations;

pub use database::Database;
pub use kv::SqliteKvStore;
pub use memory::MemoryKvStore;

