// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Ferry bridge.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed query
//! functions for sessions and the message buffer (buffered messages,
//! whitelist, trigger keywords, interest topics).

pub mod database;
pub mod migrations;
pub mod queries;

pub use database::Database;
