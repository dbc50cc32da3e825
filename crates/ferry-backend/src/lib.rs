// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client for the AI backend sub-process (JSON-RPC over stdio).
//!
//! The backend is a long-lived child process with thread/turn semantics:
//! requests flow down stdin, responses and streamed notifications come
//! back on stdout, one JSON object per line.

pub mod client;
pub mod protocol;

pub use client::{BackendClient, BackendConfig};
pub use protocol::BackendEvent;
