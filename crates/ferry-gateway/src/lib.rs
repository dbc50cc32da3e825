// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Loopback HTTP tool surface for the Ferry bridge.
//!
//! The AI backend's tool-use subsystem manages its own notification
//! preferences (whitelist, trigger keywords, interest topics) and reads
//! chat context through this API while a turn is running.

pub mod handlers;
pub mod server;

pub use server::{router, serve, GatewayState};
