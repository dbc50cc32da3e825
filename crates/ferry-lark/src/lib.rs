// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thin adapter for a Lark-style enterprise chat platform.
//!
//! Outbound: a reqwest REST client implementing the `ChatPort` contract
//! (sends, reactions, member/history listing, image downloads) with
//! tenant-token caching. Inbound: a webhook endpoint that normalizes
//! event callbacks into `ChatEvent`s for the ingress pipeline.

pub mod client;
pub mod events;
pub mod webhook;

pub use client::{LarkClient, LarkConfig};
pub use events::parse_event;
