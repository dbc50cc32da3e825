// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contract against the LLM relevance classifier.

use async_trait::async_trait;

/// Decides whether buffered group chatter deserves a response.
///
/// The strategy string is composed by the caller at call time (late
/// binding: topic edits take effect immediately). Failures and timeouts
/// must resolve to `false` — the conservative "no response".
#[async_trait]
pub trait RelevanceFilter: Send + Sync {
    async fn should_respond(&self, current: &str, history: &str, strategy: &str) -> bool;
}
