// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request-side contract against the AI backend sub-process.
//!
//! Stream events (deltas, turn completion) travel the other way, through
//! the backend client's event channel, and are not part of this trait.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::FerryError;

/// Thread and turn operations on the AI backend.
#[async_trait]
pub trait ThreadBackend: Send + Sync {
    /// Create a new thread and return its opaque id.
    async fn start_thread(&self) -> Result<String, FerryError>;

    /// Probe that a thread still exists on the backend. An error means the
    /// backend garbage-collected it and the caller must recreate.
    async fn resume_thread(&self, thread_id: &str) -> Result<(), FerryError>;

    /// Submit a turn (prompt plus optional local image paths) and return
    /// the turn id. Output streams back as events.
    async fn start_turn(
        &self,
        thread_id: &str,
        prompt: &str,
        images: &[PathBuf],
    ) -> Result<String, FerryError>;

    /// Interrupt the in-flight turn on a thread.
    async fn interrupt_turn(&self, thread_id: &str) -> Result<(), FerryError>;
}
