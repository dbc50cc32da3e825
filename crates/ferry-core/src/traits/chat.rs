// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound contract against the chat platform.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::FerryError;
use crate::types::{Member, Message};

/// REST-side operations of the chat platform.
///
/// Implementations are expected to enforce their own request timeouts
/// (the platform contract budgets 30 seconds per call).
#[async_trait]
pub trait ChatPort: Send + Sync {
    /// Send a plain text message to a chat.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), FerryError>;

    /// Send a text message with @ mentions. `mention_all` prepends an
    /// everyone-mention when the platform supports it.
    async fn send_text_with_mentions(
        &self,
        chat_id: &str,
        text: &str,
        mentions: &[Member],
        mention_all: bool,
    ) -> Result<(), FerryError>;

    /// Attach an emoji reaction to a message.
    async fn add_reaction(&self, msg_id: &str, emoji: &str) -> Result<(), FerryError>;

    /// List the members of a chat.
    async fn chat_members(&self, chat_id: &str) -> Result<Vec<Member>, FerryError>;

    /// Fetch up to `limit` recent messages, ordered oldest to newest.
    async fn chat_history(&self, chat_id: &str, limit: usize)
        -> Result<Vec<Message>, FerryError>;

    /// Download an image attachment to a local file and return its path.
    async fn download_image(
        &self,
        msg_id: &str,
        image_key: &str,
    ) -> Result<PathBuf, FerryError>;
}
