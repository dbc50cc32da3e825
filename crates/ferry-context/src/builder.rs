// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation assembly from the chat platform.

use std::sync::Arc;

use ferry_core::{ChatPort, ChatType, Conversation, FerryError, Message};
use tracing::warn;

/// Builds [`Conversation`] aggregates by fetching history and members
/// through the platform port.
pub struct ContextBuilder {
    port: Arc<dyn ChatPort>,
}

impl ContextBuilder {
    pub fn new(port: Arc<dyn ChatPort>) -> Self {
        Self { port }
    }

    /// Fetch up to `history_limit` messages and, for group chats, the
    /// member list (best-effort: a member fetch failure degrades to an
    /// empty list rather than failing the turn).
    pub async fn build_conversation(
        &self,
        chat_id: &str,
        chat_type: ChatType,
        current: Message,
        history_limit: usize,
    ) -> Result<Conversation, FerryError> {
        let history = self.port.chat_history(chat_id, history_limit).await?;

        let members = if chat_type == ChatType::Group {
            match self.port.chat_members(chat_id).await {
                Ok(members) => members,
                Err(e) => {
                    warn!(chat_id, error = %e, "member fetch failed, continuing without members");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Ok(Conversation {
            chat_id: chat_id.to_string(),
            chat_type,
            members,
            history,
            current,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ferry_core::Member;
    use std::path::PathBuf;

    struct StubPort {
        members_fail: bool,
    }

    #[async_trait]
    impl ChatPort for StubPort {
        async fn send_text(&self, _chat_id: &str, _text: &str) -> Result<(), FerryError> {
            Ok(())
        }

        async fn send_text_with_mentions(
            &self,
            _chat_id: &str,
            _text: &str,
            _mentions: &[Member],
            _mention_all: bool,
        ) -> Result<(), FerryError> {
            Ok(())
        }

        async fn add_reaction(&self, _msg_id: &str, _emoji: &str) -> Result<(), FerryError> {
            Ok(())
        }

        async fn chat_members(&self, _chat_id: &str) -> Result<Vec<Member>, FerryError> {
            if self.members_fail {
                return Err(FerryError::chat("members unavailable"));
            }
            Ok(vec![Member {
                user_id: "ou_1".to_string(),
                name: "Alice".to_string(),
            }])
        }

        async fn chat_history(
            &self,
            chat_id: &str,
            limit: usize,
        ) -> Result<Vec<Message>, FerryError> {
            let mut out = Vec::new();
            for i in 0..limit.min(2) {
                out.push(Message {
                    id: format!("m{i}"),
                    chat_id: chat_id.to_string(),
                    sender_id: "u1".to_string(),
                    sender_name: "Alice".to_string(),
                    content: format!("history {i}"),
                    msg_type: "text".to_string(),
                    create_time: i as i64,
                    is_bot: false,
                });
            }
            Ok(out)
        }

        async fn download_image(
            &self,
            _msg_id: &str,
            _image_key: &str,
        ) -> Result<PathBuf, FerryError> {
            Ok(PathBuf::new())
        }
    }

    fn current() -> Message {
        Message {
            id: "cur".to_string(),
            chat_id: "c1".to_string(),
            sender_id: "u2".to_string(),
            sender_name: "Bob".to_string(),
            content: "hello".to_string(),
            msg_type: "text".to_string(),
            create_time: 100,
            is_bot: false,
        }
    }

    #[tokio::test]
    async fn group_conversation_includes_members() {
        let builder = ContextBuilder::new(Arc::new(StubPort { members_fail: false }));
        let conv = builder
            .build_conversation("c1", ChatType::Group, current(), 10)
            .await
            .unwrap();
        assert_eq!(conv.history.len(), 2);
        assert_eq!(conv.members.len(), 1);
        assert_eq!(conv.current.id, "cur");
    }

    #[tokio::test]
    async fn p2p_conversation_skips_member_fetch() {
        let builder = ContextBuilder::new(Arc::new(StubPort { members_fail: true }));
        let conv = builder
            .build_conversation("c1", ChatType::P2p, current(), 10)
            .await
            .unwrap();
        assert!(conv.members.is_empty());
    }

    #[tokio::test]
    async fn member_fetch_failure_degrades_to_empty_list() {
        let builder = ContextBuilder::new(Arc::new(StubPort { members_fail: true }));
        let conv = builder
            .build_conversation("c1", ChatType::Group, current(), 10)
            .await
            .unwrap();
        assert!(conv.members.is_empty());
        assert_eq!(conv.history.len(), 2);
    }
}
