// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared across the Ferry bridge.
//!
//! Conventions: platform message timestamps (`create_time`, `last_msg_time`)
//! are Unix **milliseconds** from the chat platform's authoritative clock.
//! Row bookkeeping timestamps (`created_at`, `updated_at`, `last_reply_at`,
//! `processed_at`) are Unix **seconds**.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Chat kind as reported by the platform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Group,
    P2p,
}

/// A chat message, fully rendered: `@_user_N` placeholders have already been
/// replaced with display names by the event layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    /// Platform message type: "text", "image", "post", ...
    pub msg_type: String,
    /// Unix milliseconds, platform clock.
    pub create_time: i64,
    /// Whether the message was sent by the bot itself.
    pub is_bot: bool,
}

impl Message {
    /// Sender name with fallback to the sender id when the platform did not
    /// provide a display name.
    pub fn display_name(&self) -> &str {
        if self.sender_name.is_empty() {
            &self.sender_id
        } else {
            &self.sender_name
        }
    }

    pub fn is_after(&self, time_ms: i64) -> bool {
        self.create_time > time_ms
    }
}

/// A chat member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    pub name: String,
}

impl Member {
    /// The mention directive the backend emits to @ this member.
    pub fn mention_directive(&self) -> String {
        format!("[MENTION:{}:{}]", self.user_id, self.name)
    }
}

/// Conversation aggregate, built fresh for every turn.
///
/// Invariant: `current.id` may also appear in `history`; the slicing helpers
/// below always skip it.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub chat_id: String,
    pub chat_type: ChatType,
    pub members: Vec<Member>,
    /// Ordered oldest to newest.
    pub history: Vec<Message>,
    pub current: Message,
}

impl Conversation {
    pub fn is_group(&self) -> bool {
        self.chat_type == ChatType::Group
    }

    /// History with the current message filtered out.
    pub fn history_excluding_current(&self) -> Vec<Message> {
        self.history
            .iter()
            .filter(|m| m.id != self.current.id)
            .cloned()
            .collect()
    }

    /// History strictly newer than `time_ms`, excluding the current message.
    pub fn history_since(&self, time_ms: i64) -> Vec<Message> {
        self.history
            .iter()
            .filter(|m| m.is_after(time_ms) && m.id != self.current.id)
            .cloned()
            .collect()
    }

    /// History strictly after the anchor message id, excluding the current
    /// message. When the anchor is empty or missing from history (the
    /// platform may delete messages), falls back to `fallback_time_ms`.
    pub fn history_after_msg_id(&self, anchor_id: &str, fallback_time_ms: i64) -> Vec<Message> {
        if anchor_id.is_empty() {
            return self.history_since(fallback_time_ms);
        }

        let Some(idx) = self.history.iter().position(|m| m.id == anchor_id) else {
            return self.history_since(fallback_time_ms);
        };

        self.history[idx + 1..]
            .iter()
            .filter(|m| m.id != self.current.id)
            .cloned()
            .collect()
    }

    pub fn find_member(&self, user_id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.user_id == user_id)
    }
}

/// Session freshness policy.
#[derive(Debug, Clone, Copy)]
pub struct SessionPolicy {
    /// Idle timeout in seconds. Zero disables the idle check.
    pub idle_timeout_secs: i64,
    /// Daily reset hour in local time, 0-23. Negative disables the check.
    pub reset_hour: i32,
}

/// Persisted (chat -> backend thread) mapping with resumption cursors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub chat_id: String,
    pub thread_id: String,
    /// Unix seconds.
    pub created_at: i64,
    /// Unix seconds, bumped on every processed turn.
    pub updated_at: i64,
    /// Unix seconds of the bot's last reply.
    pub last_reply_at: i64,
    /// Unix milliseconds of the last processed message (fallback anchor).
    pub last_msg_time: i64,
    /// Id of the last processed message (primary resumption anchor).
    pub last_processed_msg_id: String,
}

impl Session {
    /// Whether the session may be resumed, evaluated against the local wall
    /// clock. Stale when the idle timeout elapsed since `updated_at`, or
    /// when the daily reset hour was crossed between `updated_at` and `now`.
    ///
    /// Sessions spanning a DST transition may reset slightly early or late;
    /// the boundary is intentionally computed in local time.
    pub fn is_fresh(&self, policy: &SessionPolicy, now: DateTime<Local>) -> bool {
        let now_secs = now.timestamp();

        if policy.idle_timeout_secs > 0 && now_secs - self.updated_at > policy.idle_timeout_secs {
            return false;
        }

        if (0..24).contains(&policy.reset_hour) {
            let Some(naive) = now
                .date_naive()
                .and_hms_opt(policy.reset_hour as u32, 0, 0)
            else {
                return true;
            };
            // An unrepresentable local time (DST gap) skips the reset check.
            let Some(reset) = now.timezone().from_local_datetime(&naive).earliest() else {
                return true;
            };
            let reset_secs = reset.timestamp();

            if now_secs >= reset_secs && self.updated_at < reset_secs {
                return false;
            }
            if now_secs < reset_secs && self.updated_at < reset_secs - 86_400 {
                return false;
            }
        }

        true
    }
}

/// A message parked for the hourly digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferedMessage {
    /// Auto-increment row id; zero before insert.
    pub id: i64,
    pub chat_id: String,
    /// Platform message id, unique per row.
    pub msg_id: String,
    pub content: String,
    pub sender_id: String,
    pub sender_name: String,
    /// Unix seconds at insert time.
    pub created_at: i64,
    pub processed: bool,
    /// Unix seconds, set when the digest consumed the row.
    pub processed_at: Option<i64>,
}

impl BufferedMessage {
    pub fn display_name(&self) -> &str {
        if self.sender_name.is_empty() {
            &self.sender_id
        } else {
            &self.sender_name
        }
    }
}

/// A chat that bypasses the relevance classifier entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub id: i64,
    pub chat_id: String,
    pub reason: String,
    pub added_by: String,
    /// Unix seconds.
    pub created_at: i64,
}

/// A keyword that triggers processing. Priority 2 triggers immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerKeyword {
    pub id: i64,
    pub keyword: String,
    pub priority: i64,
    /// Unix seconds.
    pub created_at: i64,
}

/// A topic the relevance classifier watches for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestTopic {
    pub topic: String,
    pub description: String,
}

/// Per-chat unread overview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferSummary {
    pub chat_id: String,
    pub message_count: i64,
    /// Unix seconds of the newest unprocessed message.
    pub last_message: i64,
}

/// A raw mention entry from the platform event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMention {
    /// Placeholder key as it appears in the content, e.g. `@_user_1`.
    pub key: String,
    pub id: String,
    pub name: String,
}

/// An inbound chat event, normalized from the platform's callback payload.
///
/// `content` is already plain text with placeholder tokens resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    pub chat_id: String,
    pub msg_id: String,
    pub msg_type: String,
    pub chat_type: ChatType,
    pub content: String,
    pub image_keys: Vec<String>,
    pub sender_id: String,
    /// "user" or "app" (bot-self messages carry "app").
    pub sender_type: String,
    pub mentions: Vec<EventMention>,
    pub mentions_bot: bool,
    /// Unix milliseconds, platform clock.
    pub create_time: i64,
}

/// The chat the orchestrator is currently running a turn for, published to
/// the tool surface so the backend can default its tool arguments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveTurnContext {
    pub chat_id: String,
    pub chat_type: ChatType,
    pub msg_id: String,
}
