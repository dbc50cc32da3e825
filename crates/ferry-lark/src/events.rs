// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound event normalization.
//!
//! Turns the platform's `im.message.receive_v1` callback payload into a
//! [`ChatEvent`]: extracts text content, resolves `@_user_N` placeholder
//! tokens to display names, detects bot mentions by the bot's own
//! `open_id`, and collects image keys. Unsupported message types yield
//! `None` and are dropped.

use ferry_core::{ChatEvent, ChatType, EventMention};
use serde_json::Value;
use tracing::debug;

const MESSAGE_RECEIVE_EVENT: &str = "im.message.receive_v1";

/// Parse one callback payload. `None` means the event is not a message
/// or carries an unsupported message type.
///
/// `bot_open_id` is the bot's own platform id (see
/// `LarkClient::bot_open_id`); mention detection compares ids, never
/// display names. An empty `bot_open_id` disables mention detection.
pub fn parse_event(payload: &Value, bot_open_id: &str) -> Option<ChatEvent> {
    let event_type = payload
        .get("header")
        .and_then(|h| h.get("event_type"))
        .and_then(Value::as_str)?;
    if event_type != MESSAGE_RECEIVE_EVENT {
        debug!(event_type, "ignoring non-message event");
        return None;
    }

    let event = payload.get("event")?;
    let message = event.get("message")?;

    let msg_type = message.get("message_type").and_then(Value::as_str)?;
    let raw_content = message.get("content").and_then(Value::as_str)?;

    let (content, image_keys) = match msg_type {
        "text" => {
            let parsed: Value = serde_json::from_str(raw_content).ok()?;
            (
                parsed.get("text").and_then(Value::as_str)?.to_string(),
                Vec::new(),
            )
        }
        "post" => {
            let parsed: Value = serde_json::from_str(raw_content).ok()?;
            let mut parts = Vec::new();
            let mut images = Vec::new();
            if let Some(lines) = parsed.get("content").and_then(Value::as_array) {
                for line in lines.iter().filter_map(Value::as_array) {
                    for run in line {
                        if let Some(text) = run.get("text").and_then(Value::as_str) {
                            parts.push(text.to_string());
                        }
                        if let Some(key) = run.get("image_key").and_then(Value::as_str) {
                            images.push(key.to_string());
                        }
                    }
                }
            }
            (parts.join(" "), images)
        }
        "image" => {
            let parsed: Value = serde_json::from_str(raw_content).ok()?;
            let key = parsed.get("image_key").and_then(Value::as_str)?.to_string();
            (String::new(), vec![key])
        }
        other => {
            debug!(msg_type = other, "unsupported message type dropped");
            return None;
        }
    };

    let mentions: Vec<EventMention> = message
        .get("mentions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|m| {
                    Some(EventMention {
                        key: m.get("key").and_then(Value::as_str)?.to_string(),
                        id: m
                            .get("id")
                            .and_then(|id| id.get("open_id"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        name: m.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    // Placeholder tokens become readable names. A mention whose open_id
    // is the bot's own marks the event for immediate processing; display
    // names are unreliable (renames, localization) and never consulted.
    let mut content = content;
    let mut mentions_bot = false;
    for mention in &mentions {
        content = content.replace(&mention.key, &format!("@{}", mention.name));
        if !bot_open_id.is_empty() && mention.id == bot_open_id {
            mentions_bot = true;
        }
    }

    let chat_type = match message.get("chat_type").and_then(Value::as_str) {
        Some("group") => ChatType::Group,
        _ => ChatType::P2p,
    };

    let sender = event.get("sender");
    let sender_id = sender
        .and_then(|s| s.get("sender_id"))
        .and_then(|id| id.get("open_id"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let sender_type = sender
        .and_then(|s| s.get("sender_type"))
        .and_then(Value::as_str)
        .unwrap_or("user")
        .to_string();

    let create_time = message
        .get("create_time")
        .and_then(Value::as_str)
        .and_then(|t| t.parse().ok())
        .unwrap_or_default();

    Some(ChatEvent {
        chat_id: message
            .get("chat_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        msg_id: message
            .get("message_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        msg_type: msg_type.to_string(),
        chat_type,
        content,
        image_keys,
        sender_id,
        sender_type,
        mentions,
        mentions_bot,
        create_time,
    })
}
