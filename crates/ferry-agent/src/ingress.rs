// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingress adapter: the first stop for every inbound chat event.
//!
//! Deduplicates redelivered events, filters out the bot's own messages,
//! resolves the sender's display name, downloads image attachments, and
//! routes the message through triage into the buffer or the orchestrator.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ferry_core::{BufferedMessage, ChatEvent, ChatPort, FerryError};
use ferry_router::{TriageAction, TriageRouter};
use ferry_storage::{queries::buffer, Database};
use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::orchestrator::{MessageRequest, Orchestrator, Reply, ReplyCallback};

/// How long a message id is remembered for deduplication.
const DEDUP_TTL: Duration = Duration::from_secs(300);

/// In-memory (msg_id -> seen_at) cache. Entries older than the TTL are
/// swept on every insert, which bounds the map without a timer task.
pub struct DedupCache {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` and records the id when it has not been seen within
    /// the TTL; `false` for a duplicate delivery.
    pub async fn insert_if_fresh(&self, msg_id: &str) -> bool {
        let mut seen = self.seen.lock().await;
        let now = Instant::now();
        seen.retain(|_, at| now.duration_since(*at) < self.ttl);

        if seen.contains_key(msg_id) {
            return false;
        }
        seen.insert(msg_id.to_string(), now);
        true
    }
}

/// The inbound half of the bridge.
pub struct IngressAdapter {
    orchestrator: Arc<Orchestrator>,
    db: Arc<Database>,
    port: Arc<dyn ChatPort>,
    triage: TriageRouter,
    dedup: DedupCache,
}

impl IngressAdapter {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        db: Arc<Database>,
        port: Arc<dyn ChatPort>,
    ) -> Self {
        Self {
            orchestrator,
            triage: TriageRouter::new(db.clone()),
            db,
            port,
            dedup: DedupCache::new(DEDUP_TTL),
        }
    }

    /// Process one inbound event end to end.
    pub async fn handle_event(&self, event: ChatEvent) {
        if !self.dedup.insert_if_fresh(&event.msg_id).await {
            debug!(msg_id = %event.msg_id, "duplicate event dropped");
            return;
        }

        // The platform echoes the bot's own messages back; processing
        // them would loop.
        if event.sender_type == "app" {
            debug!(msg_id = %event.msg_id, "bot-self message dropped");
            return;
        }

        let sender_name = self.resolve_sender_name(&event).await;

        let decision = match self
            .triage
            .triage(&event.chat_id, &event.content, event.chat_type, event.mentions_bot)
            .await
        {
            Ok(d) => d,
            Err(e) => {
                error!(chat_id = %event.chat_id, error = %e, "triage failed");
                return;
            }
        };

        match decision.action {
            TriageAction::Drop => {
                debug!(chat_id = %event.chat_id, reason = %decision.reason, "message dropped");
            }
            TriageAction::Buffer => {
                let row = BufferedMessage {
                    id: 0,
                    chat_id: event.chat_id.clone(),
                    msg_id: event.msg_id.clone(),
                    content: event.content.clone(),
                    sender_id: event.sender_id.clone(),
                    sender_name,
                    created_at: chrono::Utc::now().timestamp(),
                    processed: false,
                    processed_at: None,
                };
                if let Err(e) = buffer::add_message(&self.db, &row).await {
                    warn!(chat_id = %event.chat_id, error = %e, "failed to buffer message");
                } else {
                    debug!(chat_id = %event.chat_id, "message buffered for digest");
                }
            }
            TriageAction::Immediate => {
                info!(
                    chat_id = %event.chat_id,
                    reason = %decision.reason,
                    "processing immediately"
                );
                let image_paths = self.download_images(&event).await;
                let request = MessageRequest {
                    chat_id: event.chat_id.clone(),
                    msg_id: event.msg_id.clone(),
                    content: event.content.clone(),
                    sender_id: event.sender_id.clone(),
                    sender_name,
                    chat_type: event.chat_type,
                    image_paths,
                    create_time: event.create_time,
                };

                match self.orchestrator.handle_message(request).await {
                    Ok(()) => {}
                    Err(FerryError::Busy) => {
                        // Informed once, never queued; the user may re-send.
                        let _ = self
                            .port
                            .send_text(
                                &event.chat_id,
                                "Processing the previous request, please wait...",
                            )
                            .await;
                    }
                    Err(e) => {
                        error!(chat_id = %event.chat_id, error = %e, "message handling failed");
                    }
                }
            }
        }
    }

    /// Best-effort display-name lookup from the chat's member list.
    async fn resolve_sender_name(&self, event: &ChatEvent) -> String {
        if event.sender_id.is_empty() {
            return String::new();
        }
        match self.port.chat_members(&event.chat_id).await {
            Ok(members) => members
                .into_iter()
                .find(|m| m.user_id == event.sender_id)
                .map(|m| m.name)
                .unwrap_or_default(),
            Err(e) => {
                debug!(chat_id = %event.chat_id, error = %e, "sender name lookup failed");
                String::new()
            }
        }
    }

    /// Download attachments; a failed image is logged and skipped, the
    /// pipeline continues with whatever downloaded.
    async fn download_images(&self, event: &ChatEvent) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        for key in &event.image_keys {
            match self.port.download_image(&event.msg_id, key).await {
                Ok(path) => paths.push(path),
                Err(e) => {
                    warn!(msg_id = %event.msg_id, image_key = %key, error = %e,
                          "image download failed, skipping");
                }
            }
        }
        paths
    }
}

/// Build the reply callback the orchestrator invokes on turn completion:
/// mentions go out through the mention-aware send with a plain-text
/// fallback.
pub fn reply_callback(port: Arc<dyn ChatPort>) -> ReplyCallback {
    Arc::new(move |reply: Reply| {
        let port = port.clone();
        async move {
            if reply.mentions.is_empty() && !reply.mention_all {
                if let Err(e) = port.send_text(&reply.chat_id, &reply.text).await {
                    error!(chat_id = %reply.chat_id, error = %e, "reply send failed");
                }
                return;
            }

            if let Err(e) = port
                .send_text_with_mentions(
                    &reply.chat_id,
                    &reply.text,
                    &reply.mentions,
                    reply.mention_all,
                )
                .await
            {
                warn!(chat_id = %reply.chat_id, error = %e,
                      "mention send failed, falling back to plain text");
                if let Err(e) = port.send_text(&reply.chat_id, &reply.text).await {
                    error!(chat_id = %reply.chat_id, error = %e, "reply send failed");
                }
            }
        }
        .boxed()
    })
}
