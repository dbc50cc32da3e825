// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Digest scheduler: periodically collapse buffered group chatter into a
//! single synthetic conversation turn, and garbage-collect processed
//! buffer rows.
//!
//! Buffered messages are marked processed whether or not the synthetic
//! turn succeeds — failed digests must not retry forever; failures stay
//! in the logs.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeZone};
use ferry_core::{BufferedMessage, ChatType, FerryError, RelevanceFilter};
use ferry_router::listen_strategy;
use ferry_storage::{queries::buffer, Database};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::orchestrator::{MessageRequest, Orchestrator};

/// Scheduler cadence and retention.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub digest_interval: Duration,
    pub cleanup_interval: Duration,
    /// Processed rows older than this are deleted by cleanup.
    pub retention: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            digest_interval: Duration::from_secs(3600),
            cleanup_interval: Duration::from_secs(6 * 3600),
            retention: Duration::from_secs(24 * 3600),
        }
    }
}

/// Drives the periodic digest and cleanup tasks.
pub struct DigestScheduler {
    db: Arc<Database>,
    orchestrator: Arc<Orchestrator>,
    /// `None` when no classifier is configured: buffered messages are
    /// digested unconditionally.
    filter: Option<Arc<dyn RelevanceFilter>>,
    bot_name: String,
    config: SchedulerConfig,
}

impl DigestScheduler {
    pub fn new(
        db: Arc<Database>,
        orchestrator: Arc<Orchestrator>,
        filter: Option<Arc<dyn RelevanceFilter>>,
        bot_name: String,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            db,
            orchestrator,
            filter,
            bot_name,
            config,
        }
    }

    /// Spawn the digest and cleanup loops. Both stop when the token is
    /// cancelled.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) {
        let digest = self.clone();
        let digest_cancel = cancel.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(digest.config.digest_interval);
            interval.tick().await; // skip the immediate first tick
            loop {
                tokio::select! {
                    _ = interval.tick() => digest.run_digest().await,
                    _ = digest_cancel.cancelled() => break,
                }
            }
            debug!("digest loop stopped");
        });

        let cleanup = self;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup.config.cleanup_interval);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => cleanup.run_cleanup().await,
                    _ = cancel.cancelled() => break,
                }
            }
            debug!("cleanup loop stopped");
        });

        info!("digest scheduler started");
    }

    /// One digest pass over every chat with unprocessed messages.
    pub async fn run_digest(&self) {
        let rows = match buffer::all_unprocessed(&self.db).await {
            Ok(rows) => rows,
            Err(e) => {
                error!(error = %e, "failed to fetch buffered messages");
                return;
            }
        };

        if rows.is_empty() {
            debug!("no buffered messages to digest");
            return;
        }

        let mut grouped: BTreeMap<String, Vec<BufferedMessage>> = BTreeMap::new();
        for row in rows {
            grouped.entry(row.chat_id.clone()).or_default().push(row);
        }

        info!(chats = grouped.len(), "running digest");
        for (chat_id, messages) in grouped {
            self.digest_chat(&chat_id, messages).await;
        }
    }

    async fn digest_chat(&self, chat_id: &str, messages: Vec<BufferedMessage>) {
        if messages.is_empty() {
            return;
        }

        if let Some(filter) = &self.filter {
            let history = filter_history(&messages);
            let current = messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            let topics = match buffer::list_topics(&self.db).await {
                Ok(topics) => topics.into_iter().map(|t| t.topic).collect::<Vec<_>>(),
                Err(e) => {
                    warn!(error = %e, "topic fetch failed, classifying without topics");
                    Vec::new()
                }
            };
            let strategy = listen_strategy(&self.bot_name, &topics);

            if !filter.should_respond(&current, &history, &strategy).await {
                info!(chat_id, count = messages.len(), "digest skipped by classifier");
                self.mark_processed(&messages).await;
                return;
            }
        }

        let prompt = build_digest_prompt(&messages);
        let request = MessageRequest {
            chat_id: chat_id.to_string(),
            msg_id: format!("digest_{}", chrono::Utc::now().timestamp()),
            content: prompt,
            sender_id: "system".to_string(),
            sender_name: "System Digest".to_string(),
            chat_type: ChatType::Group,
            image_paths: Vec::new(),
            create_time: 0,
        };

        match self.orchestrator.handle_message(request).await {
            Ok(()) => info!(chat_id, count = messages.len(), "digest submitted"),
            Err(FerryError::Busy) => {
                warn!(chat_id, "digest skipped, chat busy");
            }
            Err(e) => warn!(chat_id, error = %e, "digest submission failed"),
        }

        // Always marked processed: retrying a failed digest forever would
        // pile the same messages onto every future run.
        self.mark_processed(&messages).await;
    }

    async fn mark_processed(&self, messages: &[BufferedMessage]) {
        let ids: Vec<i64> = messages.iter().map(|m| m.id).collect();
        if let Err(e) = buffer::mark_processed(&self.db, &ids).await {
            error!(error = %e, "failed to mark messages processed");
        }
    }

    /// One cleanup pass: drop processed rows past retention.
    pub async fn run_cleanup(&self) {
        let cutoff = chrono::Utc::now().timestamp() - self.config.retention.as_secs() as i64;
        match buffer::cleanup(&self.db, cutoff).await {
            Ok(0) => debug!("cleanup: nothing to delete"),
            Ok(n) => info!(deleted = n, "cleanup removed old processed messages"),
            Err(e) => error!(error = %e, "cleanup failed"),
        }
    }
}

/// `[name]: content` lines handed to the classifier.
fn filter_history(messages: &[BufferedMessage]) -> String {
    let mut out = String::new();
    for m in messages {
        out.push_str(&format!("[{}]: {}\n", m.display_name(), m.content));
    }
    out
}

/// The synthetic digest prompt: an enumerated `[HH:MM] sender: content`
/// transcript plus response instructions.
fn build_digest_prompt(messages: &[BufferedMessage]) -> String {
    let mut out = String::from("[Scheduled Digest Task]\n\n");
    out.push_str(
        "Below are the recent unread messages in this chat. Provide a brief summary, \
         and if there are questions or topics that need a response, respond directly:\n\n",
    );

    for m in messages {
        let time = Local
            .timestamp_opt(m.created_at, 0)
            .earliest()
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string());
        out.push_str(&format!("[{time}] {}: {}\n", m.display_name(), m.content));
    }

    out.push_str("\n---\n");
    out.push_str("Based on the messages above:\n");
    out.push_str("1. If someone is asking a question or needs help, respond directly\n");
    out.push_str("2. If it's just casual chat, provide a brief summary, no need to reply\n");
    out.push_str("3. If the messages are not relevant to you, output empty content to skip\n");

    out
}
