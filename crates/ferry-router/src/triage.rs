// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message triage: decide per inbound message whether to process now,
//! park it for the hourly digest, or drop it.
//!
//! Triage consults only local database state (whitelist, keywords) so
//! ingress latency stays bounded; the LLM classifier runs later, from the
//! digest scheduler.

use std::sync::Arc;

use ferry_core::{ChatType, FerryError};
use ferry_storage::{queries::buffer, Database};
use tracing::warn;

/// Outcome of triaging one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageAction {
    /// Hand off to the orchestrator right away.
    Immediate,
    /// Park in the buffer for the next digest run.
    Buffer,
    /// Discard without side effects.
    Drop,
}

/// A triage decision with a human-readable reason for logging.
#[derive(Debug, Clone)]
pub struct TriageDecision {
    pub action: TriageAction,
    pub reason: String,
}

impl TriageDecision {
    fn immediate(reason: impl Into<String>) -> Self {
        Self {
            action: TriageAction::Immediate,
            reason: reason.into(),
        }
    }
}

/// Classifies incoming messages against the whitelist and trigger keywords.
pub struct TriageRouter {
    db: Arc<Database>,
}

impl TriageRouter {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Apply the triage rules in order:
    ///
    /// 1. bot mentioned -> immediate
    /// 2. chat whitelisted -> immediate
    /// 3. keyword match with priority >= 2 -> immediate
    /// 4. group chat -> buffer
    /// 5. p2p chat -> immediate (private chats are always responsive)
    ///
    /// Rules 1-3 are unconditional: an image-only mention carries no text
    /// but must still be processed. Only a message that triggered nothing
    /// and has no text is dropped (there is nothing to buffer). Storage
    /// errors on a rule lookup are logged and the rule treated as not
    /// matching, so the pipeline keeps moving.
    pub async fn triage(
        &self,
        chat_id: &str,
        content: &str,
        chat_type: ChatType,
        mentions_bot: bool,
    ) -> Result<TriageDecision, FerryError> {
        if mentions_bot {
            return Ok(TriageDecision::immediate("mentioned"));
        }

        match buffer::in_whitelist(&self.db, chat_id).await {
            Ok(true) => return Ok(TriageDecision::immediate("whitelist")),
            Ok(false) => {}
            Err(e) => warn!(chat_id, error = %e, "whitelist lookup failed, skipping rule"),
        }

        match buffer::match_keyword(&self.db, content).await {
            Ok(Some(kw)) if kw.priority >= 2 => {
                return Ok(TriageDecision::immediate(format!("keyword:{}", kw.keyword)));
            }
            Ok(_) => {}
            Err(e) => warn!(chat_id, error = %e, "keyword lookup failed, skipping rule"),
        }

        if content.trim().is_empty() {
            return Ok(TriageDecision {
                action: TriageAction::Drop,
                reason: "empty content".to_string(),
            });
        }

        if chat_type == ChatType::Group {
            Ok(TriageDecision {
                action: TriageAction::Buffer,
                reason: "no trigger matched".to_string(),
            })
        } else {
            Ok(TriageDecision::immediate("p2p"))
        }
    }
}
