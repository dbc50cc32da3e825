// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session reconciliation: resolve the backend thread for a chat.
//!
//! The backend may garbage-collect threads out-of-band; the resume probe
//! converts "silent continuation with lost state" into "clean restart".

use std::sync::Arc;

use chrono::Local;
use ferry_core::{FerryError, Session, SessionPolicy, ThreadBackend};
use ferry_storage::{queries::sessions, Database};
use tracing::{info, warn};

/// The thread to use for a turn, with resumption cursors.
#[derive(Debug, Clone)]
pub struct ThreadDecision {
    pub thread_id: String,
    pub is_new: bool,
    /// Unix seconds of the bot's last reply.
    pub last_reply_at: i64,
    /// Unix milliseconds of the last processed message.
    pub last_msg_time: i64,
    pub last_processed_msg_id: String,
}

/// Resolves (create / resume / recreate) the backend thread for a chat.
pub struct SessionReconciler {
    db: Arc<Database>,
    backend: Arc<dyn ThreadBackend>,
    policy: SessionPolicy,
}

impl SessionReconciler {
    pub fn new(db: Arc<Database>, backend: Arc<dyn ThreadBackend>, policy: SessionPolicy) -> Self {
        Self { db, backend, policy }
    }

    /// Resolve the thread for `chat_id`:
    ///
    /// 1. No session, or session not fresh -> create a new thread.
    /// 2. Fresh session -> probe the backend with a resume. On probe
    ///    failure the local session is deleted and a new thread created.
    pub async fn resolve(&self, chat_id: &str) -> Result<ThreadDecision, FerryError> {
        let existing = sessions::get(&self.db, chat_id).await?;

        let session = match existing {
            Some(s) if s.is_fresh(&self.policy, Local::now()) => s,
            Some(_) => {
                info!(chat_id, "session stale, creating new thread");
                return self.create_thread(chat_id).await;
            }
            None => return self.create_thread(chat_id).await,
        };

        match self.backend.resume_thread(&session.thread_id).await {
            Ok(()) => Ok(ThreadDecision {
                thread_id: session.thread_id,
                is_new: false,
                last_reply_at: session.last_reply_at,
                last_msg_time: session.last_msg_time,
                last_processed_msg_id: session.last_processed_msg_id,
            }),
            Err(e) => {
                warn!(chat_id, thread_id = %session.thread_id, error = %e,
                      "resume probe failed, recreating thread");
                if let Err(e) = sessions::delete(&self.db, chat_id).await {
                    warn!(chat_id, error = %e, "failed to delete stale session");
                }
                self.create_thread(chat_id).await
            }
        }
    }

    async fn create_thread(&self, chat_id: &str) -> Result<ThreadDecision, FerryError> {
        let thread_id = self.backend.start_thread().await?;
        let now = chrono::Utc::now().timestamp();

        let session = Session {
            chat_id: chat_id.to_string(),
            thread_id: thread_id.clone(),
            created_at: now,
            updated_at: now,
            last_reply_at: 0,
            last_msg_time: 0,
            last_processed_msg_id: String::new(),
        };
        sessions::save(&self.db, &session).await?;

        info!(chat_id, thread_id = %thread_id, "new thread created");
        Ok(ThreadDecision {
            thread_id,
            is_new: true,
            last_reply_at: 0,
            last_msg_time: 0,
            last_processed_msg_id: String::new(),
        })
    }

    /// Record a bot reply on the session.
    pub async fn mark_replied(&self, chat_id: &str) -> Result<(), FerryError> {
        sessions::mark_replied(&self.db, chat_id).await
    }

    /// Advance the resumption anchor after a turn was submitted.
    pub async fn update_last_processed(
        &self,
        chat_id: &str,
        msg_id: &str,
        msg_time_ms: i64,
    ) -> Result<(), FerryError> {
        sessions::update_last_processed(&self.db, chat_id, msg_id, msg_time_ms).await
    }
}
