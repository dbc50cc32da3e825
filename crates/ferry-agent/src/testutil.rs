// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared mocks for the agent crate's tests.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use ferry_core::{ChatPort, FerryError, Member, Message, RelevanceFilter, ThreadBackend};
use tokio::sync::Mutex;

/// Recording mock for the AI backend.
pub struct MockBackend {
    threads: AtomicUsize,
    resumes: AtomicUsize,
    resume_fails: AtomicBool,
    turns: Mutex<Vec<(String, String)>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            threads: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
            resume_fails: AtomicBool::new(false),
            turns: Mutex::new(Vec::new()),
        }
    }

    /// All subsequent resume probes fail (thread garbage-collected).
    pub fn fail_resumes(&self) {
        self.resume_fails.store(true, Ordering::SeqCst);
    }

    pub fn threads_started(&self) -> usize {
        self.threads.load(Ordering::SeqCst)
    }

    pub fn resumes(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }

    /// Recorded (thread_id, prompt) pairs.
    pub async fn turns(&self) -> Vec<(String, String)> {
        self.turns.lock().await.clone()
    }
}

#[async_trait]
impl ThreadBackend for MockBackend {
    async fn start_thread(&self) -> Result<String, FerryError> {
        let n = self.threads.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("th_{n}"))
    }

    async fn resume_thread(&self, _thread_id: &str) -> Result<(), FerryError> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        if self.resume_fails.load(Ordering::SeqCst) {
            return Err(FerryError::backend("thread not found"));
        }
        Ok(())
    }

    async fn start_turn(
        &self,
        thread_id: &str,
        prompt: &str,
        _images: &[PathBuf],
    ) -> Result<String, FerryError> {
        let mut turns = self.turns.lock().await;
        turns.push((thread_id.to_string(), prompt.to_string()));
        Ok(format!("tu_{}", turns.len()))
    }

    async fn interrupt_turn(&self, _thread_id: &str) -> Result<(), FerryError> {
        Ok(())
    }
}

/// Recording mock for the chat platform.
pub struct MockPort {
    pub sent: Mutex<Vec<(String, String)>>,
    pub mention_sends: Mutex<Vec<(String, String, Vec<Member>, bool)>>,
    pub reactions: Mutex<Vec<(String, String)>>,
    pub history: Mutex<Vec<Message>>,
    pub members: Mutex<Vec<Member>>,
}

impl MockPort {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            mention_sends: Mutex::new(Vec::new()),
            reactions: Mutex::new(Vec::new()),
            history: Mutex::new(Vec::new()),
            members: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ChatPort for MockPort {
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), FerryError> {
        self.sent
            .lock()
            .await
            .push((chat_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn send_text_with_mentions(
        &self,
        chat_id: &str,
        text: &str,
        mentions: &[Member],
        mention_all: bool,
    ) -> Result<(), FerryError> {
        self.mention_sends.lock().await.push((
            chat_id.to_string(),
            text.to_string(),
            mentions.to_vec(),
            mention_all,
        ));
        Ok(())
    }

    async fn add_reaction(&self, msg_id: &str, emoji: &str) -> Result<(), FerryError> {
        self.reactions
            .lock()
            .await
            .push((msg_id.to_string(), emoji.to_string()));
        Ok(())
    }

    async fn chat_members(&self, _chat_id: &str) -> Result<Vec<Member>, FerryError> {
        Ok(self.members.lock().await.clone())
    }

    async fn chat_history(
        &self,
        _chat_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, FerryError> {
        let history = self.history.lock().await;
        let start = history.len().saturating_sub(limit);
        Ok(history[start..].to_vec())
    }

    async fn download_image(
        &self,
        _msg_id: &str,
        image_key: &str,
    ) -> Result<PathBuf, FerryError> {
        Ok(PathBuf::from(format!("/tmp/{image_key}.png")))
    }
}

/// A relevance filter with a fixed verdict, recording call counts.
pub struct FixedFilter {
    verdict: bool,
    calls: AtomicUsize,
}

impl FixedFilter {
    pub fn new(verdict: bool) -> Arc<Self> {
        Arc::new(Self {
            verdict,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RelevanceFilter for FixedFilter {
    async fn should_respond(&self, _current: &str, _history: &str, _strategy: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict
    }
}
