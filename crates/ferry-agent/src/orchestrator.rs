// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversation orchestration: drive one backend turn per chat, collect
//! stream deltas, parse reply directives, and emit the reply.
//!
//! Concurrency contract: exactly one in-flight turn per chat (guarded by
//! `ChatState.processing`); chats run in parallel. The delta buffer is
//! only mutated while `processing` is set, and only by the event dispatch
//! path, which routes by thread id.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::LazyLock;

use ferry_backend::BackendEvent;
use ferry_context::{format_for_new_thread, format_for_resumed_thread, ContextBuilder, PromptConfig};
use ferry_core::{ActiveTurnContext, ChatPort, ChatType, FerryError, Member, Message, ThreadBackend};
use futures::future::BoxFuture;
use regex::Regex;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use crate::reconciler::SessionReconciler;

/// Reaction attached when a turn starts.
pub const WORKING_REACTION: &str = "OnIt";
/// Reaction attached when a reply is sent.
pub const DONE_REACTION: &str = "DONE";

/// History fetched for a brand-new thread (needs more context).
const HISTORY_LIMIT_NEW: usize = 30;
/// History fetched for a resumed thread.
const HISTORY_LIMIT_RESUMED: usize = 20;

/// A request to run one conversation turn.
#[derive(Debug, Clone)]
pub struct MessageRequest {
    pub chat_id: String,
    pub msg_id: String,
    pub content: String,
    pub sender_id: String,
    pub sender_name: String,
    pub chat_type: ChatType,
    pub image_paths: Vec<PathBuf>,
    /// Unix milliseconds from the platform; zero falls back to now.
    pub create_time: i64,
}

/// The finished reply handed to the registered callback.
#[derive(Debug, Clone)]
pub struct Reply {
    pub chat_id: String,
    pub msg_id: String,
    pub text: String,
    pub mentions: Vec<Member>,
    pub mention_all: bool,
}

/// Reply delivery is inverted: the ingress adapter registers this at
/// wire-up time, which breaks the orchestrator <-> chat-adapter cycle.
pub type ReplyCallback = Arc<dyn Fn(Reply) -> BoxFuture<'static, ()> + Send + Sync>;

/// Per-chat turn state.
#[derive(Default)]
struct ChatState {
    thread_id: String,
    turn_id: String,
    /// Id of the message that triggered the in-flight turn.
    msg_id: String,
    processing: bool,
    /// Accumulated stream deltas for the in-flight turn.
    buffer: String,
}

/// Drives backend turns and dispatches backend stream events.
pub struct Orchestrator {
    reconciler: Arc<SessionReconciler>,
    builder: ContextBuilder,
    prompt_cfg: PromptConfig,
    backend: Arc<dyn ThreadBackend>,
    port: Arc<dyn ChatPort>,
    states: RwLock<HashMap<String, Arc<Mutex<ChatState>>>>,
    on_reply: RwLock<Option<ReplyCallback>>,
    /// Shared with the tool surface: the chat a turn is running for.
    active: Arc<RwLock<Option<ActiveTurnContext>>>,
}

impl Orchestrator {
    pub fn new(
        reconciler: Arc<SessionReconciler>,
        builder: ContextBuilder,
        prompt_cfg: PromptConfig,
        backend: Arc<dyn ThreadBackend>,
        port: Arc<dyn ChatPort>,
        active: Arc<RwLock<Option<ActiveTurnContext>>>,
    ) -> Self {
        Self {
            reconciler,
            builder,
            prompt_cfg,
            backend,
            port,
            states: RwLock::new(HashMap::new()),
            on_reply: RwLock::new(None),
            active,
        }
    }

    /// Register the reply callback. Called once at wire-up.
    pub async fn set_reply_callback(&self, callback: ReplyCallback) {
        *self.on_reply.write().await = Some(callback);
    }

    /// Accept a message for processing.
    ///
    /// Returns [`FerryError::Busy`] without queueing when a turn is
    /// already in flight for the chat; the caller decides whether to
    /// inform the user. On acceptance the turn runs as its own task so
    /// the ingress pump never blocks.
    pub async fn handle_message(self: &Arc<Self>, req: MessageRequest) -> Result<(), FerryError> {
        let state = self.state_for(&req.chat_id).await;

        {
            let mut s = state.lock().await;
            if s.processing {
                return Err(FerryError::Busy);
            }
            s.processing = true;
            s.msg_id = req.msg_id.clone();
            s.buffer.clear();
        }

        *self.active.write().await = Some(ActiveTurnContext {
            chat_id: req.chat_id.clone(),
            chat_type: req.chat_type,
            msg_id: req.msg_id.clone(),
        });

        if let Err(e) = self.port.add_reaction(&req.msg_id, WORKING_REACTION).await {
            debug!(msg_id = %req.msg_id, error = %e, "working reaction failed");
        }

        let this = self.clone();
        tokio::spawn(async move {
            this.run_turn(req, state).await;
        });

        Ok(())
    }

    /// Resolve the thread, assemble the prompt, and submit the turn.
    async fn run_turn(self: Arc<Self>, req: MessageRequest, state: Arc<Mutex<ChatState>>) {
        let decision = match self.reconciler.resolve(&req.chat_id).await {
            Ok(d) => d,
            Err(e) => return self.fail_turn(&req.chat_id, &state, e).await,
        };

        // Platform time keeps the current message consistent with
        // API-returned history; zero means a synthetic message.
        let create_time = if req.create_time > 0 {
            req.create_time
        } else {
            chrono::Utc::now().timestamp_millis()
        };

        let current = Message {
            id: req.msg_id.clone(),
            chat_id: req.chat_id.clone(),
            sender_id: req.sender_id.clone(),
            sender_name: req.sender_name.clone(),
            content: req.content.clone(),
            msg_type: "text".to_string(),
            create_time,
            is_bot: false,
        };

        let limit = if decision.is_new {
            HISTORY_LIMIT_NEW
        } else {
            HISTORY_LIMIT_RESUMED
        };

        let conv = match self
            .builder
            .build_conversation(&req.chat_id, req.chat_type, current, limit)
            .await
        {
            Ok(c) => c,
            Err(e) => return self.fail_turn(&req.chat_id, &state, e).await,
        };

        let prompt = if decision.is_new {
            format_for_new_thread(&conv, &self.prompt_cfg, chrono::Utc::now().timestamp_millis())
        } else {
            format_for_resumed_thread(
                &conv,
                &decision.last_processed_msg_id,
                decision.last_msg_time,
                &self.prompt_cfg,
            )
        };
        debug!(
            chat_id = %req.chat_id,
            chars = prompt.len(),
            history = conv.history.len(),
            is_new = decision.is_new,
            "prompt assembled"
        );

        let turn_id = match self
            .backend
            .start_turn(&decision.thread_id, &prompt, &req.image_paths)
            .await
        {
            Ok(id) => id,
            Err(e) => return self.fail_turn(&req.chat_id, &state, e).await,
        };

        {
            let mut s = state.lock().await;
            s.thread_id = decision.thread_id.clone();
            s.turn_id = turn_id.clone();
        }

        if let Err(e) = self
            .reconciler
            .update_last_processed(&req.chat_id, &req.msg_id, create_time)
            .await
        {
            warn!(chat_id = %req.chat_id, error = %e, "failed to update resumption anchor");
        }

        info!(
            chat_id = %req.chat_id,
            thread_id = %decision.thread_id,
            turn_id = %turn_id,
            is_new = decision.is_new,
            "turn started"
        );
    }

    /// Surface a turn failure to the chat exactly once and release the
    /// processing guard.
    async fn fail_turn(&self, chat_id: &str, state: &Arc<Mutex<ChatState>>, err: FerryError) {
        error!(chat_id, error = %err, "turn failed");
        if let Err(e) = self
            .port
            .send_text(chat_id, &format!("Error processing request: {err}"))
            .await
        {
            warn!(chat_id, error = %e, "failed to deliver error message");
        }
        state.lock().await.processing = false;
    }

    /// Dispatch one backend stream event.
    pub async fn on_backend_event(&self, event: BackendEvent) {
        match event {
            BackendEvent::AgentDelta {
                thread_id, delta, ..
            } => self.on_delta(&thread_id, &delta).await,
            BackendEvent::TurnCompleted { thread_id, .. } => {
                self.on_turn_complete(&thread_id).await
            }
            BackendEvent::ItemCompleted { thread_id } => {
                debug!(thread_id = %thread_id, "item completed");
            }
            BackendEvent::Error { thread_id, message } => {
                self.on_backend_error(thread_id.as_deref(), &message).await
            }
        }
    }

    async fn on_delta(&self, thread_id: &str, delta: &str) {
        let Some((_, state)) = self.find_chat_by_thread(thread_id).await else {
            // Stale delta after a restart; nothing owns this thread.
            debug!(thread_id, "delta for unknown thread dropped");
            return;
        };

        let mut s = state.lock().await;
        if !s.processing {
            debug!(thread_id, "delta outside an active turn dropped");
            return;
        }
        s.buffer.push_str(delta);
    }

    async fn on_turn_complete(&self, thread_id: &str) {
        let Some((chat_id, state)) = self.find_chat_by_thread(thread_id).await else {
            debug!(thread_id, "turn completion for unknown thread dropped");
            return;
        };

        let (response, msg_id) = {
            let mut s = state.lock().await;
            let response = std::mem::take(&mut s.buffer);
            let msg_id = s.msg_id.clone();
            s.processing = false;
            (response, msg_id)
        };

        if response.is_empty() {
            debug!(chat_id = %chat_id, "turn completed with empty output");
            return;
        }

        let parsed = parse_response(&response);

        if let Err(e) = self.port.add_reaction(&msg_id, DONE_REACTION).await {
            debug!(msg_id = %msg_id, error = %e, "done reaction failed");
        }
        for reaction in &parsed.reactions {
            if let Err(e) = self.port.add_reaction(&msg_id, reaction).await {
                debug!(msg_id = %msg_id, reaction = %reaction, error = %e, "reaction failed");
            }
        }

        let callback = self.on_reply.read().await.clone();
        if let Some(callback) = callback {
            callback(Reply {
                chat_id: chat_id.clone(),
                msg_id,
                text: parsed.text.clone(),
                mentions: parsed.mentions,
                mention_all: parsed.mention_all,
            })
            .await;
        }

        if let Err(e) = self.reconciler.mark_replied(&chat_id).await {
            warn!(chat_id = %chat_id, error = %e, "failed to mark session replied");
        }

        info!(chat_id = %chat_id, chars = parsed.text.len(), "reply delivered");
    }

    async fn on_backend_error(&self, thread_id: Option<&str>, message: &str) {
        error!(thread_id = thread_id.unwrap_or("-"), message, "backend error");

        let Some(thread_id) = thread_id else { return };
        let Some((chat_id, state)) = self.find_chat_by_thread(thread_id).await else {
            return;
        };

        {
            let mut s = state.lock().await;
            if !s.processing {
                return;
            }
            s.processing = false;
            s.buffer.clear();
        }

        if let Err(e) = self
            .port
            .send_text(&chat_id, &format!("Error processing request: {message}"))
            .await
        {
            warn!(chat_id = %chat_id, error = %e, "failed to deliver backend error");
        }
    }

    async fn state_for(&self, chat_id: &str) -> Arc<Mutex<ChatState>> {
        if let Some(state) = self.states.read().await.get(chat_id) {
            return state.clone();
        }
        let mut states = self.states.write().await;
        states
            .entry(chat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ChatState::default())))
            .clone()
    }

    async fn find_chat_by_thread(&self, thread_id: &str) -> Option<(String, Arc<Mutex<ChatState>>)> {
        let states = self.states.read().await;
        for (chat_id, state) in states.iter() {
            if state.lock().await.thread_id == thread_id {
                return Some((chat_id.clone(), state.clone()));
            }
        }
        None
    }

    /// Whether a turn is currently in flight for the chat (test hook and
    /// diagnostics).
    pub async fn is_processing(&self, chat_id: &str) -> bool {
        match self.states.read().await.get(chat_id) {
            Some(state) => state.lock().await.processing,
            None => false,
        }
    }

    /// The thread currently associated with a chat, if any.
    pub async fn thread_for(&self, chat_id: &str) -> Option<String> {
        let states = self.states.read().await;
        let state = states.get(chat_id)?;
        let thread_id = state.lock().await.thread_id.clone();
        if thread_id.is_empty() {
            None
        } else {
            Some(thread_id)
        }
    }
}

static REACTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[REACTION:([^\]]+)\]").expect("reaction regex"));
static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[MENTION:([^:\]]+):([^\]]+)\]").expect("mention regex"));
const MENTION_ALL_TOKEN: &str = "[MENTION_ALL]";

/// Reply text with all directives extracted.
#[derive(Debug, Clone, Default)]
pub struct ParsedReply {
    pub text: String,
    pub mentions: Vec<Member>,
    pub reactions: Vec<String>,
    pub mention_all: bool,
}

/// Extract and strip `[REACTION:TYPE]`, `[MENTION:id:name]`, and
/// `[MENTION_ALL]` directives from backend output.
///
/// The leftover text is trimmed at the ends only; interior whitespace is
/// left untouched (callers tolerate double spaces where a token sat
/// between words).
pub fn parse_response(raw: &str) -> ParsedReply {
    let mut reactions = Vec::new();
    for cap in REACTION_RE.captures_iter(raw) {
        reactions.push(cap[1].to_string());
    }
    let stripped = REACTION_RE.replace_all(raw, "");

    let mut mentions = Vec::new();
    for cap in MENTION_RE.captures_iter(&stripped) {
        mentions.push(Member {
            user_id: cap[1].to_string(),
            name: cap[2].to_string(),
        });
    }
    let stripped = MENTION_RE.replace_all(&stripped, "");

    let mention_all = stripped.contains(MENTION_ALL_TOKEN);
    let stripped = stripped.replace(MENTION_ALL_TOKEN, "");

    ParsedReply {
        text: stripped.trim().to_string(),
        mentions,
        reactions,
        mention_all,
    }
}
