// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the backend's newline-delimited JSON-RPC protocol.
//!
//! Every line is one [`Frame`]. Requests carry `id` + `method`, responses
//! carry `id` + `result`/`error`, notifications carry `method` without an
//! `id` — except approval requests, which are server-to-client requests
//! and carry both. Field names on the wire are camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One protocol frame.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Frame {
    pub fn request(id: i64, method: &str, params: Value) -> Self {
        Frame {
            id: Some(id),
            method: Some(method.to_string()),
            params: Some(params),
            ..Frame::default()
        }
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Frame {
            method: Some(method.to_string()),
            params,
            ..Frame::default()
        }
    }

    /// A response to a server-to-client request (approval auto-accept).
    pub fn response(id: i64, result: Value) -> Self {
        Frame {
            id: Some(id),
            result: Some(result),
            ..Frame::default()
        }
    }

    /// True when this frame answers one of our requests.
    pub fn is_response(&self) -> bool {
        self.id.is_some() && self.method.is_none()
    }
}

/// RPC-level error payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

// ---- Request / result payloads ----

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub client_info: ClientInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    #[serde(default)]
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadStartResult {
    pub thread: ThreadRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadResumeParams {
    pub thread_id: String,
}

/// One entry of a turn's input array.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UserInput {
    #[serde(rename_all = "camelCase")]
    Text { text: String },
    #[serde(rename_all = "camelCase")]
    LocalImage { path: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStartParams {
    pub thread_id: String,
    pub input: Vec<UserInput>,
}

/// The server reports the turn id either at the root or nested under
/// `turn`; both shapes are accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnStartResult {
    #[serde(default)]
    pub turn_id: Option<String>,
    #[serde(default)]
    pub turn: Option<TurnRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRef {
    pub id: String,
}

impl TurnStartResult {
    pub fn into_turn_id(self) -> Option<String> {
        self.turn_id.or(self.turn.map(|t| t.id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnInterruptParams {
    pub thread_id: String,
}

// ---- Notifications ----

pub const METHOD_AGENT_MESSAGE_DELTA: &str = "item/agentMessage/delta";
pub const METHOD_TURN_COMPLETED: &str = "turn/completed";
pub const METHOD_ITEM_COMPLETED: &str = "item/completed";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessageDeltaParams {
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub turn_id: String,
    #[serde(default)]
    pub item_id: String,
    #[serde(default)]
    pub delta: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnCompletedParams {
    #[serde(default)]
    pub thread_id: String,
    #[serde(default)]
    pub turn_id: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCompletedParams {
    #[serde(default)]
    pub thread_id: String,
}

/// A backend stream event, decoded from a notification frame and fanned
/// out to the orchestrator.
#[derive(Debug, Clone)]
pub enum BackendEvent {
    AgentDelta {
        thread_id: String,
        turn_id: String,
        delta: String,
    },
    TurnCompleted {
        thread_id: String,
        turn_id: String,
        status: String,
    },
    ItemCompleted {
        thread_id: String,
    },
    Error {
        thread_id: Option<String>,
        message: String,
    },
}

impl BackendEvent {
    /// Decode a notification into an event. Unknown methods map to `None`
    /// unless they look like errors.
    pub fn from_notification(method: &str, params: Option<&Value>) -> Option<BackendEvent> {
        let params = params.cloned().unwrap_or(Value::Null);
        match method {
            METHOD_AGENT_MESSAGE_DELTA => {
                let p: AgentMessageDeltaParams = serde_json::from_value(params).ok()?;
                Some(BackendEvent::AgentDelta {
                    thread_id: p.thread_id,
                    turn_id: p.turn_id,
                    delta: p.delta,
                })
            }
            METHOD_TURN_COMPLETED => {
                let p: TurnCompletedParams = serde_json::from_value(params).ok()?;
                Some(BackendEvent::TurnCompleted {
                    thread_id: p.thread_id,
                    turn_id: p.turn_id,
                    status: p.status,
                })
            }
            METHOD_ITEM_COMPLETED => {
                let p: ItemCompletedParams = serde_json::from_value(params).ok()?;
                Some(BackendEvent::ItemCompleted {
                    thread_id: p.thread_id,
                })
            }
            other if other.contains("error") => {
                let thread_id = params
                    .get("threadId")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let message = params
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or(other)
                    .to_string();
                Some(BackendEvent::Error { thread_id, message })
            }
            _ => None,
        }
    }
}
