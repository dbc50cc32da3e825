// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool-surface request handlers.
//!
//! Writes mutate the buffer store synchronously; reads proxy the store
//! and the chat platform. Responses are JSON with 200 on success, 4xx on
//! bad input, 5xx on internal errors.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ferry_core::FerryError;
use ferry_storage::queries::buffer;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::server::GatewayState;

/// Map pipeline errors onto the HTTP surface.
fn error_response(err: FerryError) -> Response {
    error!(error = %err, "tool surface request failed");
    let status = match err {
        FerryError::Chat { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

// ---- Context ----

/// GET /context — the chat the orchestrator is currently serving, so the
/// backend's tools can default their chat_id argument.
pub async fn get_context(State(state): State<GatewayState>) -> Response {
    let context = state.active.read().await.clone();
    Json(json!({"context": context})).into_response()
}

// ---- Whitelist ----

pub async fn list_whitelist(State(state): State<GatewayState>) -> Response {
    match buffer::list_whitelist(&state.db).await {
        Ok(entries) => Json(json!({"entries": entries})).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct WhitelistBody {
    pub chat_id: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_added_by")]
    pub added_by: String,
}

fn default_added_by() -> String {
    "backend".to_string()
}

pub async fn add_whitelist(
    State(state): State<GatewayState>,
    Json(body): Json<WhitelistBody>,
) -> Response {
    if body.chat_id.is_empty() {
        return bad_request("chat_id is required");
    }
    match buffer::add_to_whitelist(&state.db, &body.chat_id, &body.reason, &body.added_by).await {
        Ok(()) => Json(json!({
            "success": true,
            "message": format!("chat {} added to whitelist", body.chat_id),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct WhitelistRemoveBody {
    pub chat_id: String,
}

pub async fn remove_whitelist(
    State(state): State<GatewayState>,
    Json(body): Json<WhitelistRemoveBody>,
) -> Response {
    if body.chat_id.is_empty() {
        return bad_request("chat_id is required");
    }
    match buffer::remove_from_whitelist(&state.db, &body.chat_id).await {
        Ok(()) => Json(json!({"success": true})).into_response(),
        Err(e) => error_response(e),
    }
}

// ---- Keywords ----

pub async fn list_keywords(State(state): State<GatewayState>) -> Response {
    match buffer::list_keywords(&state.db).await {
        Ok(keywords) => Json(json!({"keywords": keywords})).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct KeywordBody {
    pub keyword: String,
    #[serde(default = "default_priority")]
    pub priority: i64,
}

fn default_priority() -> i64 {
    1
}

pub async fn add_keyword(
    State(state): State<GatewayState>,
    Json(body): Json<KeywordBody>,
) -> Response {
    if body.keyword.is_empty() {
        return bad_request("keyword is required");
    }
    if !(1..=2).contains(&body.priority) {
        return bad_request("priority must be 1 (normal) or 2 (immediate)");
    }
    match buffer::add_keyword(&state.db, &body.keyword, body.priority).await {
        Ok(()) => Json(json!({
            "success": true,
            "message": format!("keyword '{}' added with priority {}", body.keyword, body.priority),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct KeywordRemoveBody {
    pub keyword: String,
}

pub async fn remove_keyword(
    State(state): State<GatewayState>,
    Json(body): Json<KeywordRemoveBody>,
) -> Response {
    if body.keyword.is_empty() {
        return bad_request("keyword is required");
    }
    match buffer::remove_keyword(&state.db, &body.keyword).await {
        Ok(()) => Json(json!({"success": true})).into_response(),
        Err(e) => error_response(e),
    }
}

// ---- Topics ----

pub async fn list_topics(State(state): State<GatewayState>) -> Response {
    match buffer::list_topics(&state.db).await {
        Ok(topics) => Json(json!({"topics": topics})).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct TopicBody {
    pub topic: String,
    #[serde(default)]
    pub description: String,
}

pub async fn add_topic(
    State(state): State<GatewayState>,
    Json(body): Json<TopicBody>,
) -> Response {
    if body.topic.is_empty() {
        return bad_request("topic is required");
    }
    match buffer::add_topic(&state.db, &body.topic, &body.description).await {
        Ok(()) => Json(json!({
            "success": true,
            "message": format!("now watching for topic: {}", body.topic),
        }))
        .into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct TopicRemoveBody {
    pub topic: String,
}

pub async fn remove_topic(
    State(state): State<GatewayState>,
    Json(body): Json<TopicRemoveBody>,
) -> Response {
    if body.topic.is_empty() {
        return bad_request("topic is required");
    }
    match buffer::remove_topic(&state.db, &body.topic).await {
        Ok(()) => Json(json!({"success": true})).into_response(),
        Err(e) => error_response(e),
    }
}

// ---- Buffer ----

pub async fn buffer_summary(State(state): State<GatewayState>) -> Response {
    match buffer::summary(&state.db).await {
        Ok(summaries) => Json(json!({"summaries": summaries})).into_response(),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// GET /buffer/{chat}/messages — unprocessed messages for one chat.
pub async fn buffered_messages(
    State(state): State<GatewayState>,
    Path(chat): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(50);
    match buffer::unprocessed_for_chat(&state.db, &chat).await {
        Ok(mut messages) => {
            messages.truncate(limit);
            Json(json!({"messages": messages})).into_response()
        }
        Err(e) => error_response(e),
    }
}

// ---- Chat proxies ----

pub async fn chat_members(
    State(state): State<GatewayState>,
    Path(chat): Path<String>,
) -> Response {
    match state.port.chat_members(&chat).await {
        Ok(members) => Json(json!({"members": members})).into_response(),
        Err(e) => error_response(e),
    }
}

pub async fn chat_history(
    State(state): State<GatewayState>,
    Path(chat): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(20);
    match state.port.chat_history(&chat, limit).await {
        Ok(messages) => Json(json!({"messages": messages})).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::server::{router, GatewayState};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use ferry_core::{ActiveTurnContext, BufferedMessage, ChatPort, ChatType, Member, Message};
    use ferry_storage::Database;
    use http_body_util::BodyExt;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    struct StubPort;

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

        async fn chat_members(&self, chat_id: &str) -> Result<Vec<Member>, FerryError> {
            if chat_id == "broken" {
                return Err(FerryError::chat("platform unavailable"));
            }
            Ok(vec![Member {
                user_id: "ou_1".to_string(),
                name: "Alice".to_string(),
            }])
        }

        async fn chat_history(
            &self,
            _chat_id: &str,
            limit: usize,
        ) -> Result<Vec<Message>, FerryError> {
            Ok((0..limit.min(3))
                .map(|i| Message {
                    id: format!("m{i}"),
                    chat_id: "c1".to_string(),
                    sender_id: "u1".to_string(),
                    sender_name: "Alice".to_string(),
                    content: format!("msg {i}"),
                    msg_type: "text".to_string(),
                    create_time: i as i64,
                    is_bot: false,
                })
                .collect())
        }

        async fn download_image(
            &self,
            _msg_id: &str,
            _image_key: &str,
        ) -> Result<PathBuf, FerryError> {
            Ok(PathBuf::new())
        }
    }

    pub(crate) fn stub_port() -> Arc<dyn ChatPort> {
        Arc::new(StubPort)
    }

    async fn test_state() -> (GatewayState, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("gateway.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        (
            GatewayState {
                db,
                port: stub_port(),
                active: Arc::new(RwLock::new(None)),
            },
            dir,
        )
    }

    async fn call(
        state: &GatewayState,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let request = match body {
            Some(body) => Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        };

        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn context_starts_empty_and_reflects_the_active_turn() {
        let (state, _dir) = test_state().await;

        let (status, body) = call(&state, Method::GET, "/context", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["context"].is_null());

        *state.active.write().await = Some(ActiveTurnContext {
            chat_id: "c1".to_string(),
            chat_type: ChatType::Group,
            msg_id: "m1".to_string(),
        });

        let (_, body) = call(&state, Method::GET, "/context", None).await;
        assert_eq!(body["context"]["chat_id"], "c1");
        assert_eq!(body["context"]["chat_type"], "group");
    }

    #[tokio::test]
    async fn whitelist_crud_round_trips() {
        let (state, _dir) = test_state().await;

        let (status, body) = call(
            &state,
            Method::POST,
            "/whitelist",
            Some(serde_json::json!({"chat_id": "c1", "reason": "watched"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let (_, body) = call(&state, Method::GET, "/whitelist", None).await;
        assert_eq!(body["entries"].as_array().unwrap().len(), 1);
        assert_eq!(body["entries"][0]["chat_id"], "c1");
        assert_eq!(body["entries"][0]["added_by"], "backend");

        let (status, _) = call(
            &state,
            Method::DELETE,
            "/whitelist",
            Some(serde_json::json!({"chat_id": "c1"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&state, Method::GET, "/whitelist", None).await;
        assert!(body["entries"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn whitelist_rejects_empty_chat_id() {
        let (state, _dir) = test_state().await;
        let (status, body) = call(
            &state,
            Method::POST,
            "/whitelist",
            Some(serde_json::json!({"chat_id": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("chat_id"));
    }

    #[tokio::test]
    async fn keyword_priority_is_validated() {
        let (state, _dir) = test_state().await;

        let (status, _) = call(
            &state,
            Method::POST,
            "/keywords",
            Some(serde_json::json!({"keyword": "deploy", "priority": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = call(
            &state,
            Method::POST,
            "/keywords",
            Some(serde_json::json!({"keyword": "bad", "priority": 9})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("priority"));

        let (_, body) = call(&state, Method::GET, "/keywords", None).await;
        let keywords = body["keywords"].as_array().unwrap();
        assert_eq!(keywords.len(), 1);
        assert_eq!(keywords[0]["keyword"], "deploy");
        assert_eq!(keywords[0]["priority"], 2);
    }

    #[tokio::test]
    async fn topics_crud_round_trips() {
        let (state, _dir) = test_state().await;

        let (status, _) = call(
            &state,
            Method::POST,
            "/topics",
            Some(serde_json::json!({"topic": "PR review", "description": "pull requests"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&state, Method::GET, "/topics", None).await;
        assert_eq!(body["topics"][0]["topic"], "PR review");

        let (status, _) = call(
            &state,
            Method::DELETE,
            "/topics",
            Some(serde_json::json!({"topic": "PR review"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&state, Method::GET, "/topics", None).await;
        assert!(body["topics"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn buffer_summary_and_messages_are_served() {
        let (state, _dir) = test_state().await;
        for i in 0..3 {
            buffer::add_message(
                &state.db,
                &BufferedMessage {
                    id: 0,
                    chat_id: "c1".to_string(),
                    msg_id: format!("m{i}"),
                    content: format!("buffered {i}"),
                    sender_id: "u1".to_string(),
                    sender_name: "Alice".to_string(),
                    created_at: 1_700_000_000 + i,
                    processed: false,
                    processed_at: None,
                },
            )
            .await
            .unwrap();
        }

        let (status, body) = call(&state, Method::GET, "/buffer/summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["summaries"][0]["chat_id"], "c1");
        assert_eq!(body["summaries"][0]["message_count"], 3);

        let (status, body) =
            call(&state, Method::GET, "/buffer/c1/messages?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
        assert_eq!(body["messages"][0]["msg_id"], "m0");
    }

    #[tokio::test]
    async fn chat_proxies_hit_the_platform_port() {
        let (state, _dir) = test_state().await;

        let (status, body) = call(&state, Method::GET, "/chat/c1/members", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["members"][0]["name"], "Alice");

        let (status, body) = call(&state, Method::GET, "/chat/c1/history?limit=2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn platform_failure_maps_to_bad_gateway() {
        let (state, _dir) = test_state().await;
        let (status, body) = call(&state, Method::GET, "/chat/broken/members", None).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(body["error"].as_str().unwrap().contains("platform unavailable"));
    }
}
