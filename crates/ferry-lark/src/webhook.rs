// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook intake for platform event subscriptions.
//!
//! The platform delivers events by HTTP callback: a one-time
//! URL-verification challenge at subscription time, then message events.
//! Parsed events are pushed onto the ingress channel; a full channel
//! drops the event with a log line (the platform redelivers).

use axum::{extract::State, routing::post, Json, Router};
use ferry_core::{ChatEvent, FerryError};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::parse_event;

#[derive(Clone)]
struct WebhookState {
    tx: mpsc::Sender<ChatEvent>,
    /// The bot's own open_id, for mention detection by identity.
    bot_open_id: String,
}

/// Build the webhook router.
pub fn router(tx: mpsc::Sender<ChatEvent>, bot_open_id: String) -> Router {
    Router::new()
        .route("/webhook/events", post(receive_event))
        .with_state(WebhookState { tx, bot_open_id })
}

async fn receive_event(
    State(state): State<WebhookState>,
    Json(payload): Json<Value>,
) -> Json<Value> {
    // Subscription handshake: echo the challenge back.
    if payload.get("type").and_then(Value::as_str) == Some("url_verification") {
        let challenge = payload
            .get("challenge")
            .and_then(Value::as_str)
            .unwrap_or_default();
        info!("webhook url verification");
        return Json(json!({"challenge": challenge}));
    }

    match parse_event(&payload, &state.bot_open_id) {
        Some(event) => {
            if let Err(e) = state.tx.try_send(event) {
                warn!(error = %e, "ingress channel full, dropping event");
            }
        }
        None => debug!("callback did not produce an event"),
    }

    Json(json!({"code": 0}))
}

/// Serve the webhook until the token is cancelled.
pub async fn serve(
    bind: &str,
    tx: mpsc::Sender<ChatEvent>,
    bot_open_id: String,
    cancel: CancellationToken,
) -> Result<(), FerryError> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| FerryError::Chat {
            message: format!("failed to bind webhook to {bind}: {e}"),
            source: Some(Box::new(e)),
        })?;

    info!(bind, "webhook listening");

    axum::serve(listener, router(tx, bot_open_id))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| FerryError::Chat {
            message: format!("webhook server error: {e}"),
            source: Some(Box::new(e)),
        })
}
