// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool-surface HTTP server built on axum.
//!
//! Bound to loopback only — there is no authentication; the port is
//! shared exclusively with the co-located AI sub-process via an
//! environment variable naming the URL.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use ferry_core::{ActiveTurnContext, ChatPort, FerryError};
use ferry_storage::Database;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::handlers;

/// Shared state for the tool-surface handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub db: Arc<Database>,
    pub port: Arc<dyn ChatPort>,
    /// The chat the orchestrator is currently running a turn for.
    pub active: Arc<RwLock<Option<ActiveTurnContext>>>,
}

/// Build the tool-surface router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/context", get(handlers::get_context))
        .route(
            "/whitelist",
            get(handlers::list_whitelist)
                .post(handlers::add_whitelist)
                .delete(handlers::remove_whitelist),
        )
        .route(
            "/keywords",
            get(handlers::list_keywords)
                .post(handlers::add_keyword)
                .delete(handlers::remove_keyword),
        )
        .route(
            "/topics",
            get(handlers::list_topics)
                .post(handlers::add_topic)
                .delete(handlers::remove_topic),
        )
        .route("/buffer/summary", get(handlers::buffer_summary))
        .route("/buffer/{chat}/messages", get(handlers::buffered_messages))
        .route("/chat/{chat}/members", get(handlers::chat_members))
        .route("/chat/{chat}/history", get(handlers::chat_history))
        .with_state(state)
}

/// Serve the tool surface until the token is cancelled.
///
/// Refuses non-loopback bind addresses: the surface is unauthenticated
/// by design and must never be reachable off-host.
pub async fn serve(
    bind: &str,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), FerryError> {
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| FerryError::Config(format!("invalid gateway bind address {bind}: {e}")))?;
    if !addr.ip().is_loopback() {
        return Err(FerryError::Config(format!(
            "gateway must bind to loopback, got {addr}"
        )));
    }

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| FerryError::Internal(format!("failed to bind tool surface to {addr}: {e}")))?;

    info!(%addr, "tool surface listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| FerryError::Internal(format!("tool surface server error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn non_loopback_bind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("g.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let state = GatewayState {
            db,
            port: crate::handlers::tests::stub_port(),
            active: Arc::new(RwLock::new(None)),
        };

        let err = serve("0.0.0.0:8787", state, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("loopback"));
    }
}
