// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `ferry serve` - wire up and run the full bridge.
//!
//! Components, in dependency order: storage, backend sub-process,
//! platform REST client, reconciler, orchestrator, classifier, ingress,
//! digest scheduler, tool surface, webhook intake. All periodic tasks
//! and servers watch one cancellation token installed on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ferry_agent::{
    reply_callback, shutdown, DigestScheduler, IngressAdapter, Orchestrator, SchedulerConfig,
    SessionReconciler,
};
use ferry_backend::{BackendClient, BackendConfig};
use ferry_config::FerryConfig;
use ferry_context::{ContextBuilder, PromptConfig};
use ferry_core::{ChatEvent, ChatPort, FerryError, RelevanceFilter, ThreadBackend};
use ferry_gateway::GatewayState;
use ferry_lark::{LarkClient, LarkConfig};
use ferry_router::{ClassifierConfig, RelevanceClassifier};
use ferry_storage::Database;
use tokio::sync::{mpsc, RwLock};
use tracing::{error, info, warn};

/// Name of the env var handing the tool-surface URL to the sub-process.
const TOOLS_URL_ENV: &str = "FERRY_TOOLS_URL";

pub async fn run_serve(config: FerryConfig) -> Result<(), FerryError> {
    init_tracing(&config.agent.log_level);
    config.validate()?;

    info!(bot = %config.agent.bot_name, "starting ferry");

    // Storage.
    let db = Arc::new(Database::open(&config.session.db_path).await?);

    // Backend sub-process. It learns the tool-surface URL from its
    // environment so its tool-use subsystem can reach us.
    let backend = BackendClient::spawn(BackendConfig {
        program: config.backend.program.clone(),
        working_dir: PathBuf::from(&config.backend.working_dir),
        model: config.backend.model.clone(),
        env: vec![(
            TOOLS_URL_ENV.to_string(),
            format!("http://{}", config.gateway.bind),
        )],
        request_timeout: Duration::from_secs(config.backend.request_timeout_secs),
    })
    .await?;
    let user_agent = backend.initialize().await?;
    info!(user_agent = %user_agent, "backend ready");
    let backend_port: Arc<dyn ThreadBackend> = backend.clone();

    // Platform REST client.
    let lark = LarkClient::new(LarkConfig {
        app_id: config.chat.app_id.clone().unwrap_or_default(),
        app_secret: config.chat.app_secret.clone().unwrap_or_default(),
        base_url: config.chat.base_url.clone(),
        image_dir: PathBuf::from(&config.chat.image_dir),
    })?;

    // Resolve the bot's own open_id once; mentions are matched against
    // this stable identity. Without it, mention detection is off and
    // group messages only reach the bot via whitelist/keywords/digest.
    let bot_open_id = match lark.bot_open_id().await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "failed to resolve bot open_id, mention detection disabled");
            String::new()
        }
    };

    let port: Arc<dyn ChatPort> = Arc::new(lark);

    // Orchestration pipeline.
    let reconciler = Arc::new(SessionReconciler::new(
        db.clone(),
        backend_port.clone(),
        config.session_policy(),
    ));
    let prompt_cfg = PromptConfig {
        max_history_count: config.history.max_count,
        max_history_minutes: config.history.max_minutes,
        ..PromptConfig::default()
    };
    let active = Arc::new(RwLock::new(None));
    let orchestrator = Arc::new(Orchestrator::new(
        reconciler,
        ContextBuilder::new(port.clone()),
        prompt_cfg,
        backend_port,
        port.clone(),
        active.clone(),
    ));
    orchestrator.set_reply_callback(reply_callback(port.clone())).await;

    // Relevance classifier; absent key means buffered group messages are
    // digested unconditionally.
    let classifier: Option<Arc<dyn RelevanceFilter>> = match &config.classifier.api_key {
        Some(api_key) => {
            info!(model = %config.classifier.model, "relevance classifier enabled");
            Some(Arc::new(RelevanceClassifier::new(ClassifierConfig {
                api_key: api_key.clone(),
                base_url: config.classifier.base_url.clone(),
                model: config.classifier.model.clone(),
                timeout: Duration::from_secs(config.classifier.timeout_secs),
            })?))
        }
        None => {
            info!("relevance classifier disabled (no API key)");
            None
        }
    };

    let cancel = shutdown::install_signal_handler();

    // Digest + cleanup loops.
    let scheduler = Arc::new(DigestScheduler::new(
        db.clone(),
        orchestrator.clone(),
        classifier,
        config.agent.bot_name.clone(),
        SchedulerConfig {
            digest_interval: Duration::from_secs(config.digest.interval_minutes * 60),
            cleanup_interval: Duration::from_secs(config.digest.cleanup_interval_hours * 3600),
            retention: Duration::from_secs(config.digest.retention_hours * 3600),
        },
    ));
    scheduler.spawn(cancel.clone());

    // Tool surface (loopback only).
    {
        let state = GatewayState {
            db: db.clone(),
            port: port.clone(),
            active,
        };
        let bind = config.gateway.bind.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = ferry_gateway::serve(&bind, state, cancel).await {
                error!(error = %e, "tool surface failed");
            }
        });
    }

    // Webhook intake feeding the ingress pump.
    let (event_tx, mut event_rx) = mpsc::channel::<ChatEvent>(256);
    {
        let bind = config.chat.webhook_bind.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) =
                ferry_lark::webhook::serve(&bind, event_tx, bot_open_id, cancel).await
            {
                error!(error = %e, "webhook intake failed");
            }
        });
    }

    let ingress = Arc::new(IngressAdapter::new(
        orchestrator.clone(),
        db.clone(),
        port.clone(),
    ));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = event_rx.recv() => match event {
                        Some(event) => ingress.handle_event(event).await,
                        None => break,
                    },
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    // Backend event pump into the orchestrator.
    let mut backend_events = backend
        .take_events()
        .await
        .ok_or_else(|| FerryError::Internal("backend event stream already taken".into()))?;
    {
        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = backend_events.recv() => match event {
                        Some(event) => orchestrator.on_backend_event(event).await,
                        None => break,
                    },
                    _ = cancel.cancelled() => break,
                }
            }
        });
    }

    info!("ferry serving");
    cancel.cancelled().await;

    info!("shutting down");
    backend.shutdown().await;
    info!("bye");
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
