// SPDX-FileCopyrightText: 2026 Ferry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client for the AI backend sub-process.
//!
//! Spawns the backend, speaks newline-delimited JSON-RPC over its stdio,
//! correlates responses to requests via an atomic id and a oneshot map,
//! and fans notifications out through a bounded event channel.
//!
//! Writer discipline: stdin has exactly one writer — the writer task fed
//! by the `outgoing` queue. stdout and stderr each have exactly one
//! reader. Approval requests from the server are auto-accepted.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ferry_core::{FerryError, ThreadBackend};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::protocol::{
    BackendEvent, ClientInfo, Frame, InitializeParams, InitializeResult, ThreadResumeParams,
    ThreadStartResult, TurnInterruptParams, TurnStartParams, TurnStartResult, UserInput,
};

/// Capacity of the notification fan-out channel. Full-channel sends are
/// dropped with a log line rather than blocking the stdout pump.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Grace period between stdin EOF and force-kill at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Backend sub-process settings.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Executable to spawn.
    pub program: String,
    /// Working directory for the sub-process.
    pub working_dir: PathBuf,
    /// Optional model override, passed as `-c model="..."`.
    pub model: Option<String>,
    /// Extra environment variables for the sub-process (e.g. the tool
    /// surface URL).
    pub env: Vec<(String, String)>,
    /// Per-request timeout. Turns run long; the default is five minutes.
    pub request_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: "codex".to_string(),
            working_dir: PathBuf::from("."),
            model: None,
            env: Vec::new(),
            request_timeout: Duration::from_secs(300),
        }
    }
}

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<Frame>>>>;

/// Handle to the running backend sub-process.
pub struct BackendClient {
    outgoing: mpsc::Sender<String>,
    pending: PendingMap,
    next_id: AtomicI64,
    events_rx: Mutex<Option<mpsc::Receiver<BackendEvent>>>,
    child: Mutex<Option<Child>>,
    cancel: CancellationToken,
    request_timeout: Duration,
}

impl BackendClient {
    /// Spawn the sub-process and start the writer, stdout, and stderr
    /// pumps. The protocol handshake is a separate step, see
    /// [`BackendClient::initialize`].
    pub async fn spawn(config: BackendConfig) -> Result<Arc<Self>, FerryError> {
        let mut command = Command::new(&config.program);
        command
            .arg("app-server")
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(ref model) = config.model {
            command.arg("-c").arg(format!("model=\"{model}\""));
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = command.spawn().map_err(|e| FerryError::Backend {
            message: format!("failed to spawn {}: {e}", config.program),
            source: Some(Box::new(e)),
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FerryError::backend("failed to open backend stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| FerryError::backend("failed to open backend stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FerryError::backend("failed to open backend stderr"))?;

        info!(program = %config.program, "backend sub-process spawned");

        let (outgoing_tx, outgoing_rx) = mpsc::channel::<String>(64);
        let (events_tx, events_rx) = mpsc::channel::<BackendEvent>(EVENT_CHANNEL_CAPACITY);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let cancel = CancellationToken::new();

        tokio::spawn(writer_loop(stdin, outgoing_rx, cancel.clone()));
        tokio::spawn(stdout_loop(
            stdout,
            pending.clone(),
            outgoing_tx.clone(),
            events_tx,
            cancel.clone(),
        ));
        tokio::spawn(stderr_loop(stderr));

        Ok(Arc::new(Self {
            outgoing: outgoing_tx,
            pending,
            next_id: AtomicI64::new(0),
            events_rx: Mutex::new(Some(events_rx)),
            child: Mutex::new(Some(child)),
            cancel,
            request_timeout: config.request_timeout,
        }))
    }

    /// Perform the protocol handshake. Returns the server's user agent.
    pub async fn initialize(&self) -> Result<String, FerryError> {
        let params = InitializeParams {
            client_info: ClientInfo {
                name: "ferry".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let result = self
            .request("initialize", serde_json::to_value(params).unwrap_or_default())
            .await?;
        let init: InitializeResult = serde_json::from_value(result)
            .map_err(|e| FerryError::backend(format!("bad initialize result: {e}")))?;

        self.notify("initialized", None).await?;
        info!(user_agent = %init.user_agent, "backend initialized");
        Ok(init.user_agent)
    }

    /// Take the stream-event receiver. Single consumer; subsequent calls
    /// return `None`.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<BackendEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Close stdin (EOF), give the sub-process a grace period, then kill.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
            Ok(Ok(status)) => info!(%status, "backend exited"),
            Ok(Err(e)) => warn!(error = %e, "backend wait failed"),
            Err(_) => {
                warn!("backend did not exit in time, killing");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "backend kill failed");
                }
            }
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, FerryError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = Frame::request(id, method, params);
        let line = serde_json::to_string(&frame)
            .map_err(|e| FerryError::backend(format!("failed to encode {method}: {e}")))?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        if self.outgoing.send(line).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(FerryError::backend("backend is not running"));
        }

        let response = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(_)) => {
                // Sender dropped: the stdout pump ended.
                return Err(FerryError::backend("backend stream closed"));
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(FerryError::Timeout {
                    duration: self.request_timeout,
                });
            }
        };

        if let Some(err) = response.error {
            return Err(FerryError::backend(format!(
                "{method} failed: RPC error {}: {}",
                err.code, err.message
            )));
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), FerryError> {
        let frame = Frame::notification(method, params);
        let line = serde_json::to_string(&frame)
            .map_err(|e| FerryError::backend(format!("failed to encode {method}: {e}")))?;
        self.outgoing
            .send(line)
            .await
            .map_err(|_| FerryError::backend("backend is not running"))
    }
}

#[async_trait]
impl ThreadBackend for BackendClient {
    async fn start_thread(&self) -> Result<String, FerryError> {
        let result = self.request("thread/start", serde_json::json!({})).await?;
        let parsed: ThreadStartResult = serde_json::from_value(result)
            .map_err(|e| FerryError::backend(format!("bad thread/start result: {e}")))?;
        if parsed.thread.id.is_empty() {
            return Err(FerryError::backend("thread/start returned empty thread id"));
        }
        Ok(parsed.thread.id)
    }

    async fn resume_thread(&self, thread_id: &str) -> Result<(), FerryError> {
        let params = ThreadResumeParams {
            thread_id: thread_id.to_string(),
        };
        self.request(
            "thread/resume",
            serde_json::to_value(params).unwrap_or_default(),
        )
        .await?;
        Ok(())
    }

    async fn start_turn(
        &self,
        thread_id: &str,
        prompt: &str,
        images: &[PathBuf],
    ) -> Result<String, FerryError> {
        let mut input = vec![UserInput::Text {
            text: prompt.to_string(),
        }];
        for image in images {
            input.push(UserInput::LocalImage {
                path: image.to_string_lossy().into_owned(),
            });
        }

        let params = TurnStartParams {
            thread_id: thread_id.to_string(),
            input,
        };
        let result = self
            .request("turn/start", serde_json::to_value(params).unwrap_or_default())
            .await?;
        let parsed: TurnStartResult = serde_json::from_value(result)
            .map_err(|e| FerryError::backend(format!("bad turn/start result: {e}")))?;
        parsed
            .into_turn_id()
            .ok_or_else(|| FerryError::backend("turn/start returned no turn id"))
    }

    async fn interrupt_turn(&self, thread_id: &str) -> Result<(), FerryError> {
        let params = TurnInterruptParams {
            thread_id: thread_id.to_string(),
        };
        self.request(
            "turn/interrupt",
            serde_json::to_value(params).unwrap_or_default(),
        )
        .await?;
        Ok(())
    }
}

/// Single writer for the sub-process stdin. Ends (dropping stdin and
/// signalling EOF) when the queue closes or shutdown is requested.
async fn writer_loop(
    mut stdin: tokio::process::ChildStdin,
    mut outgoing: mpsc::Receiver<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            line = outgoing.recv() => {
                let Some(mut line) = line else { break };
                line.push('\n');
                if let Err(e) = stdin.write_all(line.as_bytes()).await {
                    error!(error = %e, "backend stdin write failed");
                    break;
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    debug!("backend writer stopped, stdin closed");
}

/// Single reader for the sub-process stdout.
async fn stdout_loop(
    stdout: tokio::process::ChildStdout,
    pending: PendingMap,
    outgoing: mpsc::Sender<String>,
    events: mpsc::Sender<BackendEvent>,
    cancel: CancellationToken,
) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line,
            _ = cancel.cancelled() => break,
        };
        match line {
            Ok(Some(line)) if line.is_empty() => continue,
            Ok(Some(line)) => dispatch_line(&line, &pending, &outgoing, &events).await,
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "backend stdout read failed");
                break;
            }
        }
    }

    if !cancel.is_cancelled() {
        warn!("backend stream ended unexpectedly");
        let _ = events
            .try_send(BackendEvent::Error {
                thread_id: None,
                message: "backend stream closed".to_string(),
            });
    }

    // Dropping the senders fails all in-flight requests immediately.
    pending.lock().await.clear();
}

/// Single reader for the sub-process stderr; lines go to the log.
async fn stderr_loop(stderr: tokio::process::ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if !line.is_empty() {
            debug!(line = %line, "backend stderr");
        }
    }
}

/// Route one stdout line: response -> pending map; approval request ->
/// auto-accept on the outgoing queue; notification -> event channel.
async fn dispatch_line(
    line: &str,
    pending: &PendingMap,
    outgoing: &mpsc::Sender<String>,
    events: &mpsc::Sender<BackendEvent>,
) {
    let frame: Frame = match serde_json::from_str(line) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(error = %e, "skipping unparseable backend line");
            return;
        }
    };

    if frame.is_response() {
        let id = frame.id.unwrap_or_default();
        if let Some(tx) = pending.lock().await.remove(&id) {
            let _ = tx.send(frame);
        } else {
            debug!(id, "response for unknown request id");
        }
        return;
    }

    let Some(method) = frame.method.clone() else {
        return;
    };

    if let Some(id) = frame.id {
        // Server-to-client request: every approval is accepted.
        debug!(id, method = %method, "auto-accepting approval request");
        let reply = Frame::response(id, serde_json::json!({"decision": "accept"}));
        if let Ok(line) = serde_json::to_string(&reply) {
            let _ = outgoing.send(line).await;
        }
        return;
    }

    if let Some(event) = BackendEvent::from_notification(&method, frame.params.as_ref()) {
        if let Err(mpsc::error::TrySendError::Full(_)) = events.try_send(event) {
            warn!(method = %method, "backend event channel full, dropping");
        }
    }
}
