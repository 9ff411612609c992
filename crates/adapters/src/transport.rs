//! MCP transport layer.
//!
//! Each MCP server connection is reached over one of two transports:
//! - **Local**: spawn a child process, send JSON-RPC over stdin/stdout.
//! - **Remote**: JSON-RPC over HTTP POST, with async completions and
//!   server-push notifications delivered over an SSE stream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex as PLMutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::{oneshot, Mutex};

use crate::protocol::{self, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use vco_domain::config::ProviderConnectionConfig;

/// Trait for MCP server transports.
#[async_trait]
pub trait McpTransport: Send + Sync {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError>;

    async fn send_notification(&self, method: &str) -> Result<(), TransportError>;

    fn is_alive(&self) -> bool;

    async fn shutdown(&self);
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("MCP server process has exited")]
    ProcessExited,

    #[error("timeout waiting for response")]
    Timeout,

    #[error("session not found, caller must reinitialize")]
    SessionNotFound,

    #[error("transport not supported: {0}")]
    Unsupported(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Local (stdio) transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const MAX_SKIP_LINES: usize = 1000;

/// Communicates with a child process over stdin/stdout, one newline-
/// delimited JSON-RPC message per line.
///
/// `request_lock` serializes entire request/response cycles; the
/// underlying framing has no out-of-band correlation beyond the numeric
/// `id`, so only one request may be in flight at a time per handle.
pub struct StdioTransport {
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Child>,
    request_lock: Mutex<()>,
    next_id: AtomicU64,
    alive: AtomicBool,
}

impl StdioTransport {
    pub fn spawn(config: &ProviderConnectionConfig) -> Result<Self, TransportError> {
        let mut cmd = tokio::process::Command::new(&config.command);
        cmd.args(&config.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        for (key, value) in &config.env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "failed to capture child stdin"))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            TransportError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "failed to capture child stdout"))
        })?;

        Ok(Self {
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(child),
            request_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(true),
        })
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    async fn write_line(&self, json: &str) -> Result<(), TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }
        let mut stdin = self.stdin.lock().await;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Read a line of JSON from stdout, skipping blank or non-JSON lines
    /// (e.g. a misbehaving server logging to stdout).
    async fn read_line(&self) -> Result<String, TransportError> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(TransportError::ProcessExited);
        }
        let mut stdout = self.stdout.lock().await;
        let mut skipped = 0usize;
        loop {
            let mut line = String::new();
            let bytes_read = stdout.read_line(&mut line).await?;
            if bytes_read == 0 {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::ProcessExited);
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('{') {
                return Ok(trimmed.to_string());
            }
            skipped += 1;
            if skipped >= MAX_SKIP_LINES {
                self.alive.store(false, Ordering::SeqCst);
                return Err(TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "MCP server produced too many non-JSON lines on stdout",
                )));
            }
            tracing::debug!(line = %trimmed, "skipping non-JSON line from MCP server stdout");
        }
    }
}

#[async_trait]
impl McpTransport for StdioTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let _guard = self.request_lock.lock().await;

        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);
        let json = serde_json::to_string(&req)?;

        tracing::debug!(id, method, "sending MCP request");
        self.write_line(&json).await?;

        let timeout = tokio::time::Duration::from_secs(30);
        let result = tokio::time::timeout(timeout, async {
            loop {
                let line = self.read_line().await?;
                if let Ok(resp) = serde_json::from_str::<JsonRpcResponse>(&line) {
                    if resp.id == id {
                        return Ok(resp);
                    }
                    tracing::debug!(expected_id = id, got_id = resp.id, "response for different request, continuing");
                }
                tracing::debug!(line = %line, "skipping non-matching message from MCP server");
            }
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        let json = serde_json::to_string(&notif)?;
        tracing::debug!(method, "sending MCP notification");
        self.write_line(&json).await
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        {
            let mut stdin = self.stdin.lock().await;
            if let Err(e) = stdin.shutdown().await {
                tracing::debug!(error = %e, "error closing MCP server stdin");
            }
        }
        let timeout = tokio::time::timeout(tokio::time::Duration::from_secs(5), child.wait()).await;
        match timeout {
            Ok(Ok(status)) => tracing::debug!(?status, "MCP server process exited"),
            Ok(Err(e)) => tracing::warn!(error = %e, "error waiting for MCP server process"),
            Err(_) => {
                tracing::warn!("MCP server process did not exit within timeout, killing");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill MCP server process");
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Remote (HTTP + SSE) transport
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

type PendingMap = Arc<PLMutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

/// HTTP+SSE transport. One adapter handle owns one background SSE reader
/// task; requests are correlated by numeric `id` through `pending`, which
/// is registered before the POST is sent so a response racing in over SSE
/// is never missed.
pub struct SseTransport {
    http: reqwest::Client,
    endpoint: String,
    access_token: String,
    session_id: PLMutex<Option<String>>,
    last_event_id: PLMutex<Option<String>>,
    pending: PendingMap,
    next_id: AtomicU64,
    alive: AtomicBool,
    reader_handle: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SseTransport {
    pub fn new(endpoint: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            access_token: access_token.into(),
            session_id: PLMutex::new(None),
            last_event_id: PLMutex::new(None),
            pending: Arc::new(PLMutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            alive: AtomicBool::new(false),
            reader_handle: Mutex::new(None),
        }
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn mcp_url(&self) -> String {
        format!("{}/mcp", self.endpoint.trim_end_matches('/'))
    }

    fn base_request(&self, method: reqwest::Method) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .request(method, self.mcp_url())
            .header("Authorization", format!("Bearer {}", self.access_token))
            .header("Accept", "application/json, text/event-stream");
        if let Some(sid) = self.session_id.lock().clone() {
            req = req.header("Mcp-Session-Id", sid);
        }
        req
    }

    /// Perform the `initialize` handshake, capture `Mcp-Session-Id`, and
    /// start the SSE reader task.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let params = protocol::remote_initialize_params();
        let params_value = serde_json::to_value(&params)?;
        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, "initialize", Some(params_value));

        let resp = self
            .base_request(reqwest::Method::POST)
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(TransportError::SessionNotFound);
        }
        if let Some(sid) = resp.headers().get("Mcp-Session-Id").and_then(|v| v.to_str().ok()) {
            *self.session_id.lock() = Some(sid.to_string());
        }
        if !resp.status().is_success() {
            return Err(TransportError::Io(std::io::Error::other(format!(
                "remote MCP initialize failed with status {}",
                resp.status()
            ))));
        }
        let _body: JsonRpcResponse = resp.json().await?;

        self.alive.store(true, Ordering::SeqCst);
        self.spawn_sse_reader();
        Ok(())
    }

    fn spawn_sse_reader(&self) {
        let http = self.http.clone();
        let url = self.mcp_url();
        let token = self.access_token.clone();
        let session_id = self.session_id.lock().clone();
        let pending = self.pending.clone();
        let handle = tokio::spawn(sse_reader_loop(http, url, token, session_id, pending));
        if let Ok(mut guard) = self.reader_handle.try_lock() {
            *guard = Some(handle);
        }
    }
}

/// Background task: holds the long-lived SSE GET open, parses
/// blank-line-delimited `event:`/`data:` frames, and resolves pending
/// requests by `id`. On stream error, waits 5s and reconnects with
/// `Last-Event-ID`.
async fn sse_reader_loop(
    http: reqwest::Client,
    url: String,
    token: String,
    session_id: Option<String>,
    pending: PendingMap,
) {
    let mut last_event_id: Option<String> = None;
    loop {
        let mut req = http
            .get(&url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "text/event-stream");
        if let Some(sid) = &session_id {
            req = req.header("Mcp-Session-Id", sid);
        }
        if let Some(eid) = &last_event_id {
            req = req.header("Last-Event-ID", eid);
        }

        let resp = match req.send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "SSE connect failed, retrying in 5s");
                tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                continue;
            }
        };

        let mut stream = resp.bytes_stream();
        let mut buf = String::new();
        loop {
            match stream.next().await {
                Some(Ok(chunk)) => {
                    buf.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(pos) = buf.find("\n\n") {
                        let frame = buf[..pos].to_string();
                        buf.drain(..pos + 2);
                        if let Some(id) = parse_sse_frame(&frame, &mut last_event_id, &pending) {
                            tracing::trace!(id, "resolved pending request from SSE frame");
                        }
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "SSE stream error, reconnecting in 5s");
                    break;
                }
                None => {
                    tracing::debug!("SSE stream closed, reconnecting in 5s");
                    break;
                }
            }
        }
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
    }
}

/// Parse one `event:`/`data:` SSE frame, dispatch completions to their
/// `oneshot` sender. Returns the resolved request id, if any.
fn parse_sse_frame(frame: &str, last_event_id: &mut Option<String>, pending: &PendingMap) -> Option<u64> {
    let mut data_lines = Vec::new();
    for line in frame.lines() {
        if let Some(id) = line.strip_prefix("id:") {
            *last_event_id = Some(id.trim().to_string());
        } else if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.trim());
        }
    }
    if data_lines.is_empty() {
        return None;
    }
    let payload = data_lines.join("\n");
    let msg: JsonRpcResponse = serde_json::from_str(&payload).ok()?;
    let sender = pending.lock().remove(&msg.id);
    if let Some(sender) = sender {
        let id = msg.id;
        let _ = sender.send(msg);
        return Some(id);
    }
    None
}

#[async_trait]
impl McpTransport for SseTransport {
    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, TransportError> {
        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let resp = self
            .base_request(reqwest::Method::POST)
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await?;

        match resp.status() {
            reqwest::StatusCode::ACCEPTED => {
                // Result arrives asynchronously over SSE; await the oneshot.
                let timeout = tokio::time::Duration::from_secs(30);
                match tokio::time::timeout(timeout, rx).await {
                    Ok(Ok(result)) => Ok(result),
                    Ok(Err(_)) => Err(TransportError::Timeout),
                    Err(_) => Err(TransportError::Timeout),
                }
            }
            reqwest::StatusCode::NOT_FOUND => {
                self.pending.lock().remove(&id);
                Err(TransportError::SessionNotFound)
            }
            status if status.is_success() => {
                self.pending.lock().remove(&id);
                Ok(resp.json().await?)
            }
            status => {
                self.pending.lock().remove(&id);
                Err(TransportError::Io(std::io::Error::other(format!("remote MCP call failed with status {status}"))))
            }
        }
    }

    async fn send_notification(&self, method: &str) -> Result<(), TransportError> {
        let notif = JsonRpcNotification::new(method);
        self.base_request(reqwest::Method::POST)
            .header("Content-Type", "application/json")
            .json(&notif)
            .send()
            .await?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reader_handle.lock().await.take() {
            handle.abort();
        }
        let mut req = self.http.delete(self.mcp_url()).header("Authorization", format!("Bearer {}", self.access_token));
        if let Some(sid) = self.session_id.lock().clone() {
            req = req.header("Mcp-Session-Id", sid);
        }
        if let Err(e) = req.send().await {
            tracing::debug!(error = %e, "error closing remote MCP session");
        }
    }
}
