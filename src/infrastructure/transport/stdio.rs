// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Stdio driver: spawns a child process under the process supervisor and
//! speaks newline-delimited JSON over its stdin/stdout. A single write lock
//! serializes outgoing lines; a dedicated task demultiplexes incoming lines
//! by `id` into pending response slots.

use std::collections::HashMap;
use std::process::Stdio as StdStdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::application::safety_filter::scrub_env;
use crate::domain::errors::TransportError;
use crate::domain::jsonrpc::JsonRpcMessage;

use super::{StreamChunk, Transport};

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<Value>>>>;

pub struct StdioTransport {
    child: Mutex<Child>,
    stdin_lock: Mutex<()>,
    pending: PendingMap,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
}

impl StdioTransport {
    pub async fn spawn(command: &str, args: &[String]) -> Result<Self, TransportError> {
        let mut env: HashMap<String, String> = std::env::vars().collect();
        scrub_env(&mut env);

        let mut child = Command::new(command)
            .args(args)
            .env_clear()
            .envs(env)
            .stdin(StdStdio::piped())
            .stdout(StdStdio::piped())
            .stderr(StdStdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                warn!(command, error = %e, "failed to spawn stdio target process");
                TransportError::Connection {
                    endpoint: command.to_string(),
                    reason: e.to_string(),
                }
            })?;
        debug!(command, pid = ?child.id(), "spawned stdio target process");

        let stdout = child.stdout.take().ok_or_else(|| TransportError::Connection {
            endpoint: command.to_string(),
            reason: "child had no stdout pipe".into(),
        })?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let pending_for_task = pending.clone();
        let closed_for_task = closed.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Ok(value) = serde_json::from_str::<Value>(&line) {
                            match value {
                                // Batch responses arrive as a single array line;
                                // each element is keyed and dispatched
                                // individually, same as a scalar response.
                                Value::Array(items) => {
                                    for item in items {
                                        if let Some(id) = item.get("id") {
                                            let key = id.to_string();
                                            if let Some(sender) = pending_for_task.lock().await.remove(&key) {
                                                let _ = sender.send(item);
                                            }
                                        }
                                    }
                                }
                                _ => {
                                    if let Some(id) = value.get("id") {
                                        let key = id.to_string();
                                        if let Some(sender) = pending_for_task.lock().await.remove(&key) {
                                            let _ = sender.send(value);
                                        }
                                    }
                                }
                            }
                        }
                    }
                    Ok(None) | Err(_) => break,
                }
            }
            debug!("stdio reader task observed eof, closing transport");
            closed_for_task.store(true, Ordering::SeqCst);
            let mut pending_guard = pending_for_task.lock().await;
            for (_, sender) in pending_guard.drain() {
                let _ = sender.send(json!({"error": {"code": -32000, "message": "transport closed"}}));
            }
        });

        Ok(Self {
            child: Mutex::new(child),
            stdin_lock: Mutex::new(()),
            pending,
            next_id: AtomicU64::new(1),
            closed,
        })
    }

    async fn write_line(&self, value: &Value) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        let _guard = self.stdin_lock.lock().await;
        let mut child = self.child.lock().await;
        let stdin = child.stdin.as_mut().ok_or(TransportError::Closed)?;
        let mut line = serde_json::to_string(value).map_err(|e| TransportError::Payload(e.to_string()))?;
        line.push('\n');
        stdin.write_all(line.as_bytes()).await.map_err(|e| TransportError::Connection {
            endpoint: "stdio".into(),
            reason: e.to_string(),
        })
    }

    async fn request_and_wait(&self, body: Value, id_key: String) -> Result<Value, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id_key, tx);
        self.write_line(&body).await?;
        rx.await.map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        Ok(())
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut body = json!({"jsonrpc": "2.0", "id": id, "method": method});
        if let Some(p) = params {
            body["params"] = p;
        }
        let response = self.request_and_wait(body, json!(id).to_string()).await?;
        if let Some(error) = response.get("error") {
            return Err(TransportError::Response(error.to_string()));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| TransportError::Response("response had neither result nor error".into()))
    }

    async fn send_raw(&self, payload: Value) -> Result<JsonRpcMessage, TransportError> {
        let id_key = payload.get("id").map(|v| v.to_string()).unwrap_or_default();
        if id_key.is_empty() {
            self.write_line(&payload).await?;
            return Ok(JsonRpcMessage::Raw(Value::Null));
        }
        let response = self.request_and_wait(payload, id_key).await?;
        Ok(JsonRpcMessage::Raw(response))
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        let mut body = json!({"jsonrpc": "2.0", "method": method});
        if let Some(p) = params {
            body["params"] = p;
        }
        self.write_line(&body).await
    }

    async fn send_batch(&self, requests: Vec<JsonRpcMessage>) -> Result<Vec<JsonRpcMessage>, TransportError> {
        let body = serde_json::to_value(&requests).map_err(|e| TransportError::Payload(e.to_string()))?;

        // Register a pending slot for every request carrying an id before
        // writing the batch, so the reader task's array-aware dispatch (see
        // `spawn`) can resolve each element as it arrives. Notifications
        // have no `id` and get no response, matching JSON-RPC 2.0 batch
        // semantics.
        let mut receivers = Vec::with_capacity(requests.len());
        {
            let mut pending = self.pending.lock().await;
            for request in &requests {
                if let Some(id) = request.id() {
                    let key = serde_json::to_value(id).unwrap_or(Value::Null).to_string();
                    let (tx, rx) = oneshot::channel();
                    pending.insert(key, tx);
                    receivers.push(Some(rx));
                } else {
                    receivers.push(None);
                }
            }
        }

        self.write_line(&body).await?;

        let mut responses = Vec::with_capacity(receivers.len());
        for rx in receivers.into_iter().flatten() {
            let value = rx.await.map_err(|_| TransportError::Closed)?;
            responses.push(JsonRpcMessage::Raw(value));
        }
        Ok(responses)
    }

    async fn stream_request(&self, payload: Value) -> Result<Vec<StreamChunk>, TransportError> {
        let id_key = payload.get("id").map(|v| v.to_string()).unwrap_or_default();
        let response = self.request_and_wait(payload, id_key).await?;
        Ok(vec![StreamChunk(response)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawn_and_echo_roundtrip() {
        // `cat` echoes each stdin line back on stdout, exercising the
        // newline-delimited-JSON framing without a real MCP server.
        let transport = StdioTransport::spawn("cat", &[]).await.unwrap();
        let result = transport.send_request("ping", None).await;
        // `cat` echoes the request itself, which has no `result`/`error`,
        // so this is expected to surface as a response-shape error rather
        // than hang — demonstrating the id-correlated round trip completes.
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn send_batch_resolves_each_request_by_id() {
        use crate::domain::jsonrpc::RpcId;

        // `cat` echoes the batch array back on one line, letting the
        // array-aware reader demultiplex it against the pending ids
        // registered by `send_batch`.
        let transport = StdioTransport::spawn("cat", &[]).await.unwrap();
        let requests = vec![
            JsonRpcMessage::request(RpcId::Number(1.into()), "ping", None),
            JsonRpcMessage::request(RpcId::Number(2.into()), "ping", None),
        ];
        let responses = transport.send_batch(requests).await.unwrap();
        assert_eq!(responses.len(), 2);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let transport = StdioTransport::spawn("cat", &[]).await.unwrap();
        transport.disconnect().await.unwrap();
        transport.disconnect().await.unwrap();
    }
}
