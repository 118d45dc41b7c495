// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Stateful streamable-HTTP driver: double-checked-locking `initialize`
//! handshake, `mcp-session-id` / `mcp-protocol-version` header propagation,
//! and JSON-or-SSE response framing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use url::Url;

use crate::application::safety_filter::SafetyFilter;
use crate::domain::errors::TransportError;
use crate::domain::jsonrpc::JsonRpcMessage;

use super::sse::parse_sse_body;
use super::{StreamChunk, Transport};

const PROTOCOL_VERSION: &str = "2025-06-18";

#[derive(Debug, Default)]
struct SessionState {
    initialized: bool,
    session_id: Option<String>,
    negotiated_protocol_version: Option<String>,
}

pub struct StreamableHttpTransport {
    client: Client,
    endpoint: Url,
    next_id: AtomicU64,
    session: Mutex<SessionState>,
    safety: Option<SafetyFilter>,
}

impl StreamableHttpTransport {
    pub fn new(endpoint: &str, timeout_ms: u64, safety: Option<SafetyFilter>) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint).map_err(|e| TransportError::Payload(e.to_string()))?;
        let client = Client::builder()
            .no_proxy()
            .trust_env(false)
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| TransportError::Connection {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint,
            next_id: AtomicU64::new(1),
            session: Mutex::new(SessionState::default()),
            safety,
        })
    }

    fn check_host(&self) -> Result<(), TransportError> {
        if let Some(filter) = &self.safety {
            let host = self.endpoint.host_str().unwrap_or_default();
            if !filter.host_allowed(host) {
                warn!(host, "streamable-http request blocked by network policy");
                return Err(TransportError::NetworkPolicy { host: host.to_string() });
            }
        }
        Ok(())
    }

    /// Double-checked-locking initialize: acquire the lock, re-check
    /// `initialized`, perform the handshake, send
    /// `notifications/initialized` as the last synchronous step, release.
    async fn ensure_initialized(&self) -> Result<(), TransportError> {
        let mut guard = self.session.lock().await;
        if guard.initialized {
            return Ok(());
        }

        self.check_host()?;

        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {"elicitation": {}, "experimental": {}, "roots": {"listChanged": true}, "sampling": {}},
                "clientInfo": {"name": "mcp-fuzzer", "version": env!("CARGO_PKG_VERSION")}
            }
        });

        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .map_err(|e| TransportError::Connection {
                endpoint: self.endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let session_id = response
            .headers()
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body: Value = if response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .starts_with("text/event-stream")
        {
            let text = response.text().await.map_err(|e| TransportError::Response(e.to_string()))?;
            parse_sse_body(&text)?
        } else {
            response.json().await.map_err(|e| TransportError::Response(e.to_string()))?
        };

        let negotiated = body
            .get("result")
            .and_then(|r| r.get("protocolVersion"))
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION)
            .to_string();

        guard.session_id = session_id;
        guard.negotiated_protocol_version = Some(negotiated);
        guard.initialized = true;
        debug!(
            session_id = guard.session_id.as_deref().unwrap_or("none"),
            protocol_version = %negotiated,
            "streamable-http session initialized"
        );

        // Sent synchronously as the handshake's last step, before the lock
        // is released, per the decision recorded in DESIGN.md.
        let notify_body = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        let _ = self.post_with_session(&guard, notify_body).await;

        Ok(())
    }

    async fn post_with_session(&self, session: &SessionState, body: Value) -> Result<Value, TransportError> {
        self.check_host()?;

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json");
        if let Some(session_id) = &session.session_id {
            request = request.header("mcp-session-id", session_id.clone());
        }
        if let Some(version) = &session.negotiated_protocol_version {
            request = request.header("mcp-protocol-version", version.clone());
        }

        let response = request
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Connection {
                endpoint: self.endpoint.to_string(),
                reason: e.to_string(),
            })?;

        // Same-origin 307/308 redirects only, gated the same way as the
        // plain HTTP driver: `Policy::none()` above means reqwest never
        // follows automatically.
        let response = if response.status().is_redirection() {
            let location = response
                .headers()
                .get("location")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            let target = Url::parse(location).map_err(|e| TransportError::Response(e.to_string()))?;
            let original_host = self.endpoint.host_str().unwrap_or_default();
            let target_host = target.host_str().unwrap_or_default();
            let allowed = self
                .safety
                .as_ref()
                .map(|f| f.redirect_allowed(original_host, target_host))
                .unwrap_or(original_host == target_host);
            if !allowed {
                warn!(original_host, target_host, "redirect blocked by network policy");
                return Err(TransportError::NetworkPolicy {
                    host: target_host.to_string(),
                });
            }
            debug!(target_host, "following same-origin redirect");

            let mut redirected = self.client.post(target).header("Content-Type", "application/json");
            if let Some(session_id) = &session.session_id {
                redirected = redirected.header("mcp-session-id", session_id.clone());
            }
            if let Some(version) = &session.negotiated_protocol_version {
                redirected = redirected.header("mcp-protocol-version", version.clone());
            }
            redirected
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    warn!(target_host, error = %e, "redirected streamable-http request failed");
                    TransportError::Connection {
                        endpoint: target_host.to_string(),
                        reason: e.to_string(),
                    }
                })?
        } else {
            response
        };

        if response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .starts_with("text/event-stream")
        {
            let text = response.text().await.map_err(|e| TransportError::Response(e.to_string()))?;
            parse_sse_body(&text)
        } else {
            response.json().await.map_err(|e| TransportError::Response(e.to_string()))
        }
    }

    async fn post_authenticated(&self, body: Value) -> Result<Value, TransportError> {
        self.ensure_initialized().await?;
        let guard = self.session.lock().await;
        self.post_with_session(&guard, body).await
    }
}

#[async_trait]
impl Transport for StreamableHttpTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.ensure_initialized().await
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let mut guard = self.session.lock().await;
        *guard = SessionState::default();
        Ok(())
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut body = json!({"jsonrpc": "2.0", "id": id, "method": method});
        if let Some(p) = params {
            body["params"] = p;
        }
        let response = self.post_authenticated(body).await?;
        if let Some(error) = response.get("error") {
            return Err(TransportError::Response(error.to_string()));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| TransportError::Response("response had neither result nor error".into()))
    }

    async fn send_raw(&self, payload: Value) -> Result<JsonRpcMessage, TransportError> {
        let response = self.post_authenticated(payload).await?;
        Ok(JsonRpcMessage::Raw(response))
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        self.ensure_initialized().await?;
        let mut body = json!({"jsonrpc": "2.0", "method": method});
        if let Some(p) = params {
            body["params"] = p;
        }
        let guard = self.session.lock().await;
        self.post_with_session(&guard, body).await.map(|_| ())
    }

    async fn send_batch(&self, requests: Vec<JsonRpcMessage>) -> Result<Vec<JsonRpcMessage>, TransportError> {
        self.ensure_initialized().await?;
        let body = serde_json::to_value(&requests).map_err(|e| TransportError::Payload(e.to_string()))?;
        let guard = self.session.lock().await;
        let response = self.post_with_session(&guard, body).await?;
        let array = response
            .as_array()
            .ok_or_else(|| TransportError::Response("batch response was not a JSON array".into()))?;
        Ok(array.iter().cloned().map(JsonRpcMessage::Raw).collect())
    }

    async fn stream_request(&self, payload: Value) -> Result<Vec<StreamChunk>, TransportError> {
        let response = self.post_authenticated(payload).await?;
        Ok(vec![StreamChunk(response)])
    }
}
