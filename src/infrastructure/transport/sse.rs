// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Server-sent-events driver: manual `event:`/`data:` line parsing with
//! blank-line frame boundaries, correlating responses to requests by `id`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::warn;
use url::Url;

use crate::application::safety_filter::SafetyFilter;
use crate::domain::errors::TransportError;
use crate::domain::jsonrpc::JsonRpcMessage;

use super::{StreamChunk, Transport};

/// Parses an SSE response body into a single JSON value: `data:` lines are
/// accumulated until a blank line closes the frame, then parsed as one
/// JSON document. Only the first frame is used for request/response calls;
/// [`parse_sse_frames`] returns every frame for streaming.
pub fn parse_sse_body(body: &str) -> Result<Value, TransportError> {
    let frames = parse_sse_frames(body)?;
    frames
        .into_iter()
        .next()
        .ok_or_else(|| TransportError::Response("SSE stream produced no frames".into()))
}

/// Parses every `data:`-delimited frame in an SSE body.
pub fn parse_sse_frames(body: &str) -> Result<Vec<Value>, TransportError> {
    let mut frames = Vec::new();
    let mut data_lines: Vec<&str> = Vec::new();

    for line in body.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            if !data_lines.is_empty() {
                let joined = data_lines.join("\n");
                let value: Value = serde_json::from_str(&joined).map_err(|e| TransportError::Response(e.to_string()))?;
                frames.push(value);
                data_lines.clear();
            }
            continue;
        }
        if let Some(data) = line.strip_prefix("data:") {
            data_lines.push(data.trim_start());
        }
        // `event:` lines are accepted but not separately modeled; MCP's SSE
        // transport carries everything in `data:` payloads.
    }

    if !data_lines.is_empty() {
        let joined = data_lines.join("\n");
        let value: Value = serde_json::from_str(&joined).map_err(|e| TransportError::Response(e.to_string()))?;
        frames.push(value);
    }

    Ok(frames)
}

pub struct SseTransport {
    client: Client,
    endpoint: Url,
    next_id: AtomicU64,
    safety: Option<SafetyFilter>,
}

impl SseTransport {
    pub fn new(endpoint: &str, timeout_ms: u64, safety: Option<SafetyFilter>) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint).map_err(|e| TransportError::Payload(e.to_string()))?;
        let client = Client::builder()
            .no_proxy()
            .trust_env(false)
            .timeout(Duration::from_millis(timeout_ms.max(1)))
            .build()
            .map_err(|e| TransportError::Connection {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            endpoint,
            next_id: AtomicU64::new(1),
            safety,
        })
    }

    fn check_host(&self) -> Result<(), TransportError> {
        if let Some(filter) = &self.safety {
            let host = self.endpoint.host_str().unwrap_or_default();
            if !filter.host_allowed(host) {
                return Err(TransportError::NetworkPolicy { host: host.to_string() });
            }
        }
        Ok(())
    }

    async fn get_frames(&self, payload: &Value) -> Result<Vec<Value>, TransportError> {
        self.check_host()?;
        let response = self
            .client
            .get(self.endpoint.clone())
            .query(&[("payload", payload.to_string())])
            .send()
            .await
            .map_err(|e| TransportError::Connection {
                endpoint: self.endpoint.to_string(),
                reason: e.to_string(),
            })?;
        let text = response.text().await.map_err(|e| TransportError::Response(e.to_string()))?;
        parse_sse_frames(&text)
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        self.check_host()
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_request(&self, method: &str, params: Option<Value>) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut body = json!({"jsonrpc": "2.0", "id": id, "method": method});
        if let Some(p) = params {
            body["params"] = p;
        }
        let frames = self.get_frames(&body).await?;
        let response = frames
            .into_iter()
            .find(|f| f.get("id").map(|v| v == &json!(id)).unwrap_or(false))
            .ok_or_else(|| {
                warn!(id, "no SSE frame correlated to request id");
                TransportError::Response(format!("no SSE frame correlated to id {id}"))
            })?;
        if let Some(error) = response.get("error") {
            return Err(TransportError::Response(error.to_string()));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| TransportError::Response("response had neither result nor error".into()))
    }

    async fn send_raw(&self, payload: Value) -> Result<JsonRpcMessage, TransportError> {
        let frames = self.get_frames(&payload).await?;
        let first = frames.into_iter().next().unwrap_or(Value::Null);
        Ok(JsonRpcMessage::Raw(first))
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        self.check_host()?;
        let mut body = json!({"jsonrpc": "2.0", "method": method});
        if let Some(p) = params {
            body["params"] = p;
        }
        let _ = self.get_frames(&body).await;
        Ok(())
    }

    async fn send_batch(&self, requests: Vec<JsonRpcMessage>) -> Result<Vec<JsonRpcMessage>, TransportError> {
        let body = serde_json::to_value(&requests).map_err(|e| TransportError::Payload(e.to_string()))?;
        let frames = self.get_frames(&body).await?;
        Ok(frames.into_iter().map(JsonRpcMessage::Raw).collect())
    }

    async fn stream_request(&self, payload: Value) -> Result<Vec<StreamChunk>, TransportError> {
        let frames = self.get_frames(&payload).await?;
        Ok(frames.into_iter().map(StreamChunk).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_frame() {
        let body = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":null}\n\n";
        let value = parse_sse_body(body).unwrap();
        assert_eq!(value["id"], json!(1));
    }

    #[test]
    fn parses_multiple_frames() {
        let body = "data: {\"a\":1}\n\ndata: {\"a\":2}\n\n";
        let frames = parse_sse_frames(body).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn multi_line_data_is_joined() {
        let body = "data: {\"a\":\ndata: 1}\n\n";
        let frames = parse_sse_frames(body).unwrap();
        assert_eq!(frames[0]["a"], json!(1));
    }

    #[test]
    fn empty_body_yields_no_frames() {
        let frames = parse_sse_frames("").unwrap();
        assert!(frames.is_empty());
    }
}
