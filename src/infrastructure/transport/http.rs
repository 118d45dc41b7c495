// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Plain HTTP JSON-RPC driver: one POST per call, same-origin redirects
//! only, environment proxies disabled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use crate::application::safety_filter::SafetyFilter;
use crate::domain::errors::TransportError;
use crate::domain::jsonrpc::{JsonRpcMessage, RpcId};

use super::{StreamChunk, Transport};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct HttpTransport {
    client: Client,
    endpoint: Url,
    next_id: AtomicU64,
    safety: Option<SafetyFilter>,
}

impl HttpTransport {
    pub fn new(endpoint: &str, timeout_ms: u64, safety: Option<SafetyFilter>) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint).map_err(|e| TransportError::Payload(e.to_string()))?;
        let client = Client::builder()
            .no_proxy()
            .trust_env(false)
            .timeout(Duration::from_millis(if timeout_ms == 0 {
                DEFAULT_TIMEOUT_SECS * 1000
            } else {
                timeout_ms
            }))
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

    async fn post(&self, body: Value) -> Result<Value, TransportError> {
        self.check_host()?;
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(endpoint = %self.endpoint, error = %e, "http request failed");
                TransportError::Connection {
                    endpoint: self.endpoint.to_string(),
                    reason: e.to_string(),
                }
            })?;

        // Only same-origin 307/308 redirects are honored; `Policy::none()`
        // above means reqwest never follows automatically, so a redirect
        // status here is surfaced as a policy failure rather than silently
        // chased cross-origin.
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

            self.client
                .post(target)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    warn!(target_host, error = %e, "redirected http request failed");
                    TransportError::Connection {
                        endpoint: target_host.to_string(),
                        reason: e.to_string(),
                    }
                })?
        } else {
            response
        };

        response
            .json::<Value>()
            .await
            .map_err(|e| TransportError::Response(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
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
        let response = self.post(body).await?;
        if let Some(error) = response.get("error") {
            return Err(TransportError::Response(error.to_string()));
        }
        response
            .get("result")
            .cloned()
            .ok_or_else(|| TransportError::Response("response had neither result nor error".into()))
    }

    async fn send_raw(&self, payload: Value) -> Result<JsonRpcMessage, TransportError> {
        let response = self.post(payload).await?;
        Ok(JsonRpcMessage::Raw(response))
    }

    async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
        self.check_host()?;
        let mut body = json!({"jsonrpc": "2.0", "method": method});
        if let Some(p) = params {
            body["params"] = p;
        }
        self.client
            .post(self.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| TransportError::Connection {
                endpoint: self.endpoint.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }

    async fn send_batch(&self, requests: Vec<JsonRpcMessage>) -> Result<Vec<JsonRpcMessage>, TransportError> {
        let body = serde_json::to_value(&requests).map_err(|e| TransportError::Payload(e.to_string()))?;
        let response = self.post(body).await?;
        let array = response
            .as_array()
            .ok_or_else(|| TransportError::Response("batch response was not a JSON array".into()))?;
        Ok(array.iter().cloned().map(JsonRpcMessage::Raw).collect())
    }

    async fn stream_request(&self, payload: Value) -> Result<Vec<StreamChunk>, TransportError> {
        let response = self.post(payload).await?;
        Ok(vec![StreamChunk(response)])
    }
}

pub fn fresh_id(counter: &AtomicU64) -> RpcId {
    RpcId::Number(counter.fetch_add(1, Ordering::SeqCst).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_endpoint() {
        let err = HttpTransport::new("not a url", 1000, None);
        assert!(err.is_err());
    }

    #[test]
    fn host_check_denies_non_allow_listed_host() {
        let filter = SafetyFilter::new("/tmp/sbx", vec!["127.0.0.1".into()], true);
        let transport = HttpTransport::new("http://evil.example/rpc", 1000, Some(filter)).unwrap();
        assert!(transport.check_host().is_err());
    }

    #[test]
    fn host_check_allows_allow_listed_host() {
        let filter = SafetyFilter::new("/tmp/sbx", vec!["127.0.0.1".into()], true);
        let transport = HttpTransport::new("http://127.0.0.1:8080/rpc", 1000, Some(filter)).unwrap();
        assert!(transport.check_host().is_ok());
    }
}
