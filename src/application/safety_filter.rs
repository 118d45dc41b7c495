// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cross-cutting safety filter: dangerous-argument detection, filesystem
//! sandboxing, host allow-listing, and subprocess environment scrubbing.
//!
//! The host allow-list's wildcard matching is generalized from the
//! orchestrator's own network policy engine; the filesystem sandbox reuses
//! [`crate::domain::path_sanitizer`] almost verbatim.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tracing::debug;

use crate::domain::jsonrpc::{JsonRpcMessage, RpcErrorObject, RpcId};
use crate::domain::path_sanitizer::PathSanitizer;

/// Environment variables stripped from every spawned subprocess.
pub const SCRUBBED_ENV_VARS: &[&str] = &[
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "ALL_PROXY",
    "NO_PROXY",
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
];

static DANGEROUS_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("url-scheme", Regex::new(r"(?i)^(https?|file|ftp)://").unwrap()),
        ("script-injection", Regex::new(r"(?i)<script|javascript:|onerror\s*=").unwrap()),
        (
            "command-pattern",
            Regex::new(r"(?i)\brm\s+-rf\b|\bsudo\b|\bshutdown\b|\bmkfs\b|:\(\)\s*\{\s*:\|:\s*&\s*\}\s*;\s*:").unwrap(),
        ),
        ("browser-launcher", Regex::new(r"(?i)\bxdg-open\b|\bstart\b\s+http|\bopen\s+-a\b").unwrap()),
    ]
});

/// The outcome of gating a single tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum SafetyDecision {
    Allow,
    Sanitize { sanitized_args: Value, reason: String },
    Block { reason: String },
}

/// Immutable, constructed once, shared (read-only) across concurrent runs.
pub struct SafetyFilter {
    fs_root: String,
    allowed_hosts: Vec<String>,
    deny_network_by_default: bool,
    sanitizer: PathSanitizer,
}

impl SafetyFilter {
    pub fn new(fs_root: impl Into<String>, allowed_hosts: Vec<String>, deny_network_by_default: bool) -> Self {
        Self {
            fs_root: fs_root.into(),
            allowed_hosts,
            deny_network_by_default,
            sanitizer: PathSanitizer::new(),
        }
    }

    /// Runs the 4-step gating pipeline against a tool call's arguments.
    pub fn evaluate_tool_call(&self, arguments: &Value) -> SafetyDecision {
        if let Some(reason) = self.detect_dangerous_string(arguments) {
            return SafetyDecision::Block { reason };
        }

        let (sanitized, changed) = self.sanitize_paths(arguments.clone());
        if changed {
            return SafetyDecision::Sanitize {
                sanitized_args: sanitized,
                reason: "argument path rewritten to stay within the sandbox root".to_string(),
            };
        }

        SafetyDecision::Allow
    }

    /// A synthetic JSON-RPC error response standing in for a blocked call,
    /// so the orchestrator can continue without reaching the transport.
    pub fn blocked_mock_response(&self, id: RpcId, reason: &str) -> JsonRpcMessage {
        JsonRpcMessage::Error {
            jsonrpc: "2.0".to_string(),
            id,
            error: RpcErrorObject {
                code: -32000,
                message: format!("blocked by safety filter: {reason}"),
                data: None,
            },
        }
    }

    /// Checks whether `host` is permitted to receive outbound traffic,
    /// supporting `*.` wildcard subdomain entries.
    pub fn host_allowed(&self, host: &str) -> bool {
        let local_only = self.deny_network_by_default && matches!(host, "localhost" | "127.0.0.1" | "::1");
        let configured = self.allowed_hosts.iter().any(|pattern| matches_host_pattern(pattern, host));
        let allowed = local_only || configured;
        if !allowed {
            debug!(host, "outbound host denied by allow-list");
        }
        allowed
    }

    /// Same-origin + allow-list check applied after following a redirect.
    pub fn redirect_allowed(&self, original_host: &str, new_host: &str) -> bool {
        if new_host != original_host {
            debug!(original_host, new_host, "redirect denied: host changed");
            return false;
        }
        self.host_allowed(new_host)
    }

    fn detect_dangerous_string(&self, value: &Value) -> Option<String> {
        match value {
            Value::String(s) => DANGEROUS_PATTERNS
                .iter()
                .find(|(_, re)| re.is_match(s))
                .map(|(name, _)| format!("argument matched dangerous pattern {name:?}: {s:?}")),
            Value::Object(map) => map.values().find_map(|v| self.detect_dangerous_string(v)),
            Value::Array(items) => items.iter().find_map(|v| self.detect_dangerous_string(v)),
            _ => None,
        }
    }

    fn sanitize_paths(&self, value: Value) -> (Value, bool) {
        match value {
            Value::String(s) if looks_like_path(&s) => match self.sanitizer.canonicalize(&s, Some(&self.fs_root)) {
                Ok(_) => (Value::String(s), false),
                Err(_) => (
                    Value::String(format!("{}/safe_default", self.fs_root)),
                    true,
                ),
            },
            Value::Object(map) => {
                let mut changed = false;
                let mut out = serde_json::Map::new();
                for (k, v) in map {
                    let (sanitized, c) = self.sanitize_paths(v);
                    changed |= c;
                    out.insert(k, sanitized);
                }
                (Value::Object(out), changed)
            }
            Value::Array(items) => {
                let mut changed = false;
                let mut out = Vec::with_capacity(items.len());
                for v in items {
                    let (sanitized, c) = self.sanitize_paths(v);
                    changed |= c;
                    out.push(sanitized);
                }
                (Value::Array(out), changed)
            }
            other => (other, false),
        }
    }
}

fn looks_like_path(s: &str) -> bool {
    s.starts_with('/') || s.contains("../") || s.contains("..\\")
}

fn matches_host_pattern(pattern: &str, host: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        host.ends_with(suffix) && host.len() > suffix.len()
    } else {
        pattern == host
    }
}

/// Strips proxy/linker-injection variables from a child's environment
/// before spawn.
pub fn scrub_env(env: &mut std::collections::HashMap<String, String>) {
    for var in SCRUBBED_ENV_VARS {
        env.remove(*var);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn filter() -> SafetyFilter {
        SafetyFilter::new("/tmp/sbx", vec!["127.0.0.1".into(), "*.internal.example".into()], true)
    }

    #[test]
    fn dangerous_url_argument_is_blocked() {
        let args = json!({"url": "https://evil.example/x", "output_path": "/etc/passwd"});
        let decision = filter().evaluate_tool_call(&args);
        assert!(matches!(decision, SafetyDecision::Block { .. }));
    }

    #[test]
    fn path_outside_sandbox_is_sanitized_when_not_dangerous() {
        let args = json!({"output_path": "/etc/not-a-url-just-a-path"});
        let decision = filter().evaluate_tool_call(&args);
        match decision {
            SafetyDecision::Sanitize { sanitized_args, .. } => {
                let p = sanitized_args["output_path"].as_str().unwrap();
                assert!(p.starts_with("/tmp/sbx"));
            }
            other => panic!("expected Sanitize, got {other:?}"),
        }
    }

    #[test]
    fn benign_arguments_are_allowed() {
        let args = json!({"name": "alice", "count": 3});
        assert_eq!(filter().evaluate_tool_call(&args), SafetyDecision::Allow);
    }

    #[test]
    fn wildcard_host_matches_subdomain() {
        assert!(filter().host_allowed("api.internal.example"));
        assert!(!filter().host_allowed("api.external.example"));
    }

    #[test]
    fn default_deny_allows_only_localhost() {
        let f = SafetyFilter::new("/tmp/sbx", vec![], true);
        assert!(f.host_allowed("localhost"));
        assert!(!f.host_allowed("example.com"));
    }

    #[test]
    fn redirect_to_different_host_is_denied() {
        assert!(!filter().redirect_allowed("127.0.0.1", "evil.example"));
    }

    #[test]
    fn scrub_env_removes_proxy_vars() {
        let mut env = std::collections::HashMap::new();
        env.insert("HTTP_PROXY".to_string(), "http://proxy".to_string());
        env.insert("PATH".to_string(), "/usr/bin".to_string());
        scrub_env(&mut env);
        assert!(!env.contains_key("HTTP_PROXY"));
        assert!(env.contains_key("PATH"));
    }
}
