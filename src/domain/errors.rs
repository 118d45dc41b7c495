// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Error taxonomy for the fuzzer core. Each category is a distinct
//! `thiserror` enum; [`FuzzError`] unifies them at the orchestrator's single
//! fallible boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection to {endpoint} failed: {reason}")]
    Connection { endpoint: String, reason: String },

    #[error("malformed response: {0}")]
    Response(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("network policy denied request to host {host}")]
    NetworkPolicy { host: String },

    #[error("invalid payload: {0}")]
    Payload(String),

    #[error("transport already closed")]
    Closed,
}

#[derive(Debug, Error)]
pub enum FuzzerTimeoutError {
    #[error("request timed out after {elapsed_ms}ms")]
    Request { elapsed_ms: u64 },

    #[error("process {pid} did not respond within {elapsed_ms}ms")]
    Process { pid: u32, elapsed_ms: u64 },
}

#[derive(Debug, Error)]
pub enum SafetyViolation {
    #[error("host {host} is not on the allow-list")]
    NetworkPolicy { host: String },

    #[error("argument matched a dangerous system-command pattern: {pattern}")]
    SystemCommand { pattern: String },

    #[error("path escapes the sandbox root: {path}")]
    Filesystem { path: String },
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server returned JSON-RPC error {code}: {message}")]
    ServerReturnedError { code: i64, message: String },

    #[error("server unavailable: {0}")]
    ServerUnavailable(String),

    #[error("protocol negotiation failed: client={client_version} server={server_version}")]
    ProtocolNegotiationFailed {
        client_version: String,
        server_version: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("failed to read configuration: {0}")]
    FileRead(String),

    #[error("invalid configuration at {field}: {reason}")]
    Validation { field: String, reason: String },
}

#[derive(Debug, Error)]
pub enum FuzzingError {
    #[error("generation strategy failed: {0}")]
    Strategy(String),

    #[error("executor failed: {0}")]
    Executor(String),
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to start process: {0}")]
    ProcessStart(String),

    #[error("failed to stop process {pid}: {reason}")]
    ProcessStop { pid: u32, reason: String },

    #[error("failed to send signal to process {pid}: {reason}")]
    SignalSend { pid: u32, reason: String },

    #[error("process {pid} is already registered")]
    RegistryConflict { pid: u32 },

    #[error("watchdog failed to start: {0}")]
    WatchdogStart(String),
}

/// Crate-wide error, the orchestrator's single fallible boundary.
#[derive(Debug, Error)]
pub enum FuzzError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Timeout(#[from] FuzzerTimeoutError),

    #[error(transparent)]
    Safety(#[from] SafetyViolation),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Fuzzing(#[from] FuzzingError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),

    #[error(transparent)]
    Schema(#[from] super::tool::SchemaError),

    #[error(transparent)]
    PathSanitizer(#[from] super::path_sanitizer::PathSanitizerError),
}
