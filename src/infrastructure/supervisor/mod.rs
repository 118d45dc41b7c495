// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Process supervisor: registry, watchdog, signal dispatcher, and the
//! lifecycle operations that compose them.

pub mod registry;
pub mod signal;
pub mod watchdog;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::safety_filter::scrub_env;
use crate::domain::errors::SupervisorError;
use crate::domain::process::{ProcessConfig, ProcessState};

use registry::ProcessRegistry;
use signal::{SignalDispatcher, SignalKind};
use watchdog::Watchdog;

/// Grace window before a `stop()` request escalates to force-kill.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(5);

pub struct Supervisor {
    pub registry: ProcessRegistry,
    dispatcher: SignalDispatcher,
    watchdog_cancellation: CancellationToken,
    /// The registry's process records are plain, serializable data; the
    /// live child handles are kept here so the registry doesn't need to
    /// know about `tokio::process::Child`.
    children: Arc<Mutex<HashMap<u32, Child>>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self {
            registry: ProcessRegistry::new(),
            dispatcher: SignalDispatcher::platform_default(),
            watchdog_cancellation: CancellationToken::new(),
            children: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawns the child with a scrubbed environment, registers it, and
    /// transitions Starting -> Running.
    pub async fn start(&self, config: ProcessConfig) -> Result<u32, SupervisorError> {
        let mut env: std::collections::HashMap<String, String> = std::env::vars().collect();
        scrub_env(&mut env);

        let child = Command::new(&config.command)
            .args(&config.args)
            .env_clear()
            .envs(env)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SupervisorError::ProcessStart(e.to_string()))?;

        let pid = child.id().ok_or_else(|| SupervisorError::ProcessStart("child exited before pid was observed".into()))?;
        self.registry.register(pid, config.clone()).await?;
        self.registry.transition(pid, ProcessState::Running).await?;
        self.children.lock().await.insert(pid, child);
        info!(pid, command = %config.command, "supervised process started");
        Ok(pid)
    }

    /// Transitions Running -> Stopping, signals, waits up to `grace`, then
    /// escalates to force-kill if the process is still registered.
    pub async fn stop(&self, pid: u32, grace: Duration) -> Result<(), SupervisorError> {
        self.registry.transition(pid, ProcessState::Stopping).await?;
        self.dispatcher.dispatch(pid, SignalKind::Timeout).await?;
        tokio::time::sleep(grace).await;

        let still_running = {
            let mut children = self.children.lock().await;
            match children.get_mut(&pid) {
                Some(child) => child.try_wait().ok().flatten().is_none(),
                None => false,
            }
        };

        if still_running {
            warn!(pid, "process still running after grace period, force-killing");
            self.dispatcher.dispatch(pid, SignalKind::Force).await?;
            self.registry.transition(pid, ProcessState::Failed).await?;
        }
        self.children.lock().await.remove(&pid);
        self.registry.unregister(pid).await;
        info!(pid, "supervised process stopped");
        Ok(())
    }

    pub fn spawn_watchdog(&self, check_interval: Duration, auto_kill: bool) -> tokio::task::JoinHandle<()> {
        let watchdog = Watchdog::new(
            self.registry.clone(),
            SignalDispatcher::platform_default(),
            check_interval,
            auto_kill,
        );
        let cancellation = self.watchdog_cancellation.clone();
        tokio::spawn(async move { watchdog.run(cancellation).await })
    }

    /// Stops every registered process concurrently, then stops the
    /// watchdog, then drops the registry's remaining entries.
    pub async fn shutdown(&self) {
        self.watchdog_cancellation.cancel();
        let pids: Vec<u32> = self.registry.snapshot().await.iter().map(|r| r.pid).collect();
        let stops = pids.into_iter().map(|pid| self.stop(pid, DEFAULT_STOP_GRACE));
        futures::future::join_all(stops).await;
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_registers_and_transitions_to_running() {
        let supervisor = Supervisor::new();
        let config = ProcessConfig {
            command: "sleep".into(),
            args: vec!["5".into()],
            process_timeout_ms: 60_000,
            extra_buffer_ms: 60_000,
            max_hang_time_ms: 120_000,
        };
        let pid = supervisor.start(config).await.unwrap();
        let snapshot = supervisor.registry.snapshot().await;
        assert!(snapshot.iter().any(|r| r.pid == pid && r.state == ProcessState::Running));
        supervisor.stop(pid, Duration::from_millis(50)).await.unwrap();
    }
}
