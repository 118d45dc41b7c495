// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Process record and lifecycle state, tracked by the process supervisor's
//! registry. Modeled after the orchestrator's own tool-server status
//! machine: a small closed set of states with explicit transition rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::SupervisorError;

/// Lifecycle state of a supervised subprocess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ProcessState {
    /// Validates a transition by checking the *current* state before moving
    /// to the next one, rather than trusting the caller's requested state.
    pub fn validate_transition(self, to: ProcessState) -> Result<(), SupervisorError> {
        use ProcessState::*;
        let allowed = matches!(
            (self, to),
            (Starting, Running)
                | (Starting, Failed)
                | (Running, Stopping)
                | (Running, Failed)
                | (Stopping, Stopped)
                | (Stopping, Failed)
        );
        if allowed {
            Ok(())
        } else {
            Err(SupervisorError::ProcessStop {
                pid: 0,
                reason: format!("invalid transition {self:?} -> {to:?}"),
            })
        }
    }
}

/// Configuration used to spawn and monitor a single subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessConfig {
    pub command: String,
    pub args: Vec<String>,
    pub process_timeout_ms: u64,
    pub extra_buffer_ms: u64,
    pub max_hang_time_ms: u64,
}

/// A supervised process, owned exclusively by the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub config: ProcessConfig,
    pub state: ProcessState,
    pub registered_at: DateTime<Utc>,
    pub last_activity_ts: DateTime<Utc>,
}

impl ProcessRecord {
    pub fn new(pid: u32, config: ProcessConfig) -> Self {
        let now = Utc::now();
        Self {
            pid,
            config,
            state: ProcessState::Starting,
            registered_at: now,
            last_activity_ts: now,
        }
    }

    pub fn transition(&mut self, to: ProcessState) -> Result<(), SupervisorError> {
        self.state.validate_transition(to)?;
        self.state = to;
        Ok(())
    }

    pub fn touch(&mut self) {
        self.last_activity_ts = Utc::now();
    }

    /// How long since the process last reported activity.
    pub fn idle_for(&self) -> chrono::Duration {
        Utc::now() - self.last_activity_ts
    }
}

/// The watchdog's classification of a process's current idle duration
/// against its configured thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAssessment {
    Ok,
    Warn,
    GracefulTerminate,
    ForceKill,
}

impl ProcessRecord {
    pub fn assess_health(&self) -> HealthAssessment {
        let idle_ms = self.idle_for().num_milliseconds().max(0) as u64;
        let ProcessConfig {
            process_timeout_ms,
            extra_buffer_ms,
            max_hang_time_ms,
            ..
        } = self.config;
        if idle_ms >= max_hang_time_ms {
            HealthAssessment::ForceKill
        } else if idle_ms >= process_timeout_ms + extra_buffer_ms {
            HealthAssessment::GracefulTerminate
        } else if idle_ms >= process_timeout_ms {
            HealthAssessment::Warn
        } else {
            HealthAssessment::Ok
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProcessConfig {
        ProcessConfig {
            command: "true".into(),
            args: vec![],
            process_timeout_ms: 2_000,
            extra_buffer_ms: 1_000,
            max_hang_time_ms: 5_000,
        }
    }

    #[test]
    fn valid_transitions_succeed() {
        let mut record = ProcessRecord::new(1234, config());
        assert!(record.transition(ProcessState::Running).is_ok());
        assert!(record.transition(ProcessState::Stopping).is_ok());
        assert!(record.transition(ProcessState::Stopped).is_ok());
    }

    #[test]
    fn invalid_transition_rejected() {
        let mut record = ProcessRecord::new(1234, config());
        assert!(record.transition(ProcessState::Stopped).is_err());
    }

    #[test]
    fn fresh_process_is_healthy() {
        let record = ProcessRecord::new(1234, config());
        assert_eq!(record.assess_health(), HealthAssessment::Ok);
    }
}
