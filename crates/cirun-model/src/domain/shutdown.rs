use std::{fmt, path::PathBuf, time::Duration};

use crate::RunnerConfig;

/// Why the runner is going down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownCause {
    /// Graceful termination (signal, idle timeout, single job, clean exit...).
    Reason(String),
    /// Error-triggered termination; the process exits with code 1.
    Error(String),
}

impl ShutdownCause {
    pub fn reason(r: impl Into<String>) -> Self {
        ShutdownCause::Reason(r.into())
    }

    pub fn error(e: impl fmt::Display) -> Self {
        ShutdownCause::Error(e.to_string())
    }

    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, ShutdownCause::Error(_))
    }

    pub fn as_message(&self) -> &str {
        match self {
            ShutdownCause::Reason(r) => r,
            ShutdownCause::Error(e) => e,
        }
    }

    /// Process exit code for this cause.
    #[inline]
    pub fn exit_code(&self) -> i32 {
        if self.is_error() { 1 } else { 0 }
    }
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownCause::Reason(r) => write!(f, "reason: {r}"),
            ShutdownCause::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Snapshot taken the moment a trigger fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutdownRequest {
    pub cause: ShutdownCause,
    /// The runner lives on a provisioned instance with its own orchestrator.
    pub cloud: bool,
    /// Infra workspace to destroy, if a destroy target was declared.
    pub destroy_target: Option<PathBuf>,
    pub destroy_delay: Duration,
}

impl ShutdownRequest {
    pub fn new(cause: ShutdownCause, config: &RunnerConfig) -> Self {
        Self {
            cause,
            cloud: config.is_cloud(),
            destroy_target: config
                .tf_resource
                .as_ref()
                .map(|_| config.infra_dir().clone()),
            destroy_delay: config.destroy_delay,
        }
    }
}

/// Lifecycle state; transitions strictly forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum OrchestratorState {
    Starting = 0,
    Running = 1,
    ShuttingDown = 2,
    Terminated = 3,
}

impl OrchestratorState {
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => OrchestratorState::Starting,
            1 => OrchestratorState::Running,
            2 => OrchestratorState::ShuttingDown,
            _ => OrchestratorState::Terminated,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrchestratorState::Starting => "starting",
            OrchestratorState::Running => "running",
            OrchestratorState::ShuttingDown => "shutting_down",
            OrchestratorState::Terminated => "terminated",
        }
    }
}
