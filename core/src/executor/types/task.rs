use std::fmt;

use serde::{Deserialize, Serialize};

/// How package processes are admitted and ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Everything launches at once; dependencies are launched first but not awaited.
    Parallel,
    /// One process at a time, in dependency order.
    #[default]
    Serial,
    /// Dependency order with a bounded number of concurrent processes.
    Stages,
}

impl Mode {
    /// Whether dependents wait for their dependencies' `finished` signal.
    pub fn awaits_dependencies(self) -> bool {
        !matches!(self, Self::Parallel)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parallel => "parallel",
            Self::Serial => "serial",
            Self::Stages => "stages",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkipReason {
    Excluded,
    MissingScript,
}

/// Lifecycle of one package within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Referenced, waiting on its dependencies.
    Unscheduled,
    /// Passed the filters, waiting for a gate slot.
    Pending,
    Skipped(SkipReason),
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Skipped(_) | Self::Succeeded | Self::Failed | Self::Cancelled
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unscheduled => "not started",
            Self::Pending => "pending",
            Self::Skipped(SkipReason::Excluded) => "skipped (excluded)",
            Self::Skipped(SkipReason::MissingScript) => "skipped (missing script)",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        })
    }
}
