use std::collections::BTreeMap;

use super::task::TaskState;

/// Final outcome of one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageOutcome {
    pub state: TaskState,

    /// Exit code, if the process exited (-1 when killed by a signal).
    pub exit_code: Option<i32>,

    /// Spawn to exit, in milliseconds.
    pub duration_ms: Option<u64>,

    /// Error message (if any)
    pub error: Option<String>,
}

impl PackageOutcome {
    pub fn new(state: TaskState) -> Self {
        Self {
            state,
            exit_code: None,
            duration_ms: None,
            error: None,
        }
    }
}

/// Result of a whole run, keyed by package name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub outcomes: BTreeMap<String, PackageOutcome>,

    /// The run was cut short by fast-exit or an interrupt.
    pub aborted: bool,

    /// Total execution duration in milliseconds
    pub duration_ms: u64,
}

impl RunResult {
    pub fn state(&self, package: &str) -> Option<TaskState> {
        self.outcomes.get(package).map(|o| o.state)
    }

    pub fn failed(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|(_, o)| o.state == TaskState::Failed)
            .map(|(n, _)| n.as_str())
    }

    /// Did any package fail (or was the run aborted)?
    pub fn has_failures(&self) -> bool {
        self.aborted || self.failed().next().is_some()
    }

    pub fn exit_code(&self) -> i32 {
        i32::from(self.has_failures())
    }
}
