use std::fmt;
use std::path::PathBuf;

use regex::Regex;

use crate::error::ProcessError;

use super::output::LinePrefixer;

/// Per-process behaviour shared by every package of a run.
#[derive(Clone, Default)]
pub struct RunnerOptions {
    /// Buffer all output and write it in one block once the process closes.
    pub collect_logs: bool,
    pub line_prefixer: Option<LinePrefixer>,
    /// A matching output line resolves `finished` without waiting for exit.
    pub done_criteria: Option<Regex>,
    /// Reject `finished` when the process exits non-zero.
    pub reject_on_non_zero_exit: bool,
}

impl fmt::Debug for RunnerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerOptions")
            .field("collect_logs", &self.collect_logs)
            .field("line_prefixer", &self.line_prefixer.is_some())
            .field("done_criteria", &self.done_criteria.as_ref().map(Regex::as_str))
            .field("reject_on_non_zero_exit", &self.reject_on_non_zero_exit)
            .finish()
    }
}

/// What to run for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub package: String,
    pub command_line: String,
    pub cwd: PathBuf,
}

/// Sent once per process when the OS reports termination (or spawn failed).
#[derive(Debug, Clone)]
pub struct ExitNotice {
    pub package: String,
    pub code: Result<i32, ProcessError>,
}
