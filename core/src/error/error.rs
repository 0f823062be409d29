use thiserror::Error;

use super::executor::ExecutorError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("{0}")]
    Executor(#[from] ExecutorError),
    #[error("workspace error: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error("config error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    /// Process exit code reported by the binary for this error.
    pub fn exit_code(&self) -> i32 {
        // 2: dependency cycle
        // 3: unknown package
        // 11: config error
        // 20: workspace / IO error
        // 50: internal/uncategorized
        match self {
            Self::Executor(e) => e.exit_code(),
            Self::Workspace(_) => 20,
            Self::Config(_) => 11,
            Self::Io(_) => 20,
            Self::Anyhow(_) => 50,
        }
    }
}

/// Failure carried by a process completion signal.
///
/// Cloned into every waiter, so it only holds owned strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`: {message}")]
    Spawn { command: String, message: String },

    #[error("`{command}` exited with code {code}")]
    Exit { command: String, code: i32 },

    #[error("`{command}` was cancelled")]
    Cancelled { command: String },
}

impl ProcessError {
    pub fn is_spawn(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }
}

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid manifest {path}: {source}")]
    Manifest {
        path: String,
        source: serde_json::Error,
    },

    #[error("invalid workspace pattern '{pattern}': {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("package '{0}' is declared more than once")]
    DuplicatePackage(String),
}
