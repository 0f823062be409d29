//! Stable re-exports for consumers (`cli` and external crates).
//!
//! Prefer importing from `wsrun_core::api` instead of reaching into internal modules.

pub use crate::config::{load_default, AppConfig, LoggingConfig, RunDefaults};
pub use crate::error::{CliError, ExecutorError, ProcessError, WorkspaceError};
pub use crate::executor::{
    Bucket, Mode, PackageGraph, Report, RunEvent, RunOptions, RunResult, Scheduler, SkipReason,
    TaskState,
};
pub use crate::runner::{LineSink, MemorySink, StdioSink};
pub use crate::workspace::{discover, Package};
