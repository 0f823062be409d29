#[allow(clippy::module_inception)]
pub mod error;
pub mod executor;

pub use error::{CliError, ProcessError, WorkspaceError};
pub use executor::ExecutorError;
