mod io_pump;
mod latch;
mod output;
mod process;
mod types;

pub use io_pump::{LineStream, LineTap};
pub use latch::Latch;
pub use output::{package_prefixer, LinePrefixer, LineSink, MemorySink, StdioSink};
pub use process::{ProcessHandle, ProcessRunner};
pub use types::{ExitNotice, ProcessSpec, RunnerOptions};
