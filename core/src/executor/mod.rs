//! Dependency-aware execution of one command across workspace packages.
//!
//! ```text
//! Vec<Package>
//!   ↓
//! PackageGraph::from_packages()
//!   ↓
//! PackageGraph::validate() → detect_cycles()
//!   ↓
//! Scheduler::run() → lookup_or_schedule() per target, gated by mode
//!   ↓
//! RunResult → Report::render()
//! ```

mod filter;
mod gate;
mod graph;
pub mod report;
mod scheduler;
pub mod types;

pub use filter::PackageFilter;
pub use gate::{Gate, GatePermit};
pub use graph::PackageGraph;
pub use report::{Bucket, Report};
pub use scheduler::Scheduler;
pub use types::{Mode, PackageOutcome, RunEvent, RunOptions, RunResult, SkipReason, TaskState};
