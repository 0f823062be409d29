pub mod config;
pub mod event;
pub mod result;
pub mod task;

pub use config::*;
pub use event::*;
pub use result::*;
pub use task::*;
