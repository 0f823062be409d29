mod load;
mod types;

pub use load::{get_wsrun_data_dir, load_default, load_from_dir};
pub use types::{AppConfig, LoggingConfig, RunDefaults};
