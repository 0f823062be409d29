use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub run: RunDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default = "default_logging_file")]
    pub file: bool,

    /// EnvFilter string, e.g. "warn" or "wsrun_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_file() -> bool {
    false
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: default_logging_file(),
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Defaults applied to every run unless overridden on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDefaults {
    /// Program used to build each package's command line.
    #[serde(default = "default_bin")]
    pub bin: String,

    /// Gate width used by `stages` mode.
    #[serde(default = "default_stages_width")]
    pub stages_width: usize,

    /// Prefix package output with the package name.
    #[serde(default = "default_prefix")]
    pub prefix: bool,

    /// Print the outcome report after the run.
    #[serde(default)]
    pub report: bool,
}

fn default_bin() -> String {
    "npm".to_string()
}

fn default_stages_width() -> usize {
    16
}

fn default_prefix() -> bool {
    true
}

impl Default for RunDefaults {
    fn default() -> Self {
        Self {
            bin: default_bin(),
            stages_width: default_stages_width(),
            prefix: default_prefix(),
            report: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [run]
            bin = "yarn"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.run.bin, "yarn");
        assert_eq!(cfg.run.stages_width, 16);
        assert!(cfg.run.prefix);
        assert_eq!(cfg.logging.level, "warn");
    }
}
