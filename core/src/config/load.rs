use std::path::{Path, PathBuf};

use super::types::AppConfig;

const CONFIG_FILE: &str = "wsrun.toml";

/// Get the default wsrun data directory: ~/.wsrun
pub fn get_wsrun_data_dir() -> anyhow::Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".wsrun"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    let cwd = std::env::current_dir()?;
    load_from_dir(&cwd)
}

/// Load configuration for a workspace rooted at `dir`.
///
/// `<dir>/wsrun.toml` wins over `~/.wsrun/config.toml`; environment
/// variables override whichever file was used.
pub fn load_from_dir(dir: &Path) -> anyhow::Result<AppConfig> {
    // Priority 1: ./wsrun.toml (workspace root)
    let local_config = dir.join(CONFIG_FILE);

    // Priority 2: ~/.wsrun/config.toml
    let user_config = get_wsrun_data_dir().ok().map(|d| d.join("config.toml"));

    let mut cfg: AppConfig = if local_config.exists() {
        read_config(&local_config)?
    } else if let Some(path) = user_config.filter(|p| p.exists()) {
        read_config(&path)?
    } else {
        AppConfig::default()
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;

    Ok(cfg)
}

fn read_config(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))
}

fn apply_env_overrides<F>(cfg: &mut AppConfig, get: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = get("WSRUN_BIN") {
        if !v.trim().is_empty() {
            cfg.run.bin = v;
        }
    }
    if let Some(v) = get("WSRUN_STAGES_WIDTH") {
        if !v.trim().is_empty() {
            let width: usize = v
                .trim()
                .parse()
                .map_err(|_| anyhow::anyhow!("WSRUN_STAGES_WIDTH must be a number, got '{v}'"))?;
            cfg.run.stages_width = width.max(1);
        }
    }
    if let Some(v) = get("WSRUN_LOG_LEVEL") {
        if !v.trim().is_empty() {
            cfg.logging.level = v;
        }
    }
    Ok(())
}
