use std::path::PathBuf;

use clap::Parser;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use wsrun_cli::app;
use wsrun_cli::commands::cli;
use wsrun_core::api::{AppConfig, CliError, LoggingConfig};

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

#[tokio::main]
async fn main() {
    let exit = match real_main().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            e.exit_code()
        }
    };

    std::process::exit(exit);
}

async fn real_main() -> Result<i32, CliError> {
    let args = cli::Args::parse();
    let cfg = load_config(&args)?;
    init_tracing(&cfg.logging).map_err(CliError::Config)?;

    app::run_app(args, &cfg).await
}

fn load_config(args: &cli::Args) -> Result<AppConfig, CliError> {
    let loaded = match &args.cwd {
        Some(dir) => wsrun_core::config::load_from_dir(dir),
        None => wsrun_core::config::load_default(),
    };
    loaded.map_err(|e| CliError::Config(e.to_string()))
}

fn init_tracing(logging: &LoggingConfig) -> Result<(), String> {
    if !logging.enabled {
        return Ok(());
    }

    let filter = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|_| EnvFilter::from_default_env())
        .map_or_else(|| EnvFilter::try_new(&logging.level), Ok)
        .map_err(|e| format!("invalid log filter: {e}"))?;

    let file_layer = if logging.file {
        let writer = log_file_writer(logging.directory.as_deref())?;
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
    } else {
        None
    };

    // Package output owns stdout; logs only ever go to stderr or a file.
    let console_layer = logging.console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(atty::is(atty::Stream::Stderr))
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| e.to_string())
}

/// Non-blocking writer for `<dir>/wsrun.<pid>.log`. `dir` defaults to
/// `$TMPDIR/wsrun`.
fn log_file_writer(dir: Option<&str>) -> Result<NonBlocking, String> {
    let dir = dir
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("wsrun"));
    std::fs::create_dir_all(&dir)
        .map_err(|e| format!("cannot create log directory {}: {e}", dir.display()))?;

    let appender =
        tracing_appender::rolling::never(&dir, format!("wsrun.{}.log", std::process::id()));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Ok(writer)
}
