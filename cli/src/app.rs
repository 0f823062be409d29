use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;
use wsrun_core::api::{
    discover, AppConfig, CliError, PackageGraph, Report, RunDefaults, RunEvent, RunOptions,
    Scheduler, StdioSink,
};

use crate::commands::cli::Args;

/// Workspace root selected by `--cwd`, else the current directory.
pub fn workspace_root(args: &Args) -> Result<PathBuf, CliError> {
    match &args.cwd {
        Some(dir) => Ok(dir.clone()),
        None => Ok(std::env::current_dir()?),
    }
}

/// Merge command-line flags over configured defaults.
pub fn build_options(args: &Args, defaults: &RunDefaults) -> RunOptions {
    let mut opts = RunOptions::new(args.command.clone());
    opts.targets = args.packages.clone();
    opts.mode = args.mode();
    opts.recursive = args.recursive;
    opts.include = args.include.clone();
    opts.exclude = args.exclude.clone();
    opts.exclude_missing = args.exclude_missing;
    opts.fast_exit = args.fast_exit;
    opts.collect_logs = args.collect_logs;
    opts.prefix = defaults.prefix && !args.no_prefix;
    opts.done_criteria = args.done_criteria.clone();
    opts.bin = args.bin.clone().unwrap_or_else(|| defaults.bin.clone());
    opts.no_run = args.no_run;
    opts.args = args.extra.clone();
    opts.stages_width = args.concurrency.unwrap_or(defaults.stages_width).max(1);
    opts
}

/// Discover the workspace, run the command and return the process exit code.
pub async fn run_app(args: Args, cfg: &AppConfig) -> Result<i32, CliError> {
    let root = workspace_root(&args)?;
    let packages = discover(&root)?;
    tracing::info!(root = %root.display(), packages = packages.len(), "workspace loaded");

    let graph = PackageGraph::from_packages(packages)?;
    let opts = build_options(&args, &cfg.run);
    let show_report = args.report || cfg.run.report;

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RunEvent>();
    let event_log = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            tracing::debug!(event = ?event, "run event");
        }
    });

    let scheduler = Scheduler::new(graph, opts, Arc::new(StdioSink::new()))?
        .with_events(event_tx)
        .with_interrupt(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for interrupts");
                std::future::pending::<()>().await;
            }
        });

    let result = scheduler.run().await?;
    let _ = event_log.await;

    if show_report {
        print!("{}", Report::from_result(&result).render());
    }
    for name in result.failed() {
        tracing::warn!(package = %name, "package failed");
    }

    Ok(result.exit_code())
}
