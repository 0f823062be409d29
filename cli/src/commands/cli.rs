use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use wsrun_core::api::Mode;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "wsrun",
    version,
    about = "Run a package script across a workspace in dependency order"
)]
#[command(group(ArgGroup::new("mode").args(["parallel", "serial", "stages"])))]
pub struct Args {
    /// Script to run in each package, e.g. `build`.
    pub command: String,

    /// Packages to run. Defaults to every workspace package.
    pub packages: Vec<String>,

    /// Extra arguments passed to every command (after `--`).
    #[arg(last = true)]
    pub extra: Vec<String>,

    /// Launch every package at once without waiting for dependencies.
    #[arg(long)]
    pub parallel: bool,

    /// Run one package at a time in dependency order (default).
    #[arg(long)]
    pub serial: bool,

    /// Run in dependency order with bounded concurrency.
    #[arg(long)]
    pub stages: bool,

    /// Also run dependencies of the requested packages.
    #[arg(short, long)]
    pub recursive: bool,

    /// Only run packages matching this glob. Can be specified multiple times.
    #[arg(long, action = clap::ArgAction::Append, conflicts_with = "exclude")]
    pub include: Vec<String>,

    /// Skip packages matching this glob. Can be specified multiple times.
    #[arg(long, action = clap::ArgAction::Append)]
    pub exclude: Vec<String>,

    /// Skip packages that do not define the script.
    #[arg(long)]
    pub exclude_missing: bool,

    /// Stop everything as soon as one package fails.
    #[arg(long)]
    pub fast_exit: bool,

    /// Print each package's output only once it has finished.
    #[arg(long)]
    pub collect_logs: bool,

    #[arg(long)]
    pub no_prefix: bool,

    /// Regex marking a long-running package as done for its dependents.
    #[arg(long)]
    pub done_criteria: Option<String>,

    /// Package manager binary (default from config, else `npm`).
    #[arg(long)]
    pub bin: Option<String>,

    /// Run `<bin> <command>` instead of `<bin> run <command>`.
    #[arg(long)]
    pub no_run: bool,

    /// Print a per-package report at the end.
    #[arg(long)]
    pub report: bool,

    /// Concurrency for `--stages`.
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Workspace root (default: current directory).
    #[arg(long)]
    pub cwd: Option<PathBuf>,
}

impl Args {
    pub fn mode(&self) -> Mode {
        if self.parallel {
            Mode::Parallel
        } else if self.stages {
            Mode::Stages
        } else {
            Mode::Serial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_packages_and_trailing_args() {
        let args =
            Args::try_parse_from(["wsrun", "build", "app", "ui", "--stages", "--", "--watch"])
                .unwrap();
        assert_eq!(args.command, "build");
        assert_eq!(args.packages, vec!["app", "ui"]);
        assert_eq!(args.extra, vec!["--watch"]);
        assert_eq!(args.mode(), Mode::Stages);
    }

    #[test]
    fn serial_is_the_default_mode() {
        let args = Args::try_parse_from(["wsrun", "test"]).unwrap();
        assert_eq!(args.mode(), Mode::Serial);
        assert!(args.packages.is_empty());
    }

    #[test]
    fn modes_are_mutually_exclusive() {
        assert!(Args::try_parse_from(["wsrun", "build", "--parallel", "--serial"]).is_err());
    }

    #[test]
    fn include_conflicts_with_exclude() {
        assert!(
            Args::try_parse_from(["wsrun", "build", "--include", "a*", "--exclude", "b"]).is_err()
        );
        let args =
            Args::try_parse_from(["wsrun", "build", "--exclude", "a*", "--exclude", "b"]).unwrap();
        assert_eq!(args.exclude, vec!["a*", "b"]);
    }
}
