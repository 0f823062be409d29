use super::task::Mode;

/// Options for one orchestrated run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Script name to run in every package, e.g. "build".
    pub command: String,

    /// Requested packages. Empty means every workspace package.
    pub targets: Vec<String>,

    pub mode: Mode,

    /// Also schedule dependencies outside `targets`.
    pub recursive: bool,

    /// Only run packages whose name matches one of these globs.
    pub include: Vec<String>,

    /// Skip packages whose name matches one of these globs. Ignored when
    /// `include` is non-empty.
    pub exclude: Vec<String>,

    /// Skip packages that do not define `command`.
    pub exclude_missing: bool,

    /// Kill everything as soon as one package exits non-zero.
    pub fast_exit: bool,

    /// Buffer each package's output until its process closes.
    pub collect_logs: bool,

    /// Name each contiguous run of output lines with its package.
    pub prefix: bool,

    /// Regex that marks a still-running package as finished.
    pub done_criteria: Option<String>,

    /// Program used to build the command line.
    pub bin: String,

    /// Build `<bin> <command>` instead of `<bin> run <command>`.
    pub no_run: bool,

    /// Extra arguments appended to every command line.
    pub args: Vec<String>,

    /// Gate width for `stages` mode.
    pub stages_width: usize,
}

impl RunOptions {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            targets: Vec::new(),
            mode: Mode::default(),
            recursive: false,
            include: Vec::new(),
            exclude: Vec::new(),
            exclude_missing: false,
            fast_exit: false,
            collect_logs: false,
            prefix: true,
            done_criteria: None,
            bin: "npm".to_string(),
            no_run: false,
            args: Vec::new(),
            stages_width: 16,
        }
    }

    /// `<bin> run <command> [args...]`, or `<bin> <command> [args...]` with `no_run`.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.bin.clone()];
        if !self.no_run {
            parts.push("run".to_string());
        }
        parts.push(self.command.clone());
        parts.extend(self.args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@+%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_run_command_line() {
        let opts = RunOptions::new("build");
        assert_eq!(opts.command_line(), "npm run build");
    }

    #[test]
    fn no_run_and_quoted_args() {
        let mut opts = RunOptions::new("test");
        opts.bin = "yarn".into();
        opts.no_run = true;
        opts.args = vec!["--watch=false".into(), "it's here".into()];
        assert_eq!(opts.command_line(), r"yarn test --watch=false 'it'\''s here'");
    }
}
