//! Final per-package summary of a run.
use std::fmt::Write as _;

use super::types::{PackageOutcome, RunResult, SkipReason, TaskState};

/// Outcome bucket a package is reported under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    Failed,
    Succeeded,
    PendingOrCancelled,
    NotStarted,
    MissingScript,
    Skipped,
}

impl Bucket {
    pub const ALL: [Bucket; 6] = [
        Bucket::Failed,
        Bucket::Succeeded,
        Bucket::PendingOrCancelled,
        Bucket::NotStarted,
        Bucket::MissingScript,
        Bucket::Skipped,
    ];

    pub fn of(state: TaskState) -> Self {
        match state {
            TaskState::Failed => Self::Failed,
            TaskState::Succeeded => Self::Succeeded,
            TaskState::Pending | TaskState::Running | TaskState::Cancelled => {
                Self::PendingOrCancelled
            }
            TaskState::Unscheduled => Self::NotStarted,
            TaskState::Skipped(SkipReason::MissingScript) => Self::MissingScript,
            TaskState::Skipped(SkipReason::Excluded) => Self::Skipped,
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Failed => "Failed",
            Self::Succeeded => "Succeeded",
            Self::PendingOrCancelled => "Pending/Cancelled",
            Self::NotStarted => "Not started",
            Self::MissingScript => "Missing script",
            Self::Skipped => "Skipped",
        }
    }
}

/// A [`RunResult`] partitioned into buckets. Package names are sorted
/// within each bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report<'a> {
    pub failed: Vec<(&'a str, &'a PackageOutcome)>,
    pub succeeded: Vec<(&'a str, &'a PackageOutcome)>,
    pub pending_or_cancelled: Vec<(&'a str, &'a PackageOutcome)>,
    pub not_started: Vec<(&'a str, &'a PackageOutcome)>,
    pub missing_script: Vec<(&'a str, &'a PackageOutcome)>,
    pub skipped: Vec<(&'a str, &'a PackageOutcome)>,
    pub aborted: bool,
    pub duration_ms: u64,
}

impl<'a> Report<'a> {
    pub fn from_result(result: &'a RunResult) -> Self {
        let mut report = Report {
            aborted: result.aborted,
            duration_ms: result.duration_ms,
            ..Default::default()
        };
        for (name, outcome) in &result.outcomes {
            report
                .bucket_mut(Bucket::of(outcome.state))
                .push((name.as_str(), outcome));
        }
        report
    }

    pub fn bucket(&self, bucket: Bucket) -> &[(&'a str, &'a PackageOutcome)] {
        match bucket {
            Bucket::Failed => &self.failed,
            Bucket::Succeeded => &self.succeeded,
            Bucket::PendingOrCancelled => &self.pending_or_cancelled,
            Bucket::NotStarted => &self.not_started,
            Bucket::MissingScript => &self.missing_script,
            Bucket::Skipped => &self.skipped,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<(&'a str, &'a PackageOutcome)> {
        match bucket {
            Bucket::Failed => &mut self.failed,
            Bucket::Succeeded => &mut self.succeeded,
            Bucket::PendingOrCancelled => &mut self.pending_or_cancelled,
            Bucket::NotStarted => &mut self.not_started,
            Bucket::MissingScript => &mut self.missing_script,
            Bucket::Skipped => &mut self.skipped,
        }
    }

    /// Names in `bucket`, in report order.
    pub fn names(&self, bucket: Bucket) -> Vec<&'a str> {
        self.bucket(bucket).iter().map(|(n, _)| *n).collect()
    }

    /// Human-readable summary. Empty buckets are omitted.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Report:");
        for bucket in Bucket::ALL {
            let entries = self.bucket(bucket);
            if entries.is_empty() {
                continue;
            }
            let _ = writeln!(out, "  {} ({}):", bucket.title(), entries.len());
            for (name, outcome) in entries {
                let _ = writeln!(out, "    {}", describe(name, outcome));
            }
        }
        if self.aborted {
            let _ = writeln!(out, "  Run aborted.");
        }
        let _ = writeln!(out, "Total: {}", format_ms(self.duration_ms));
        out
    }
}

fn describe(name: &str, outcome: &PackageOutcome) -> String {
    let mut line = name.to_string();
    match outcome.state {
        TaskState::Succeeded | TaskState::Failed => {
            if let Some(ms) = outcome.duration_ms {
                let _ = write!(line, " ({})", format_ms(ms));
            }
            if outcome.state == TaskState::Failed {
                if let Some(err) = &outcome.error {
                    let _ = write!(line, ": {err}");
                }
            }
        }
        TaskState::Cancelled => line.push_str(" [cancelled]"),
        TaskState::Running => line.push_str(" [running]"),
        _ => {}
    }
    line
}

fn format_ms(ms: u64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else {
        format!("{:.1}s", ms as f64 / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn outcome(state: TaskState) -> PackageOutcome {
        PackageOutcome::new(state)
    }

    fn sample() -> RunResult {
        let mut result = RunResult {
            duration_ms: 2500,
            ..Default::default()
        };
        let mut ok = outcome(TaskState::Succeeded);
        ok.duration_ms = Some(120);
        ok.exit_code = Some(0);
        let mut bad = outcome(TaskState::Failed);
        bad.duration_ms = Some(40);
        bad.exit_code = Some(2);
        bad.error = Some("exited with code 2".into());

        result.outcomes.insert("app".into(), outcome(TaskState::Unscheduled));
        result.outcomes.insert("core".into(), ok);
        result.outcomes.insert("docs".into(), outcome(TaskState::Skipped(SkipReason::Excluded)));
        result.outcomes.insert("lint".into(), bad);
        result.outcomes.insert("ui".into(), outcome(TaskState::Cancelled));
        result.outcomes.insert("web".into(), outcome(TaskState::Pending));
        result
            .outcomes
            .insert("types".into(), outcome(TaskState::Skipped(SkipReason::MissingScript)));
        result
    }

    #[test]
    fn partitions_every_package_into_one_bucket() {
        let result = sample();
        let report = Report::from_result(&result);

        assert_eq!(report.names(Bucket::Failed), vec!["lint"]);
        assert_eq!(report.names(Bucket::Succeeded), vec!["core"]);
        assert_eq!(report.names(Bucket::PendingOrCancelled), vec!["ui", "web"]);
        assert_eq!(report.names(Bucket::NotStarted), vec!["app"]);
        assert_eq!(report.names(Bucket::MissingScript), vec!["types"]);
        assert_eq!(report.names(Bucket::Skipped), vec!["docs"]);

        let total: usize = Bucket::ALL.iter().map(|b| report.bucket(*b).len()).sum();
        assert_eq!(total, result.outcomes.len());
    }

    #[test]
    fn render_lists_durations_and_errors() {
        let result = sample();
        let text = Report::from_result(&result).render();

        assert!(text.contains("  Failed (1):\n    lint (40ms): exited with code 2\n"));
        assert!(text.contains("  Succeeded (1):\n    core (120ms)\n"));
        assert!(text.contains("    ui [cancelled]\n"));
        assert!(text.contains("  Not started (1):\n    app\n"));
        assert!(text.ends_with("Total: 2.5s\n"));
        assert!(!text.contains("Run aborted"));
    }

    #[test]
    fn render_omits_empty_buckets_and_flags_abort() {
        let mut result = RunResult {
            aborted: true,
            duration_ms: 7,
            ..Default::default()
        };
        result.outcomes.insert("a".into(), outcome(TaskState::Cancelled));

        let text = Report::from_result(&result).render();
        assert_eq!(
            text,
            "Report:\n  Pending/Cancelled (1):\n    a [cancelled]\n  Run aborted.\nTotal: 7ms\n"
        );
    }
}
