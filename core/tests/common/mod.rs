#![allow(dead_code)]

use std::fs;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::sync::mpsc;
use wsrun_core::api::{
    ExecutorError, MemorySink, Mode, Package, PackageGraph, RunEvent, RunOptions, RunResult,
    Scheduler,
};

/// Packages living in a temp directory, each with an optional `build` shell
/// script run as `sh build` from the package directory.
pub struct Workspace {
    pub dir: TempDir,
    packages: Vec<Package>,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
            packages: Vec::new(),
        }
    }

    pub fn package(&mut self, name: &str, script: Option<&str>, deps: &[&str]) -> &mut Self {
        let path = self.dir.path().join(name);
        fs::create_dir_all(&path).expect("create package dir");

        let mut package = Package::new(name, &path);
        if let Some(body) = script {
            fs::write(path.join("build"), body).expect("write script");
            package = package.with_script("build");
        }
        for dep in deps {
            package = package.with_dependency(*dep, "*");
        }
        self.packages.push(package);
        self
    }

    pub fn graph(&self) -> PackageGraph {
        PackageGraph::from_packages(self.packages.clone()).expect("graph")
    }
}

/// `sh build` in every package, unprefixed.
pub fn options(mode: Mode) -> RunOptions {
    let mut opts = RunOptions::new("build");
    opts.bin = "sh".into();
    opts.no_run = true;
    opts.prefix = false;
    opts.mode = mode;
    opts
}

pub struct Outcome {
    pub result: Result<RunResult, ExecutorError>,
    pub events: Vec<RunEvent>,
    pub sink: Arc<MemorySink>,
}

impl Outcome {
    pub fn result(&self) -> &RunResult {
        self.result.as_ref().expect("run should succeed")
    }

    /// Position of the first event matching `pred`.
    pub fn position(&self, pred: impl Fn(&RunEvent) -> bool) -> usize {
        self.events
            .iter()
            .position(pred)
            .unwrap_or_else(|| panic!("no matching event in {:#?}", self.events))
    }

    pub fn started(&self, package: &str) -> usize {
        self.position(|e| matches!(e, RunEvent::Started { package: p, .. } if p == package))
    }

    pub fn finished(&self, package: &str) -> usize {
        self.position(|e| matches!(e, RunEvent::Finished { package: p, .. } if p == package))
    }

    pub fn exited(&self, package: &str) -> usize {
        self.position(|e| matches!(e, RunEvent::Exited { package: p, .. } if p == package))
    }

    pub fn start_count(&self, package: &str) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, RunEvent::Started { package: p, .. } if p == package))
            .count()
    }

    /// Highest number of packages holding a gate slot at once.
    pub fn max_concurrent(&self) -> usize {
        let mut current = 0usize;
        let mut max = 0usize;
        for event in &self.events {
            match event {
                RunEvent::Started { .. } => {
                    current += 1;
                    max = max.max(current);
                }
                RunEvent::Finished { .. } => current = current.saturating_sub(1),
                _ => {}
            }
        }
        max
    }
}

pub async fn run(graph: PackageGraph, opts: RunOptions) -> Outcome {
    run_with(graph, opts, None::<std::future::Pending<()>>).await
}

pub async fn run_with<F>(graph: PackageGraph, opts: RunOptions, interrupt: Option<F>) -> Outcome
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let sink = MemorySink::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut scheduler = Scheduler::new(graph, opts, sink.clone())
        .expect("scheduler")
        .with_events(tx);
    if let Some(interrupt) = interrupt {
        scheduler = scheduler.with_interrupt(interrupt);
    }
    let result = scheduler.run().await;

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    Outcome {
        result,
        events,
        sink,
    }
}
