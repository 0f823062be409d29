//! Dependency-aware, gate-limited orchestration of package processes.
//!
//! Every scheduling future and every state transition is driven from the
//! single task that calls [`Scheduler::run`]. Child processes run in parallel
//! at the OS level and report back through channels only.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::future::{join_all, BoxFuture};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use regex::Regex;
use tokio::sync::mpsc;

use crate::error::{ExecutorError, ProcessError};
use crate::runner::{
    package_prefixer, ExitNotice, Latch, LineSink, ProcessHandle, ProcessRunner, ProcessSpec,
    RunnerOptions,
};
use crate::workspace::Package;

use super::filter::PackageFilter;
use super::gate::Gate;
use super::graph::PackageGraph;
use super::types::{
    Mode, PackageOutcome, RunEvent, RunOptions, RunResult, SkipReason, TaskState,
};

/// Why a package's scheduling ended without it being ready for dependents.
#[derive(Debug, Clone)]
enum TaskFailure {
    Unknown(ExecutorError),
    Dependency(String),
    Process(ProcessError),
    Aborted,
}

impl std::fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unknown(e) => write!(f, "{e}"),
            Self::Dependency(dep) => write!(f, "dependency '{dep}' did not complete"),
            Self::Process(e) => write!(f, "{e}"),
            Self::Aborted => f.write_str("run aborted"),
        }
    }
}

type Readiness = Result<(), TaskFailure>;
type ScheduleFuture = BoxFuture<'static, (String, Readiness)>;

struct TaskEntry {
    state: TaskState,
    /// Set once dependents may proceed: at launch in parallel mode, when
    /// `finished` settles otherwise, or on failure/skip.
    ready: Latch<Readiness>,
    handle: Option<ProcessHandle>,
    exit_code: Option<i32>,
    error: Option<String>,
}

impl TaskEntry {
    fn new(ready: Latch<Readiness>) -> Self {
        Self {
            state: TaskState::Unscheduled,
            ready,
            handle: None,
            exit_code: None,
            error: None,
        }
    }
}

/// Runs one command across the workspace.
pub struct Scheduler {
    graph: PackageGraph,
    opts: RunOptions,
    filter: PackageFilter,
    done_criteria: Option<Regex>,
    sink: Arc<dyn LineSink>,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
    interrupt: Option<BoxFuture<'static, ()>>,
}

impl Scheduler {
    pub fn new(
        graph: PackageGraph,
        opts: RunOptions,
        sink: Arc<dyn LineSink>,
    ) -> Result<Self, ExecutorError> {
        let filter = PackageFilter::new(&opts.include, &opts.exclude)?;
        let done_criteria = opts
            .done_criteria
            .as_deref()
            .map(|p| {
                Regex::new(p).map_err(|e| ExecutorError::InvalidPattern {
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()?;

        Ok(Self {
            graph,
            opts,
            filter,
            done_criteria,
            sink,
            events: None,
            interrupt: None,
        })
    }

    /// Publish state transitions on `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<RunEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Abort the run when `interrupt` resolves, exactly as fast-exit does.
    pub fn with_interrupt<F>(mut self, interrupt: F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.interrupt = Some(interrupt.boxed());
        self
    }

    /// Gate matching `mode`: unbounded, one slot, or the stages width.
    pub fn gate_for(mode: Mode, stages_width: usize) -> Gate {
        match mode {
            Mode::Parallel => Gate::unbounded(),
            Mode::Serial => Gate::bounded(1),
            Mode::Stages => Gate::bounded(stages_width),
        }
    }

    /// Run the command until every requested package has settled and every
    /// spawned process has closed.
    #[tracing::instrument(name = "scheduler.run", skip_all)]
    pub async fn run(self) -> Result<RunResult, ExecutorError> {
        let started = Instant::now();

        self.graph.validate()?;

        let targets: Vec<String> = if self.opts.targets.is_empty() {
            self.graph.names().map(str::to_string).collect()
        } else {
            self.opts.targets.clone()
        };
        if let Some(missing) = targets.iter().find(|t| !self.graph.contains(t)) {
            return Err(ExecutorError::UnknownPackage {
                name: missing.clone(),
                referenced_by: None,
            });
        }

        let (exit_tx, mut exit_rx) = mpsc::unbounded_channel::<ExitNotice>();
        let (spawn_tx, mut spawn_rx) = mpsc::unbounded_channel::<ScheduleFuture>();

        let runner_opts = RunnerOptions {
            collect_logs: self.opts.collect_logs,
            line_prefixer: self.opts.prefix.then(package_prefixer),
            done_criteria: self.done_criteria.clone(),
            reject_on_non_zero_exit: self.opts.fast_exit,
        };
        let runner = ProcessRunner::new(runner_opts, self.sink.clone()).with_exit_notices(exit_tx);

        let inner = Arc::new(Inner {
            gate: Self::gate_for(self.opts.mode, self.opts.stages_width),
            command_line: self.opts.command_line(),
            target_set: targets.iter().cloned().collect(),
            graph: self.graph,
            opts: self.opts,
            filter: self.filter,
            runner,
            tasks: Mutex::new(HashMap::new()),
            aborted: AtomicBool::new(false),
            events: self.events,
            spawn_tx,
        });
        let mut interrupt = self
            .interrupt
            .unwrap_or_else(|| std::future::pending::<()>().boxed())
            .fuse();

        tracing::info!(
            packages = targets.len(),
            mode = %inner.opts.mode,
            command = %inner.command_line,
            "starting run"
        );

        for target in &targets {
            inner.lookup_or_schedule(target, None);
        }

        let mut pending: FuturesUnordered<ScheduleFuture> = FuturesUnordered::new();
        let mut fatal: Option<ExecutorError> = None;

        loop {
            while let Ok(fut) = spawn_rx.try_recv() {
                pending.push(fut);
            }
            if pending.is_empty() {
                break;
            }

            tokio::select! {
                Some((name, res)) = pending.next() => {
                    match res {
                        Ok(()) => {}
                        Err(TaskFailure::Unknown(e)) => {
                            tracing::error!(package = %name, error = %e, "unknown package");
                            fatal.get_or_insert(e);
                        }
                        Err(failure) => {
                            tracing::debug!(package = %name, reason = %failure, "package did not complete");
                            inner.note_failure(&name, &failure);
                        }
                    }
                }
                Some(fut) = spawn_rx.recv() => pending.push(fut),
                Some(notice) = exit_rx.recv() => inner.on_exit(notice),
                _ = &mut interrupt => inner.abort("interrupted"),
            }
        }

        // Processes released early by done criteria may still be running.
        let handles = inner.handles();
        let all_closed = join_all(handles.iter().map(|h| h.closed()));
        tokio::pin!(all_closed);
        loop {
            tokio::select! {
                _ = &mut all_closed => break,
                Some(notice) = exit_rx.recv() => inner.on_exit(notice),
                _ = &mut interrupt => inner.abort("interrupted"),
            }
        }
        while let Ok(notice) = exit_rx.try_recv() {
            inner.on_exit(notice);
        }

        if let Some(e) = fatal {
            return Err(e);
        }

        let result = inner.result(started.elapsed().as_millis() as u64);
        tracing::info!(
            failed = result.failed().count(),
            aborted = result.aborted,
            duration_ms = result.duration_ms,
            "run finished"
        );
        Ok(result)
    }
}

struct Inner {
    graph: PackageGraph,
    opts: RunOptions,
    filter: PackageFilter,
    gate: Gate,
    runner: ProcessRunner,
    command_line: String,
    target_set: HashSet<String>,
    /// name -> task. Check-and-insert happens under this lock, so each
    /// package gets at most one scheduling future per run.
    tasks: Mutex<HashMap<String, TaskEntry>>,
    aborted: AtomicBool,
    events: Option<mpsc::UnboundedSender<RunEvent>>,
    spawn_tx: mpsc::UnboundedSender<ScheduleFuture>,
}

impl Inner {
    fn lock_tasks(&self) -> MutexGuard<'_, HashMap<String, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Return the readiness latch of `name`, creating and enqueueing its
    /// scheduling future on first reference.
    fn lookup_or_schedule(self: &Arc<Self>, name: &str, parent: Option<&str>) -> Latch<Readiness> {
        let Some(package) = self.graph.get(name).cloned() else {
            let latch = Latch::new();
            latch.set(Err(TaskFailure::Unknown(ExecutorError::UnknownPackage {
                name: name.to_string(),
                referenced_by: parent.map(str::to_string),
            })));
            return latch;
        };

        let ready = {
            let mut tasks = self.lock_tasks();
            if let Some(entry) = tasks.get(name) {
                return entry.ready.clone();
            }
            let ready = Latch::new();
            tasks.insert(name.to_string(), TaskEntry::new(ready.clone()));
            ready
        };

        self.emit(RunEvent::Scheduled {
            package: name.to_string(),
        });

        let inner = self.clone();
        let latch = ready.clone();
        let fut = async move {
            let res = inner.schedule(&package, &latch).await;
            latch.set(res.clone());
            (package.name, res)
        }
        .boxed();

        // The receiver lives as long as the run loop.
        let _ = self.spawn_tx.send(fut);
        ready
    }

    fn dependencies_to_schedule(&self, name: &str) -> Vec<String> {
        self.graph
            .internal_dependencies(name)
            .into_iter()
            .filter(|d| self.opts.recursive || self.target_set.contains(d))
            .collect()
    }

    async fn schedule(self: &Arc<Self>, package: &Package, ready: &Latch<Readiness>) -> Readiness {
        let name = package.name.as_str();
        let deps = self.dependencies_to_schedule(name);
        let waits: Vec<_> = deps
            .iter()
            .map(|d| self.lookup_or_schedule(d, Some(name)).wait())
            .collect();
        for (dep, res) in deps.iter().zip(join_all(waits).await) {
            if let Err(failure) = res {
                tracing::debug!(package = %name, dependency = %dep, reason = %failure, "dependency not ready");
                return Err(match failure {
                    TaskFailure::Aborted => TaskFailure::Aborted,
                    _ => TaskFailure::Dependency(dep.clone()),
                });
            }
        }
        if self.is_aborted() {
            return Err(TaskFailure::Aborted);
        }

        if !self.filter.admits(name) {
            self.skip(name, SkipReason::Excluded);
            return Ok(());
        }
        if self.opts.exclude_missing && !package.has_script(&self.opts.command) {
            self.skip(name, SkipReason::MissingScript);
            return Ok(());
        }

        self.set_state(name, TaskState::Pending);
        let permit = self.gate.acquire().await;
        if self.is_aborted() {
            return Err(TaskFailure::Aborted);
        }

        let handle = self.runner.start(ProcessSpec {
            package: name.to_string(),
            command_line: self.command_line.clone(),
            cwd: package.path.clone(),
        });
        self.mark_running(name, &handle);

        if !self.opts.mode.awaits_dependencies() {
            ready.set(Ok(()));
        }

        let finished = handle.finished().await;
        if let Err(e) = &finished {
            if self.opts.fast_exit && !matches!(e, ProcessError::Cancelled { .. }) {
                self.abort(&format!("{name} failed: {e}"));
            }
        }
        self.emit(RunEvent::Finished {
            package: name.to_string(),
            ok: finished.is_ok(),
        });
        drop(permit);

        finished.map_err(TaskFailure::Process)
    }

    fn set_state(&self, name: &str, state: TaskState) {
        if let Some(entry) = self.lock_tasks().get_mut(name) {
            entry.state = state;
        }
    }

    fn skip(&self, name: &str, reason: SkipReason) {
        tracing::info!(package = %name, reason = ?reason, "skipping package");
        self.set_state(name, TaskState::Skipped(reason));
        self.emit(RunEvent::Skipped {
            package: name.to_string(),
            reason,
        });
    }

    fn mark_running(&self, name: &str, handle: &ProcessHandle) {
        if let Some(entry) = self.lock_tasks().get_mut(name) {
            entry.state = TaskState::Running;
            entry.handle = Some(handle.clone());
        }
        tracing::info!(package = %name, command = %handle.command(), "package started");
        self.emit(RunEvent::Started {
            package: name.to_string(),
            command: handle.command().to_string(),
        });
    }

    /// Keep the reason a package never became ready, unless its process
    /// already recorded one.
    fn note_failure(&self, name: &str, failure: &TaskFailure) {
        if let Some(entry) = self.lock_tasks().get_mut(name) {
            if entry.error.is_none() {
                entry.error = Some(failure.to_string());
            }
        }
    }

    fn handles(&self) -> Vec<ProcessHandle> {
        self.lock_tasks()
            .values()
            .filter_map(|e| e.handle.clone())
            .collect()
    }

    /// Classify a terminated process. Cancelled packages keep their state.
    fn on_exit(&self, notice: ExitNotice) {
        let code = notice.code.as_ref().ok().copied();
        let failed = {
            let mut tasks = self.lock_tasks();
            let Some(entry) = tasks.get_mut(&notice.package) else {
                return;
            };
            entry.exit_code = code;

            let cancelled = entry
                .handle
                .as_ref()
                .map(ProcessHandle::was_cancelled)
                .unwrap_or(false);
            if entry.state == TaskState::Running {
                entry.state = match &notice.code {
                    _ if cancelled => TaskState::Cancelled,
                    Ok(0) => TaskState::Succeeded,
                    Ok(_) => TaskState::Failed,
                    Err(_) => TaskState::Failed,
                };
            }
            if let Err(e) = &notice.code {
                entry.error = Some(e.to_string());
            } else if entry.state == TaskState::Failed {
                entry.error = Some(format!("exited with code {}", code.unwrap_or(-1)));
            }
            entry.state == TaskState::Failed
        };

        if failed {
            tracing::warn!(package = %notice.package, exit_code = ?code, "package failed");
        } else {
            tracing::debug!(package = %notice.package, exit_code = ?code, "package exited");
        }
        self.emit(RunEvent::Exited {
            package: notice.package.clone(),
            code,
        });

        if failed && self.opts.fast_exit {
            self.abort(&format!("{} failed", notice.package));
        }
    }

    /// Stop admitting packages and kill every process still running.
    fn abort(&self, reason: &str) {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::warn!(reason = %reason, "aborting run");
        self.emit(RunEvent::Aborted {
            reason: reason.to_string(),
        });

        let mut cancelled = Vec::new();
        {
            let mut tasks = self.lock_tasks();
            for (name, entry) in tasks.iter_mut() {
                let Some(handle) = &entry.handle else {
                    continue;
                };
                // Already exited: the pending exit notice classifies it.
                if entry.state == TaskState::Running && handle.cancel() {
                    entry.state = TaskState::Cancelled;
                    cancelled.push(name.clone());
                }
                // Exited packages may still have descendants holding the
                // pipes; closing must not wait for them.
                handle.force_close();
            }
        }
        for package in cancelled {
            self.emit(RunEvent::Cancelled { package });
        }
    }

    fn result(&self, duration_ms: u64) -> RunResult {
        let tasks = self.lock_tasks();
        let outcomes = tasks
            .iter()
            .map(|(name, entry)| {
                let outcome = PackageOutcome {
                    state: entry.state,
                    exit_code: entry.exit_code,
                    duration_ms: entry
                        .handle
                        .as_ref()
                        .and_then(ProcessHandle::elapsed)
                        .map(|d| d.as_millis() as u64),
                    error: entry.error.clone(),
                };
                (name.clone(), outcome)
            })
            .collect();

        RunResult {
            outcomes,
            aborted: self.is_aborted(),
            duration_ms,
        }
    }
}
