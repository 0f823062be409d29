//! One child process per package, exposing independent completion signals.
//!
//! `exit_code` resolves when the OS reports termination, `closed` once both
//! output streams are drained, and `finished` on the first of a done-criteria
//! match or exit. None of them is ever retried.
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Notify};

use crate::error::ProcessError;

use super::io_pump::{self, LineStream, LineTap};
use super::latch::Latch;
use super::output::{LineSink, PackageOutput};
use super::types::{ExitNotice, ProcessSpec, RunnerOptions};

const LINE_CHANNEL_CAPACITY: usize = 1024;

/// How long a stopped process group gets between SIGTERM and SIGKILL.
const KILL_GRACE: Duration = Duration::from_secs(2);

/// Starts package processes with a fixed set of options.
#[derive(Clone)]
pub struct ProcessRunner {
    opts: RunnerOptions,
    sink: Arc<dyn LineSink>,
    exit_tx: Option<mpsc::UnboundedSender<ExitNotice>>,
}

impl ProcessRunner {
    pub fn new(opts: RunnerOptions, sink: Arc<dyn LineSink>) -> Self {
        Self {
            opts,
            sink,
            exit_tx: None,
        }
    }

    /// Report every process termination on `tx`.
    pub fn with_exit_notices(mut self, tx: mpsc::UnboundedSender<ExitNotice>) -> Self {
        self.exit_tx = Some(tx);
        self
    }

    pub fn options(&self) -> &RunnerOptions {
        &self.opts
    }

    /// Spawn `spec` and return its handle. A spawn failure is not an `Err`
    /// here: it rejects every signal of the returned handle instead.
    pub fn start(&self, spec: ProcessSpec) -> ProcessHandle {
        let handle = ProcessHandle::new(&spec);

        let child = shell_command(&spec.command_line, &spec.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        match child {
            Ok(child) => {
                tracing::debug!(
                    package = %spec.package,
                    pid = ?child.id(),
                    command = %spec.command_line,
                    "process started"
                );
                let driver = Driver {
                    handle: handle.clone(),
                    output: PackageOutput::new(
                        &spec.package,
                        self.sink.clone(),
                        self.opts.line_prefixer.clone(),
                        self.opts.collect_logs,
                    ),
                    opts: self.opts.clone(),
                    exit_tx: self.exit_tx.clone(),
                };
                tokio::spawn(driver.run(child));
            }
            Err(e) => {
                tracing::error!(
                    package = %spec.package,
                    command = %spec.command_line,
                    error = %e,
                    "failed to spawn process"
                );
                let err = ProcessError::Spawn {
                    command: spec.command_line.clone(),
                    message: e.to_string(),
                };
                handle.inner.exit_code.set(Err(err.clone()));
                handle.inner.finished.set(Err(err.clone()));
                handle.inner.closed.set(Err(err.clone()));
                if let Some(tx) = &self.exit_tx {
                    let _ = tx.send(ExitNotice {
                        package: spec.package.clone(),
                        code: Err(err),
                    });
                }
            }
        }

        handle
    }
}

fn shell_command(command_line: &str, cwd: &Path) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command_line);
        c
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command_line);
        c
    };
    // Own process group, so a stop reaches everything the script started.
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.current_dir(cwd);
    cmd
}

/// Send `signal` to the process group led by `pid`. A group that is already
/// gone is not an error.
#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) -> std::io::Result<()> {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return Ok(());
    };
    // SAFETY: killpg takes plain integers and touches no memory.
    if unsafe { libc::killpg(pgid, signal) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        Ok(())
    } else {
        Err(err)
    }
}

struct HandleInner {
    package: String,
    command: String,
    cwd: PathBuf,
    started_at: Instant,
    exit_code: Latch<Result<i32, ProcessError>>,
    closed: Latch<Result<i32, ProcessError>>,
    finished: Latch<Result<(), ProcessError>>,
    elapsed: Latch<Duration>,
    cancelled: AtomicBool,
    /// Woken by `cancel` and `force_close`.
    stop: Notify,
}

/// Shared view of one running (or finished) package process.
#[derive(Clone)]
pub struct ProcessHandle {
    inner: Arc<HandleInner>,
}

impl std::fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("package", &self.inner.package)
            .field("command", &self.inner.command)
            .field("exit_code", &self.inner.exit_code.get())
            .field("cancelled", &self.was_cancelled())
            .finish()
    }
}

impl ProcessHandle {
    fn new(spec: &ProcessSpec) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                package: spec.package.clone(),
                command: spec.command_line.clone(),
                cwd: spec.cwd.clone(),
                started_at: Instant::now(),
                exit_code: Latch::new(),
                closed: Latch::new(),
                finished: Latch::new(),
                elapsed: Latch::new(),
                cancelled: AtomicBool::new(false),
                stop: Notify::new(),
            }),
        }
    }

    pub fn package(&self) -> &str {
        &self.inner.package
    }

    pub fn command(&self) -> &str {
        &self.inner.command
    }

    pub fn cwd(&self) -> &Path {
        &self.inner.cwd
    }

    pub fn exit_code(&self) -> impl Future<Output = Result<i32, ProcessError>> + Send + 'static {
        self.inner.exit_code.wait()
    }

    pub fn closed(&self) -> impl Future<Output = Result<i32, ProcessError>> + Send + 'static {
        self.inner.closed.wait()
    }

    pub fn finished(&self) -> impl Future<Output = Result<(), ProcessError>> + Send + 'static {
        self.inner.finished.wait()
    }

    /// Resolves `Ok` only for exit code 0, whatever `reject_on_non_zero_exit` says.
    pub fn exit_error(&self) -> impl Future<Output = Result<(), ProcessError>> + Send + 'static {
        let exit = self.inner.exit_code.wait();
        let inner = self.inner.clone();
        async move {
            let code = exit.await?;
            classify_exit(&inner, code)
        }
    }

    pub fn try_exit_code(&self) -> Option<Result<i32, ProcessError>> {
        self.inner.exit_code.get()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.finished.is_set()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_set()
    }

    /// Time from spawn to exit, once exited.
    pub fn elapsed(&self) -> Option<Duration> {
        self.inner.elapsed.get()
    }

    /// Kill the process and mark it cancelled. Returns false if it had
    /// already exited.
    pub fn cancel(&self) -> bool {
        if self.inner.exit_code.is_set() {
            return false;
        }
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.stop.notify_one();
        true
    }

    /// Terminate whatever is left of the process group and resolve `closed`
    /// without waiting for output EOF. Unlike [`cancel`](Self::cancel) this
    /// does not mark the process cancelled, so an exited process keeps its
    /// classification.
    pub fn force_close(&self) {
        if !self.inner.closed.is_set() {
            self.inner.stop.notify_one();
        }
    }

    pub fn was_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }
}

fn classify_exit(inner: &HandleInner, code: i32) -> Result<(), ProcessError> {
    if inner.cancelled.load(Ordering::SeqCst) {
        return Err(ProcessError::Cancelled {
            command: inner.command.clone(),
        });
    }
    if code == 0 {
        Ok(())
    } else {
        Err(ProcessError::Exit {
            command: inner.command.clone(),
            code,
        })
    }
}

struct Driver {
    handle: ProcessHandle,
    output: PackageOutput,
    opts: RunnerOptions,
    exit_tx: Option<mpsc::UnboundedSender<ExitNotice>>,
}

impl Driver {
    async fn run(mut self, mut child: Child) {
        let (line_tx, mut line_rx) = mpsc::channel::<LineTap>(LINE_CHANNEL_CAPACITY);
        let mut pumps = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            pumps.push(io_pump::pump_lines(stdout, LineStream::Stdout, line_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(io_pump::pump_lines(stderr, LineStream::Stderr, line_tx));
        } else {
            drop(line_tx);
        }

        let inner = self.handle.inner.clone();
        let pid = child.id();
        let mut exit: Option<i32> = None;
        let mut lines_open = true;
        let mut stopping = false;

        let escalate = tokio::time::sleep(KILL_GRACE);
        tokio::pin!(escalate);
        let mut escalate_armed = false;

        loop {
            tokio::select! {
                status = child.wait(), if exit.is_none() => {
                    let code = match status {
                        Ok(s) => s.code().unwrap_or(-1),
                        Err(e) => {
                            tracing::warn!(package = %inner.package, error = %e, "wait failed");
                            -1
                        }
                    };
                    exit = Some(code);
                    self.on_exit(code);
                }

                tap = line_rx.recv(), if lines_open => {
                    match tap {
                        Some(tap) => self.on_line(tap),
                        None => lines_open = false,
                    }
                }

                _ = inner.stop.notified(), if !stopping => {
                    stopping = true;
                    tracing::info!(package = %inner.package, exited = exit.is_some(), "terminating process group");
                    self.terminate(&mut child, pid, exit.is_some());
                    escalate.as_mut().reset(tokio::time::Instant::now() + KILL_GRACE);
                    escalate_armed = exit.is_none();
                }

                _ = &mut escalate, if escalate_armed => {
                    escalate_armed = false;
                    tracing::warn!(package = %inner.package, "process ignored SIGTERM, killing");
                    self.kill(&mut child, pid);
                }
            }

            if exit.is_some() && (!lines_open || stopping) {
                break;
            }
        }

        if stopping {
            while let Ok(tap) = line_rx.try_recv() {
                self.on_line(tap);
            }
        }
        // Descendants outside the group can still hold the pipes open.
        for pump in pumps {
            if stopping {
                pump.abort();
            } else if let Ok(Err(e)) = pump.await {
                tracing::warn!(package = %inner.package, error = %e, "output stream error");
            }
        }

        self.output.flush();
        let code = exit.unwrap_or(-1);
        inner.closed.set(Ok(code));
        tracing::debug!(package = %inner.package, exit_code = code, "process closed");
    }

    /// SIGTERM the whole group. Without process groups only the direct
    /// child can be reached, and only while it is alive.
    fn terminate(&self, child: &mut Child, pid: Option<u32>, exited: bool) {
        let package = &self.handle.inner.package;
        #[cfg(unix)]
        {
            if let Some(pid) = pid {
                match signal_group(pid, libc::SIGTERM) {
                    Ok(()) => return,
                    Err(e) => tracing::warn!(package = %package, error = %e, "SIGTERM failed"),
                }
            }
        }
        #[cfg(not(unix))]
        let _ = pid;
        if !exited {
            if let Err(e) = child.start_kill() {
                tracing::warn!(package = %package, error = %e, "kill failed");
            }
        }
    }

    fn kill(&self, child: &mut Child, pid: Option<u32>) {
        let package = &self.handle.inner.package;
        #[cfg(unix)]
        {
            if let Some(pid) = pid {
                if let Err(e) = signal_group(pid, libc::SIGKILL) {
                    tracing::warn!(package = %package, error = %e, "SIGKILL failed");
                }
            }
        }
        #[cfg(not(unix))]
        let _ = pid;
        if let Err(e) = child.start_kill() {
            tracing::warn!(package = %package, error = %e, "kill failed");
        }
    }

    fn on_line(&mut self, tap: LineTap) {
        let inner = &self.handle.inner;
        if let Some(re) = &self.opts.done_criteria {
            if !inner.finished.is_set() && re.is_match(&tap.line) {
                tracing::debug!(package = %inner.package, stream = tap.stream.label(), "done criteria matched");
                inner.finished.set(Ok(()));
            }
        }
        self.output.push(tap);
    }

    fn on_exit(&mut self, code: i32) {
        let inner = &self.handle.inner;
        inner.elapsed.set(inner.started_at.elapsed());
        inner.exit_code.set(Ok(code));

        let finished = match classify_exit(inner, code) {
            Err(e @ ProcessError::Cancelled { .. }) => Err(e),
            Err(e) if self.opts.reject_on_non_zero_exit => Err(e),
            _ => Ok(()),
        };
        inner.finished.set(finished);

        tracing::debug!(package = %inner.package, exit_code = code, "process exited");
        if let Some(tx) = &self.exit_tx {
            let _ = tx.send(ExitNotice {
                package: inner.package.clone(),
                code: Ok(code),
            });
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::runner::output::{package_prefixer, MemorySink};
    use regex::Regex;
    use std::time::Duration;

    fn spec(cmd: &str) -> ProcessSpec {
        ProcessSpec {
            package: "pkg".into(),
            command_line: cmd.into(),
            cwd: std::env::temp_dir(),
        }
    }

    #[tokio::test]
    async fn exit_code_and_closed_agree() {
        let sink = MemorySink::new();
        let runner = ProcessRunner::new(RunnerOptions::default(), sink.clone());
        let handle = runner.start(spec("echo out; echo err 1>&2; exit 3"));

        assert_eq!(handle.exit_code().await, Ok(3));
        assert_eq!(handle.closed().await, Ok(3));
        // Not rejecting on non-zero exit: finished still resolves.
        assert_eq!(handle.finished().await, Ok(()));
        assert!(matches!(
            handle.exit_error().await,
            Err(ProcessError::Exit { code: 3, .. })
        ));

        let mut lines = sink.lines();
        lines.sort_by(|a, b| a.1.cmp(&b.1));
        assert_eq!(
            lines,
            vec![
                (LineStream::Stderr, "err".to_string()),
                (LineStream::Stdout, "out".to_string())
            ]
        );
        assert!(handle.elapsed().is_some());
    }

    #[tokio::test]
    async fn finished_rejects_when_asked_to() {
        let opts = RunnerOptions {
            reject_on_non_zero_exit: true,
            ..Default::default()
        };
        let runner = ProcessRunner::new(opts, MemorySink::new());
        let handle = runner.start(spec("exit 1"));

        assert!(matches!(
            handle.finished().await,
            Err(ProcessError::Exit { code: 1, .. })
        ));
    }

    #[tokio::test]
    async fn done_criteria_finishes_a_running_process() {
        let opts = RunnerOptions {
            done_criteria: Some(Regex::new("listening on \\d+").unwrap()),
            ..Default::default()
        };
        let runner = ProcessRunner::new(opts, MemorySink::new());
        let handle = runner.start(spec("echo booting; echo listening on 8080; sleep 30"));

        tokio::time::timeout(Duration::from_secs(10), handle.finished())
            .await
            .expect("finished should resolve before exit")
            .unwrap();
        assert!(handle.try_exit_code().is_none());

        assert!(handle.cancel());
        let code = tokio::time::timeout(Duration::from_secs(10), handle.exit_code())
            .await
            .unwrap();
        assert!(code.is_ok());
        assert!(matches!(
            handle.exit_error().await,
            Err(ProcessError::Cancelled { .. })
        ));
        tokio::time::timeout(Duration::from_secs(10), handle.closed())
            .await
            .unwrap()
            .unwrap();
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn spawn_failure_rejects_every_signal() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runner =
            ProcessRunner::new(RunnerOptions::default(), MemorySink::new()).with_exit_notices(tx);
        let handle = runner.start(ProcessSpec {
            package: "ghost".into(),
            command_line: "true".into(),
            cwd: PathBuf::from("/definitely/not/a/dir"),
        });

        assert!(matches!(handle.exit_code().await, Err(e) if e.is_spawn()));
        assert!(matches!(handle.exit_error().await, Err(e) if e.is_spawn()));
        assert!(matches!(handle.closed().await, Err(e) if e.is_spawn()));

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.package, "ghost");
        assert!(notice.code.is_err());
    }

    #[tokio::test]
    async fn collected_logs_are_flushed_on_close() {
        let sink = MemorySink::new();
        let opts = RunnerOptions {
            collect_logs: true,
            line_prefixer: Some(package_prefixer()),
            ..Default::default()
        };
        let runner = ProcessRunner::new(opts, sink.clone());
        let handle = runner.start(spec("echo a; echo b"));

        handle.closed().await.unwrap();
        assert_eq!(sink.text(), vec!["pkg\n | a", " | b"]);
    }

    #[tokio::test]
    async fn force_close_does_not_wait_for_background_children() {
        let sink = MemorySink::new();
        let runner = ProcessRunner::new(RunnerOptions::default(), sink.clone());
        let handle = runner.start(spec("sleep 20 & echo up"));

        assert_eq!(handle.exit_code().await, Ok(0));
        // The backgrounded sleep keeps stdout open.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!handle.is_closed());

        handle.force_close();
        let closed = tokio::time::timeout(Duration::from_secs(5), handle.closed())
            .await
            .expect("closed resolves after force_close");
        assert_eq!(closed, Ok(0));
        assert!(!handle.was_cancelled());
        assert_eq!(handle.finished().await, Ok(()));
        assert_eq!(sink.text(), vec!["up"]);
    }

    #[tokio::test]
    async fn cancel_terminates_the_whole_process_group() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ProcessRunner::new(RunnerOptions::default(), MemorySink::new());
        let handle = runner.start(ProcessSpec {
            package: "pkg".into(),
            command_line: "(sleep 1; touch survived) & echo up; wait".into(),
            cwd: dir.path().to_path_buf(),
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(handle.cancel());
        tokio::time::timeout(Duration::from_secs(5), handle.closed())
            .await
            .expect("cancelled process closes")
            .unwrap();

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!dir.path().join("survived").exists());
    }
}
