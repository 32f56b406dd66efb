//! Process runner
//!
//! Spawns one external command at a time, streams its output to an
//! [`OutputHandler`] and settles with the final result. The running process
//! can be killed (together with its descendants) through a [`KillHandle`].

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use spore_core::domain::command::CommandSpec;
use tokio::process::{Child, Command};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::RunnerError;
use crate::kill::kill_group;
use crate::output::{OutputHandler, StreamKind, pump};

/// Accumulated output of a successful run
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Single-slot process launcher
///
/// Cloning shares the slot.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    busy: Arc<AtomicBool>,
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kills any process that runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Spawns `spec` and starts supervising it
    ///
    /// Returns immediately once the child exists. Fails with
    /// [`RunnerError::JobAlreadyRunning`] while a previous process still
    /// occupies the slot, and with [`RunnerError::Spawn`] when the program
    /// cannot be started; in both cases nothing keeps running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<H: OutputHandler>(
        &self,
        spec: &CommandSpec,
        handler: H,
    ) -> Result<RunningProcess, RunnerError> {
        let slot = Slot::claim(&self.busy).ok_or(RunnerError::JobAlreadyRunning)?;

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        let pid = child.id();
        info!("Spawned '{}' (pid {:?})", spec.display(), pid);

        let handler: Arc<dyn OutputHandler> = Arc::new(handler);
        let readers = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (
                tokio::spawn(pump(stdout, StreamKind::Stdout, handler.clone())),
                tokio::spawn(pump(stderr, StreamKind::Stderr, handler)),
            ),
            _ => {
                return Err(RunnerError::Io(std::io::Error::other(
                    "child output pipes were not captured",
                )));
            }
        };

        let kill = KillHandle::new(pid);
        let task = tokio::spawn(supervise(child, readers, kill.clone(), self.timeout, slot));

        Ok(RunningProcess { pid, kill, task })
    }
}

/// Occupancy of a runner's slot, released on drop
struct Slot(Arc<AtomicBool>);

impl Slot {
    fn claim(busy: &Arc<AtomicBool>) -> Option<Self> {
        busy.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Slot(busy.clone()))
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A process started by [`ProcessRunner::start`]
#[derive(Debug)]
pub struct RunningProcess {
    pid: Option<u32>,
    kill: KillHandle,
    task: JoinHandle<Result<ProcessOutput, RunnerError>>,
}

impl RunningProcess {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn kill_handle(&self) -> KillHandle {
        self.kill.clone()
    }

    /// Waits until the process has exited and all output was delivered
    ///
    /// The runner's slot is free again by the time this resolves.
    pub async fn wait(self) -> Result<ProcessOutput, RunnerError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(RunnerError::Io(std::io::Error::other(e))),
        }
    }
}

/// Cloneable handle that terminates a running process tree
#[derive(Debug, Clone)]
pub struct KillHandle {
    inner: Arc<KillState>,
}

#[derive(Debug)]
struct KillState {
    pid: Option<u32>,
    requested: AtomicBool,
    exited: AtomicBool,
    notify: Notify,
}

impl KillHandle {
    fn new(pid: Option<u32>) -> Self {
        Self {
            inner: Arc::new(KillState {
                pid,
                requested: AtomicBool::new(false),
                exited: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Kills the process and its descendants
    ///
    /// Returns `true` if this call sent the signal, `false` if the process
    /// had already been killed or had already exited.
    pub fn kill(&self) -> bool {
        if !self.signal() {
            return false;
        }
        self.inner.notify.notify_one();
        true
    }

    pub fn is_requested(&self) -> bool {
        self.inner.requested.load(Ordering::Acquire)
    }

    fn signal(&self) -> bool {
        if self.inner.exited.load(Ordering::Acquire)
            || self.inner.requested.swap(true, Ordering::AcqRel)
        {
            return false;
        }
        if let Some(pid) = self.inner.pid {
            debug!("Killing process group {}", pid);
            if let Err(e) = kill_group(pid) {
                warn!("Failed to kill process group {}: {}", pid, e);
            }
        }
        true
    }

    fn mark_exited(&self) {
        self.inner.exited.store(true, Ordering::Release);
    }
}

enum Ending {
    Exited(std::io::Result<ExitStatus>),
    Killed,
    TimedOut(Duration),
}

/// Resolves once the time limit measured from `deadline` has passed
async fn watchdog(deadline: Option<(Instant, Duration)>) -> Duration {
    match deadline {
        Some((at, limit)) => {
            tokio::time::sleep_until(at).await;
            limit
        }
        None => std::future::pending().await,
    }
}

/// Waits for a child that was just signalled
async fn reap(child: &mut Child) -> std::io::Result<ExitStatus> {
    // Reaches the direct child where group signals are unavailable
    if let Err(e) = child.start_kill() {
        debug!("start_kill after group kill: {}", e);
    }
    child.wait().await
}

async fn supervise(
    mut child: Child,
    readers: (JoinHandle<String>, JoinHandle<String>),
    kill: KillHandle,
    timeout: Option<Duration>,
    slot: Slot,
) -> Result<ProcessOutput, RunnerError> {
    let deadline = timeout.map(|limit| (Instant::now() + limit, limit));

    let ending = tokio::select! {
        status = child.wait() => Ending::Exited(status),
        _ = kill.inner.notify.notified() => Ending::Killed,
        limit = watchdog(deadline) => Ending::TimedOut(limit),
    };

    let (status, mut interrupted) = match ending {
        Ending::Exited(status) => (status, None),
        Ending::Killed => (reap(&mut child).await, Some(RunnerError::Cancelled)),
        Ending::TimedOut(limit) => {
            warn!("Process {:?} exceeded its time limit of {:?}", child.id(), limit);
            kill.signal();
            (reap(&mut child).await, Some(RunnerError::TimedOut(limit)))
        }
    };

    let (stdout, stderr) = readers;
    let drain = async { tokio::join!(stdout, stderr) };
    tokio::pin!(drain);

    // Descendants can keep the pipes open after the direct child exited; the
    // group stays killable until they are drained
    let (stdout, stderr) = if interrupted.is_some() {
        (&mut drain).await
    } else {
        tokio::select! {
            output = &mut drain => output,
            _ = kill.inner.notify.notified() => (&mut drain).await,
            limit = watchdog(deadline) => {
                warn!("Descendants of process {:?} outlived its time limit of {:?}", kill.inner.pid, limit);
                kill.signal();
                interrupted = Some(RunnerError::TimedOut(limit));
                (&mut drain).await
            }
        }
    };
    kill.mark_exited();

    let stdout = stdout.unwrap_or_else(|e| {
        warn!("stdout reader failed: {}", e);
        String::new()
    });
    let stderr = stderr.unwrap_or_else(|e| {
        warn!("stderr reader failed: {}", e);
        String::new()
    });

    drop(slot);

    if let Some(err) = interrupted {
        return Err(err);
    }
    if kill.is_requested() {
        return Err(RunnerError::Cancelled);
    }

    let status = status?;
    debug!("Process exited with {}", status);
    match status.code() {
        Some(0) => Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: 0,
        }),
        exit_code => Err(RunnerError::ProcessFailed { exit_code, stderr }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script])
    }

    fn ignore(_: StreamKind, _: &str) {}

    #[tokio::test]
    async fn test_collects_output_in_order() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let runner = ProcessRunner::new();

        let process = runner
            .start(
                &sh("echo 10%; echo 55%; echo oops >&2; echo Done"),
                move |stream: StreamKind, line: &str| {
                    sink.lock().unwrap().push((stream, line.to_string()));
                },
            )
            .unwrap();
        let output = process.wait().await.unwrap();

        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout, "10%\n55%\nDone\n");
        assert_eq!(output.stderr, "oops\n");

        let lines = lines.lock().unwrap();
        let stdout: Vec<_> = lines
            .iter()
            .filter(|(s, _)| *s == StreamKind::Stdout)
            .map(|(_, l)| l.as_str())
            .collect();
        assert_eq!(stdout, vec!["10%", "55%", "Done"]);
        assert!(lines.contains(&(StreamKind::Stderr, "oops".to_string())));
    }

    #[tokio::test]
    async fn test_non_zero_exit_fails_with_stderr() {
        let runner = ProcessRunner::new();
        let process = runner.start(&sh("echo broken >&2; exit 2"), ignore).unwrap();

        match process.wait().await {
            Err(RunnerError::ProcessFailed { exit_code, stderr }) => {
                assert_eq!(exit_code, Some(2));
                assert_eq!(stderr, "broken\n");
            }
            other => panic!("expected ProcessFailed, got {:?}", other),
        }
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let runner = ProcessRunner::new();
        let result = runner.start(&CommandSpec::new("/nonexistent/spore-tool"), ignore);

        assert!(matches!(result, Err(RunnerError::Spawn { .. })));
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_busy() {
        let runner = ProcessRunner::new();
        let first = runner.start(&sh("sleep 0.3"), ignore).unwrap();

        let second = runner.start(&sh("true"), ignore);
        assert!(matches!(second, Err(RunnerError::JobAlreadyRunning)));

        first.wait().await.unwrap();
        assert!(!runner.is_busy());
        runner.start(&sh("true"), ignore).unwrap().wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_kill_settles_as_cancelled() {
        let runner = ProcessRunner::new();
        let started = Instant::now();
        let process = runner.start(&sh("sleep 30 & sleep 30; wait"), ignore).unwrap();
        let handle = process.kill_handle();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.kill());
        assert!(!handle.kill());

        let result = process.wait().await;
        assert!(matches!(result, Err(RunnerError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_kill_reaches_descendants_after_parent_exits() {
        let runner = ProcessRunner::new();
        let started = Instant::now();
        let process = runner.start(&sh("echo forked; sleep 30 & exit 0"), ignore).unwrap();
        let handle = process.kill_handle();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(handle.kill());

        let result = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .expect("wait did not settle after kill");
        assert!(matches!(result, Err(RunnerError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_watchdog_covers_lingering_descendants() {
        let runner = ProcessRunner::new().with_timeout(Duration::from_millis(300));
        let process = runner.start(&sh("sleep 30 & exit 0"), ignore).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(5), process.wait())
            .await
            .expect("watchdog did not fire");
        assert!(matches!(result, Err(RunnerError::TimedOut(_))));
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_kill_after_exit_is_noop() {
        let runner = ProcessRunner::new();
        let process = runner.start(&sh("true"), ignore).unwrap();
        let handle = process.kill_handle();
        process.wait().await.unwrap();

        assert!(!handle.kill());
    }

    #[tokio::test]
    async fn test_watchdog_times_out() {
        let runner = ProcessRunner::new().with_timeout(Duration::from_millis(200));
        let process = runner.start(&sh("sleep 30"), ignore).unwrap();

        let result = process.wait().await;
        assert!(matches!(result, Err(RunnerError::TimedOut(_))));
        assert!(!runner.is_busy());
    }

    #[tokio::test]
    async fn test_working_dir_and_env_are_applied() {
        let runner = ProcessRunner::new();
        let spec = sh("pwd; echo $SPORE_TEST_VAR")
            .working_dir("/")
            .env("SPORE_TEST_VAR", "hello");

        let output = runner.start(&spec, ignore).unwrap().wait().await.unwrap();
        assert_eq!(output.stdout, "/\nhello\n");
    }
}
