//! Job Registry
//!
//! Single owner of job state. Starts processes on free runner slots, feeds
//! their output through the progress extractor, records the outcome and
//! publishes every change to the progress broadcaster.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use spore_core::domain::command::CommandSpec;
use spore_core::domain::job::{JobId, JobSnapshot, JobStatus};
use spore_core::domain::log::{LogEntry, LogKind};
use spore_core::domain::tool::ToolKind;
use spore_core::progress::ProgressExtractor;
use spore_core::tools::{JobRequest, ToolError};
use spore_runner::{ProcessOutput, ProcessRunner, RunnerError, StreamKind};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::repository::job_repository::{JobRecord, JobStore};
use crate::service::broadcast::{ProgressBroadcaster, Subscription};

/// Highest progress a job may report before its process has exited
const RUNNING_PROGRESS_CAP: u8 = 99;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to start job: {0}")]
    Spawn(#[source] RunnerError),

    #[error("a job is already running")]
    JobAlreadyRunning,

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("job {0} is not running")]
    JobNotRunning(JobId),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<ToolError> for RegistryError {
    fn from(err: ToolError) -> Self {
        RegistryError::InvalidRequest(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub slots: usize,
    pub log_capacity: usize,
    pub stream_log_tail: usize,
    pub max_retained_jobs: usize,
    pub timeout: Option<Duration>,
    pub container_engine: String,
    pub allow_raw_commands: bool,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for RegistryOptions {
    fn from(config: &Config) -> Self {
        Self {
            slots: config.max_concurrent_jobs,
            log_capacity: config.log_capacity,
            stream_log_tail: config.stream_log_tail,
            max_retained_jobs: config.max_retained_jobs,
            timeout: config.job_timeout,
            container_engine: config.container_engine.clone(),
            allow_raw_commands: config.allow_raw_commands,
        }
    }
}

/// State reachable from output callbacks and supervising tasks
struct Shared {
    store: Mutex<JobStore>,
    broadcaster: Arc<ProgressBroadcaster>,
    options: RegistryOptions,
}

#[derive(Clone)]
pub struct JobRegistry {
    shared: Arc<Shared>,
    runners: Arc<Vec<ProcessRunner>>,
}

impl JobRegistry {
    pub fn new(options: RegistryOptions, broadcaster: Arc<ProgressBroadcaster>) -> Self {
        let runners = (0..options.slots.max(1))
            .map(|_| match options.timeout {
                Some(timeout) => ProcessRunner::new().with_timeout(timeout),
                None => ProcessRunner::new(),
            })
            .collect();

        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(JobStore::new(options.max_retained_jobs)),
                broadcaster,
                options,
            }),
            runners: Arc::new(runners),
        }
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.shared.options
    }

    /// Validates a tool request and submits the command it builds
    pub fn submit_request(&self, request: &JobRequest) -> Result<JobId, RegistryError> {
        if matches!(request, JobRequest::Command(_)) && !self.shared.options.allow_raw_commands {
            return Err(RegistryError::InvalidRequest(
                "raw commands are disabled on this server".to_string(),
            ));
        }
        let spec = request.build(&self.shared.options.container_engine)?;
        self.submit(request.tool(), spec)
    }

    /// Starts `spec` on a free slot and returns the new job's id
    ///
    /// Nothing is recorded when no slot is free or the process cannot be
    /// spawned.
    pub fn submit(&self, tool: ToolKind, spec: CommandSpec) -> Result<JobId, RegistryError> {
        let id = Uuid::new_v4();
        let command = spec.display();
        let mut store = self.shared.store.lock().unwrap();

        // Output callbacks block on the store lock until the record exists
        let mut process = None;
        for runner in self.runners.iter() {
            let shared = self.shared.clone();
            let handler = move |stream: StreamKind, line: &str| shared.on_output(id, stream, line);
            match runner.start(&spec, handler) {
                Ok(started) => {
                    process = Some(started);
                    break;
                }
                Err(RunnerError::JobAlreadyRunning) => continue,
                Err(e) => {
                    warn!("Failed to start job {} ({}): {}", id, command, e);
                    return Err(RegistryError::Spawn(e));
                }
            }
        }
        let process = process.ok_or(RegistryError::JobAlreadyRunning)?;

        let mut record = JobRecord::new(
            id,
            tool,
            command,
            self.shared.options.log_capacity,
            ProgressExtractor::for_tool(tool),
        );
        record.status = JobStatus::Running;
        record.kill = Some(process.kill_handle());
        self.shared
            .broadcaster
            .publish(record.event(self.shared.options.stream_log_tail));
        info!(
            "Job {} started: {} (pid {:?})",
            id,
            record.command,
            process.pid()
        );
        store.insert(record);
        drop(store);

        let shared = self.shared.clone();
        tokio::spawn(async move {
            let result = process.wait().await;
            shared.finish(id, result);
        });

        Ok(id)
    }

    pub fn get_status(&self, id: JobId) -> Result<JobSnapshot, RegistryError> {
        let store = self.shared.store.lock().unwrap();
        store
            .get(&id)
            .map(JobRecord::snapshot)
            .ok_or(RegistryError::JobNotFound(id))
    }

    /// Every retained job, newest first
    pub fn list(&self) -> Vec<JobSnapshot> {
        let store = self.shared.store.lock().unwrap();
        store.list().map(JobRecord::snapshot).collect()
    }

    /// Subscribes to progress events of `id`, starting with its current state
    pub fn subscribe(&self, id: JobId) -> Result<Subscription, RegistryError> {
        let store = self.shared.store.lock().unwrap();
        let job = store.get(&id).ok_or(RegistryError::JobNotFound(id))?;
        let event = job.event(self.shared.options.stream_log_tail);

        if job.status.is_terminal() && job.kill.is_none() {
            return Ok(ProgressBroadcaster::detached(id, event));
        }
        Ok(self.shared.broadcaster.subscribe(id, event))
    }

    /// Cancels a running job and waits until its process is gone
    ///
    /// Fails with `JobNotRunning` for jobs that already finished; their
    /// state is left untouched.
    pub async fn cancel(&self, id: JobId) -> Result<JobSnapshot, RegistryError> {
        let (mut settled, snapshot) = {
            let mut store = self.shared.store.lock().unwrap();
            let job = store.get_mut(&id).ok_or(RegistryError::JobNotFound(id))?;
            if job.status.is_terminal() {
                return Err(RegistryError::JobNotRunning(id));
            }

            job.status = JobStatus::Cancelled;
            job.error = Some("cancelled by user".to_string());
            job.completed_at = Some(Utc::now());
            if let Some(kill) = &job.kill {
                kill.kill();
            }
            info!("Job {} cancelled", id);

            self.shared
                .broadcaster
                .publish(job.event(self.shared.options.stream_log_tail));
            (job.settled.subscribe(), job.snapshot())
        };

        if settled.wait_for(|done| *done).await.is_err() {
            debug!("Job {} was dropped before settling", id);
        }

        Ok(self.get_status(id).unwrap_or(snapshot))
    }

    /// Cancels every job that is still running
    pub async fn shutdown(&self) {
        let active = self.shared.store.lock().unwrap().active_ids();
        if active.is_empty() {
            return;
        }
        info!("Cancelling {} running job(s)", active.len());
        futures::future::join_all(active.into_iter().map(|id| self.cancel(id))).await;
    }
}

impl Shared {
    fn on_output(&self, id: JobId, stream: StreamKind, line: &str) {
        let text = line.trim_end();
        if text.trim().is_empty() {
            return;
        }

        let mut store = self.store.lock().unwrap();
        let Some(job) = store.get_mut(&id) else {
            return;
        };
        if job.status.is_terminal() {
            return;
        }

        let update = job.extractor.extract(text, job.progress);
        if let Some(progress) = update.progress {
            job.progress = job.progress.max(progress.min(RUNNING_PROGRESS_CAP));
        }
        if let Some(phase) = update.phase {
            job.phase = Some(phase);
        }
        let entry = update.log.unwrap_or_else(|| {
            let kind = match stream {
                StreamKind::Stdout => LogKind::Stdout,
                StreamKind::Stderr => LogKind::Stderr,
            };
            LogEntry::new(kind, text)
        });
        job.logs.push(entry);

        self.broadcaster
            .publish(job.event(self.options.stream_log_tail));
    }

    fn finish(&self, id: JobId, result: Result<ProcessOutput, RunnerError>) {
        let mut store = self.store.lock().unwrap();
        let Some(job) = store.get_mut(&id) else {
            return;
        };
        job.kill = None;

        if !job.status.is_terminal() {
            match result {
                Ok(output) => {
                    job.status = JobStatus::Completed;
                    job.progress = 100;
                    job.exit_code = Some(output.exit_code);
                    info!("Job {} completed", id);
                }
                Err(RunnerError::TimedOut(limit)) => {
                    job.status = JobStatus::Cancelled;
                    job.error = Some(format!("timed out after {}s", limit.as_secs()));
                    warn!("Job {} timed out after {:?}", id, limit);
                }
                Err(RunnerError::Cancelled) => {
                    job.status = JobStatus::Cancelled;
                    job.error = Some("cancelled".to_string());
                    info!("Job {} was killed", id);
                }
                Err(err) => {
                    let mut message = err.to_string();
                    if let RunnerError::ProcessFailed { exit_code, stderr } = &err {
                        job.exit_code = *exit_code;
                        if let Some(last) = stderr.lines().rev().find(|l| !l.trim().is_empty()) {
                            message = format!("{}: {}", message, last.trim());
                        }
                    }
                    job.status = JobStatus::Failed;
                    warn!("Job {} failed: {}", id, message);
                    job.error = Some(message);
                }
            }
            job.completed_at = Some(Utc::now());
        }

        self.broadcaster
            .publish(job.event(self.options.stream_log_tail));
        self.broadcaster.close_job(id);
        job.settled.send_replace(true);

        for evicted in store.evict_finished() {
            debug!("Evicted job {}", evicted);
        }
    }
}
