//! Job Repository
//!
//! In-memory storage for job records. Nothing survives a restart.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use spore_core::domain::job::{JobId, JobSnapshot, JobStatus, ProgressEvent};
use spore_core::domain::log::LogBuffer;
use spore_core::domain::tool::ToolKind;
use spore_core::progress::ProgressExtractor;
use spore_runner::KillHandle;
use tokio::sync::watch;

/// Mutable state of one job, owned by the registry
#[derive(Debug)]
pub struct JobRecord {
    pub id: JobId,
    pub tool: ToolKind,
    pub command: String,
    pub status: JobStatus,
    pub progress: u8,
    pub phase: Option<String>,
    pub logs: LogBuffer,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub extractor: ProgressExtractor,
    /// Present while the process is alive
    pub kill: Option<KillHandle>,
    /// Flips to `true` once the supervising task has recorded the outcome
    pub settled: watch::Sender<bool>,
}

impl JobRecord {
    pub fn new(
        id: JobId,
        tool: ToolKind,
        command: String,
        log_capacity: usize,
        extractor: ProgressExtractor,
    ) -> Self {
        let (settled, _) = watch::channel(false);
        Self {
            id,
            tool,
            command,
            status: JobStatus::Queued,
            progress: 0,
            phase: None,
            logs: LogBuffer::new(log_capacity),
            error: None,
            exit_code: None,
            started_at: Utc::now(),
            completed_at: None,
            extractor,
            kill: None,
            settled,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id,
            tool: self.tool,
            command: self.command.clone(),
            status: self.status,
            progress: self.progress,
            phase: self.phase.clone(),
            logs: self.logs.to_vec(),
            completed: self.status.is_terminal(),
            error: self.error.clone(),
            exit_code: self.exit_code,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }

    pub fn event(&self, log_tail: usize) -> ProgressEvent {
        ProgressEvent {
            job_id: self.id,
            status: self.status,
            progress: self.progress,
            phase: self.phase.clone(),
            logs: self.logs.tail(log_tail),
            completed: self.status.is_terminal(),
            error: self.error.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// Job records in submission order
#[derive(Debug)]
pub struct JobStore {
    jobs: HashMap<JobId, JobRecord>,
    order: VecDeque<JobId>,
    max_retained: usize,
}

impl JobStore {
    pub fn new(max_retained: usize) -> Self {
        Self {
            jobs: HashMap::new(),
            order: VecDeque::new(),
            max_retained: max_retained.max(1),
        }
    }

    pub fn insert(&mut self, record: JobRecord) {
        self.order.push_back(record.id);
        self.jobs.insert(record.id, record);
    }

    pub fn get(&self, id: &JobId) -> Option<&JobRecord> {
        self.jobs.get(id)
    }

    pub fn get_mut(&mut self, id: &JobId) -> Option<&mut JobRecord> {
        self.jobs.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// All records, newest first
    pub fn list(&self) -> impl Iterator<Item = &JobRecord> {
        self.order.iter().rev().filter_map(|id| self.jobs.get(id))
    }

    /// Ids of every job that has not reached a terminal state
    pub fn active_ids(&self) -> Vec<JobId> {
        self.list()
            .filter(|job| !job.status.is_terminal())
            .map(|job| job.id)
            .collect()
    }

    /// Drops the oldest finished jobs beyond the retention limit
    ///
    /// Running jobs are never evicted. Returns the evicted ids.
    pub fn evict_finished(&mut self) -> Vec<JobId> {
        let finished = self
            .jobs
            .values()
            .filter(|job| job.status.is_terminal())
            .count();
        let mut excess = finished.saturating_sub(self.max_retained);
        let mut evicted = Vec::new();

        self.order.retain(|id| {
            if excess == 0 {
                return true;
            }
            let terminal = self
                .jobs
                .get(id)
                .is_some_and(|job| job.status.is_terminal());
            if terminal {
                excess -= 1;
                evicted.push(*id);
                false
            } else {
                true
            }
        });

        for id in &evicted {
            self.jobs.remove(id);
        }
        evicted
    }
}
