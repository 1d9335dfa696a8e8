//! Durable job/task records: the state the Orchestrator persists after
//! every transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{JobId, LayerType};

/// Per-task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Enqueued, not yet dispatched.
    Pending,
    /// Currently executing.
    Running,
    /// Extractor succeeded.
    Completed,
    /// Extractor failed and retries are exhausted.
    Failed,
    /// No expected-count entry exists for this state; the extractor never
    /// ran.
    NotConfigured,
    /// The job was cancelled before this task finished.
    Cancelled,
}

/// One `(state, layer)` unit of work and its current lifecycle state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    /// State/jurisdiction code this task extracts.
    pub state: String,
    /// Layer this task extracts.
    pub layer: LayerType,
    /// Current status.
    pub status: TaskStatus,
    /// Number of retry attempts made so far.
    pub retries: u32,
    /// Most recent error, if any.
    pub last_error: Option<String>,
    /// Expected feature count from the registry, when configured.
    pub expected_count: Option<usize>,
    /// Actual feature count extracted, once completed.
    pub actual_count: Option<usize>,
}

impl TaskRecord {
    /// A fresh, pending task for `state`/`layer`.
    pub fn pending(state: impl Into<String>, layer: LayerType) -> Self {
        Self { state: state.into(), layer, status: TaskStatus::Pending, retries: 0, last_error: None, expected_count: None, actual_count: None }
    }

    /// Stable identifier for this task, `"<state>:<layer>"`.
    pub fn task_id(&self) -> String {
        format!("{}:{}", self.state, self.layer)
    }
}

/// Overall job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// At least one task is still pending or running.
    Running,
    /// Every task completed (or was not configured).
    Completed,
    /// `continueOnError` was false and a task failed, aborting the job.
    Failed,
    /// `continueOnError` was true and the job ran to completion with at
    /// least one task failure.
    Partial,
    /// The job was cancelled before every task finished.
    Cancelled,
}

/// Tunables for a single orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobOptions {
    /// Maximum tasks executing concurrently.
    pub concurrency: usize,
    /// Maximum retry attempts per task before it is marked `Failed`.
    pub max_retries: u32,
    /// Base delay for the retry backoff (`retryDelay * 2^retries`).
    pub retry_delay: std::time::Duration,
    /// Wall-clock budget for a single task attempt.
    pub task_timeout: std::time::Duration,
    /// If false, the first task failure aborts the job; if true, the job
    /// runs to completion and is reported `Partial`.
    pub continue_on_error: bool,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 3,
            retry_delay: std::time::Duration::from_millis(500),
            task_timeout: std::time::Duration::from_secs(30),
            continue_on_error: true,
        }
    }
}

/// The durable record for one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    /// Unique job identifier.
    pub id: JobId,
    /// Options this job was started with.
    pub options: JobOptions,
    /// Every task enqueued for this job.
    pub tasks: Vec<TaskRecord>,
    /// Overall job status.
    pub status: JobStatus,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job record was last updated.
    pub updated_at: DateTime<Utc>,
}

impl JobState {
    /// Construct a new job enqueuing the Cartesian product of `states` and
    /// `layers`.
    pub fn new(states: &[String], layers: &[LayerType], options: JobOptions) -> Self {
        let now = Utc::now();
        let mut tasks = Vec::with_capacity(states.len() * layers.len());
        for state in states {
            for layer in layers {
                tasks.push(TaskRecord::pending(state.clone(), *layer));
            }
        }
        Self { id: JobId::generate(), options, tasks, status: JobStatus::Running, created_at: now, updated_at: now }
    }

    /// Whether every task has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.tasks.iter().all(|t| !matches!(t.status, TaskStatus::Pending | TaskStatus::Running))
    }

    /// Recompute `status` from the current task statuses. Only meaningful
    /// once [`JobState::is_terminal`] is true, except for `Cancelled` which
    /// can be set mid-run.
    pub fn recompute_status(&mut self) {
        if self.status == JobStatus::Cancelled {
            return;
        }
        let any_failed = self.tasks.iter().any(|t| t.status == TaskStatus::Failed);
        self.status = if any_failed {
            if self.tasks.iter().any(|t| t.status == TaskStatus::Pending) { JobStatus::Failed } else { JobStatus::Partial }
        } else if self.is_terminal() {
            JobStatus::Completed
        } else {
            JobStatus::Running
        };
        self.updated_at = Utc::now();
    }
}
