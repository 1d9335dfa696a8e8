//! Batch Orchestrator: a bounded worker pool running the Cartesian product
//! of states and layers as independently retried, durably persisted tasks,
//! streaming progress over an unbounded channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};

use crate::ids::LayerType;
use crate::registry::store::RegistryStore;

use super::job::{JobOptions, JobState, JobStatus, TaskRecord, TaskStatus};
use super::store::{JobStore, JobStoreError};

/// Outcome of one successful extraction.
#[derive(Debug, Clone)]
pub struct ExtractOutcome {
    /// Number of features actually extracted.
    pub actual_count: usize,
}

/// Closed error taxonomy for a single extraction attempt.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    /// The source did not respond within the task timeout.
    #[error("network timeout")]
    NetworkTimeout,
    /// The source returned a non-success HTTP status.
    #[error("http error {status}")]
    HttpError {
        /// HTTP status code.
        status: u16,
    },
    /// The source's payload failed to parse or validate structurally.
    #[error("invalid payload")]
    InvalidPayload,
}

/// Extracts one `(state, layer)` unit of work. The Orchestrator owns all
/// retry/timeout/backoff policy; extractors report success or failure once
/// per call and never retry themselves, per this crate's propagation
/// policy.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Run one extraction attempt for `state`/`layer`.
    async fn extract(&self, state: &str, layer: LayerType) -> Result<ExtractOutcome, ExtractError>;
}

/// Progress-stream status for a single task transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    /// Dispatch began.
    Started,
    /// The task completed successfully.
    Completed,
    /// The task failed (terminally, after retries, or was skipped as
    /// unconfigured).
    Failed,
}

/// One progress update, emitted at every task state transition.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// The task's stable identifier, `"<state>:<layer>"`.
    pub task_id: String,
    /// State this task extracts.
    pub state: String,
    /// Layer this task extracts.
    pub layer: LayerType,
    /// What just happened.
    pub status: ProgressStatus,
    /// Error detail, when `status` is `Failed`.
    pub error: Option<String>,
}

/// Closed error taxonomy for orchestration-level failures.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    /// A task failed after exhausting its retries.
    #[error("task failed: {0}")]
    TaskFailed(String),
    /// A task exceeded its timeout budget.
    #[error("task timed out")]
    TaskTimeout,
    /// The job was cancelled before this task finished.
    #[error("task cancelled")]
    TaskCancelled,
    /// Persisting job state failed.
    #[error("job store error: {0}")]
    Store(#[from] JobStoreError),
    /// The requested job does not exist.
    #[error("job not found")]
    JobNotFound,
}

/// One row of [`export_validation_report`]'s `results` array.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReportRow {
    state: String,
    layer: LayerType,
    expected: Option<usize>,
    actual: Option<usize>,
    status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Aggregate counts for [`export_validation_report`].
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReportSummary {
    matched: usize,
    mismatched: usize,
    errors: usize,
    not_configured: usize,
}

/// The full document written by [`Orchestrator::export_validation_report`],
/// matching the wire shape in the external-interfaces contract.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    timestamp: chrono::DateTime<chrono::Utc>,
    total_states: usize,
    results: Vec<ValidationReportRow>,
    summary: ValidationReportSummary,
}

/// Coordinates a durable, resumable batch of `(state, layer)` extraction
/// tasks under a bounded worker pool.
pub struct Orchestrator<E: Extractor> {
    extractor: Arc<E>,
    registry: Arc<dyn RegistryStore>,
    store: Arc<dyn JobStore>,
}

impl<E: Extractor + 'static> Orchestrator<E> {
    /// Construct an orchestrator over `extractor`, gating tasks through
    /// `registry` and persisting state via `store`.
    pub fn new(extractor: Arc<E>, registry: Arc<dyn RegistryStore>, store: Arc<dyn JobStore>) -> Self {
        Self { extractor, registry, store }
    }

    /// Create a new job enqueuing every `(state, layer)` pair and run it to
    /// completion, emitting progress on `progress` if given.
    pub async fn orchestrate_states(
        &self,
        states: Vec<String>,
        layers: Vec<LayerType>,
        options: JobOptions,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<JobState, OrchestrationError> {
        let job = JobState::new(&states, &layers, options);
        self.store.save(&job).await?;
        self.run(job, progress).await
    }

    /// Reload `job_id` and re-run it: `Completed` tasks are skipped,
    /// `Failed`/`Pending`/`Cancelled` tasks are retried from scratch.
    pub async fn resume_job(
        &self,
        job_id: crate::ids::JobId,
        progress: Option<mpsc::UnboundedSender<ProgressEvent>>,
    ) -> Result<JobState, OrchestrationError> {
        let mut job = self.store.load(job_id).await?.ok_or(OrchestrationError::JobNotFound)?;
        for task in &mut job.tasks {
            if matches!(task.status, TaskStatus::Failed | TaskStatus::Cancelled) {
                task.status = TaskStatus::Pending;
                task.retries = 0;
                task.last_error = None;
            }
        }
        job.status = JobStatus::Running;
        self.store.save(&job).await?;
        self.run(job, progress).await
    }

    /// Current status of `job_id`, or `None` if unknown.
    pub async fn get_job_status(&self, job_id: crate::ids::JobId) -> Result<Option<JobState>, OrchestrationError> {
        Ok(self.store.load(job_id).await?)
    }

    /// The `limit` most recently updated jobs.
    pub async fn list_jobs(&self, limit: usize) -> Result<Vec<JobState>, OrchestrationError> {
        Ok(self.store.list(limit).await?)
    }

    /// Write a validation report for `job_id`'s final state to `path`.
    pub async fn export_validation_report(&self, job_id: crate::ids::JobId, path: &std::path::Path) -> Result<(), OrchestrationError> {
        let job = self.store.load(job_id).await?.ok_or(OrchestrationError::JobNotFound)?;
        let mut summary = ValidationReportSummary::default();
        let mut results = Vec::with_capacity(job.tasks.len());
        let mut states = std::collections::HashSet::new();

        for task in &job.tasks {
            states.insert(task.state.clone());
            match task.status {
                TaskStatus::NotConfigured => summary.not_configured += 1,
                TaskStatus::Completed => {
                    if task.expected_count == task.actual_count {
                        summary.matched += 1;
                    } else {
                        summary.mismatched += 1;
                    }
                }
                TaskStatus::Failed | TaskStatus::Cancelled => summary.errors += 1,
                TaskStatus::Pending | TaskStatus::Running => summary.errors += 1,
            }
            results.push(ValidationReportRow {
                state: task.state.clone(),
                layer: task.layer,
                expected: task.expected_count,
                actual: task.actual_count,
                status: task.status,
                error: task.last_error.clone(),
            });
        }

        let report = ValidationReport { timestamp: chrono::Utc::now(), total_states: states.len(), results, summary };
        let contents = serde_json::to_string_pretty(&report).map_err(|e| OrchestrationError::TaskFailed(e.to_string()))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(JobStoreError::Io)?;
        }
        tokio::fs::write(path, contents).await.map_err(JobStoreError::Io)?;
        Ok(())
    }

    async fn run(&self, mut job: JobState, progress: Option<mpsc::UnboundedSender<ProgressEvent>>) -> Result<JobState, OrchestrationError> {
        let aborted = Arc::new(AtomicBool::new(false));
        let semaphore = Arc::new(Semaphore::new(job.options.concurrency.max(1)));
        let mut set = tokio::task::JoinSet::new();

        for (index, task) in job.tasks.iter().enumerate() {
            if task.status == TaskStatus::Completed {
                continue;
            }
            let extractor = Arc::clone(&self.extractor);
            let registry = Arc::clone(&self.registry);
            let semaphore = Arc::clone(&semaphore);
            let aborted = Arc::clone(&aborted);
            let max_retries = job.options.max_retries;
            let retry_delay = job.options.retry_delay;
            let task_timeout = job.options.task_timeout;
            let state = task.state.clone();
            let layer = task.layer;

            set.spawn(async move {
                if aborted.load(Ordering::SeqCst) {
                    return (index, TaskOutcome::Cancelled);
                }
                let _permit = semaphore.acquire_owned().await.expect("semaphore not closed");
                if aborted.load(Ordering::SeqCst) {
                    return (index, TaskOutcome::Cancelled);
                }

                let expected = match registry.expected_count(&state).await {
                    Ok(entry) => entry,
                    Err(_) => None,
                };
                let Some(expected_entry) = expected else {
                    return (index, TaskOutcome::NotConfigured);
                };

                let mut retries = 0u32;
                loop {
                    let result = tokio::time::timeout(task_timeout, extractor.extract(&state, layer)).await;
                    match result {
                        Ok(Ok(outcome)) => {
                            return (
                                index,
                                TaskOutcome::Completed { expected: expected_entry.expected_count as usize, actual: outcome.actual_count, retries },
                            )
                        }
                        Ok(Err(error)) => {
                            if retries >= max_retries {
                                return (index, TaskOutcome::Failed { error: error.to_string(), retries });
                            }
                            retries += 1;
                            tokio::time::sleep(retry_delay * 2u32.pow(retries - 1)).await;
                        }
                        Err(_) => {
                            if retries >= max_retries {
                                return (index, TaskOutcome::Failed { error: "task timed out".to_string(), retries });
                            }
                            retries += 1;
                            tokio::time::sleep(retry_delay * 2u32.pow(retries - 1)).await;
                        }
                    }
                    if aborted.load(Ordering::SeqCst) {
                        return (index, TaskOutcome::Cancelled);
                    }
                }
            });

            if let Some(sender) = &progress {
                let _ = sender.send(ProgressEvent { task_id: task.task_id(), state: task.state.clone(), layer: task.layer, status: ProgressStatus::Started, error: None });
            }
        }

        while let Some(joined) = set.join_next().await {
            let Ok((index, outcome)) = joined else { continue };
            let task = &mut job.tasks[index];
            match outcome {
                TaskOutcome::Completed { expected, actual, retries } => {
                    task.status = TaskStatus::Completed;
                    task.expected_count = Some(expected);
                    task.actual_count = Some(actual);
                    task.retries = retries;
                    if let Some(sender) = &progress {
                        let _ = sender.send(ProgressEvent { task_id: task.task_id(), state: task.state.clone(), layer: task.layer, status: ProgressStatus::Completed, error: None });
                    }
                }
                TaskOutcome::Failed { error, retries } => {
                    task.status = TaskStatus::Failed;
                    task.last_error = Some(error.clone());
                    task.retries = retries;
                    if let Some(sender) = &progress {
                        let _ = sender.send(ProgressEvent { task_id: task.task_id(), state: task.state.clone(), layer: task.layer, status: ProgressStatus::Failed, error: Some(error) });
                    }
                    if !job.options.continue_on_error {
                        aborted.store(true, Ordering::SeqCst);
                    }
                }
                TaskOutcome::NotConfigured => {
                    task.status = TaskStatus::NotConfigured;
                }
                TaskOutcome::Cancelled => {
                    task.status = TaskStatus::Cancelled;
                }
            }
            self.store.save(&job).await?;
        }

        job.recompute_status();
        if aborted.load(Ordering::SeqCst) && job.status != JobStatus::Cancelled {
            job.status = JobStatus::Failed;
        }
        self.store.save(&job).await?;
        Ok(job)
    }
}

enum TaskOutcome {
    Completed { expected: usize, actual: usize, retries: u32 },
    Failed { error: String, retries: u32 },
    NotConfigured,
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::store::InMemoryJobStore;
    use crate::registry::{ExpectedCountEntry, FileRegistryStore, GovernanceType};
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn temp_registry_dir() -> std::path::PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("boundary-kernel-orchestrator-test-{}", uuid::Uuid::new_v4()));
        dir
    }

    async fn registry_with_expected(state: &str, count: u32) -> Arc<dyn RegistryStore> {
        let store = FileRegistryStore::new(temp_registry_dir());
        store
            .add_expected_count(
                ExpectedCountEntry {
                    fips: state.to_string(),
                    city_name: "Test City".to_string(),
                    state: state.to_string(),
                    expected_count: count,
                    governance_type: GovernanceType::DistrictBased,
                    source_url: "https://example.test".to_string(),
                    last_verified: chrono::Utc::now(),
                    confidence: 100,
                },
                "test",
                "fixture setup",
            )
            .await
            .unwrap();
        Arc::new(store)
    }

    struct AlwaysSucceeds {
        count: usize,
    }

    #[async_trait]
    impl Extractor for AlwaysSucceeds {
        async fn extract(&self, _state: &str, _layer: LayerType) -> Result<ExtractOutcome, ExtractError> {
            Ok(ExtractOutcome { actual_count: self.count })
        }
    }

    struct AlwaysFails;

    #[async_trait]
    impl Extractor for AlwaysFails {
        async fn extract(&self, _state: &str, _layer: LayerType) -> Result<ExtractOutcome, ExtractError> {
            Err(ExtractError::NetworkTimeout)
        }
    }

    struct FailsThenSucceeds {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Extractor for FailsThenSucceeds {
        async fn extract(&self, _state: &str, _layer: LayerType) -> Result<ExtractOutcome, ExtractError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Err(ExtractError::NetworkTimeout)
            } else {
                Ok(ExtractOutcome { actual_count: 3 })
            }
        }
    }

    #[tokio::test]
    async fn completes_every_task_when_registry_configured_and_extractor_succeeds() {
        let registry = registry_with_expected("WI", 8).await;
        let orchestrator = Orchestrator::new(Arc::new(AlwaysSucceeds { count: 8 }), registry, Arc::new(InMemoryJobStore::new()));
        let job = orchestrator
            .orchestrate_states(vec!["WI".to_string()], vec![LayerType::County], JobOptions { concurrency: 2, ..Default::default() }, None)
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.tasks[0].status, TaskStatus::Completed);
        assert_eq!(job.tasks[0].actual_count, Some(8));
    }

    #[tokio::test]
    async fn registry_miss_short_circuits_to_not_configured_without_calling_extractor() {
        let registry: Arc<dyn RegistryStore> = Arc::new(FileRegistryStore::new(temp_registry_dir()));
        let orchestrator = Orchestrator::new(Arc::new(AlwaysFails), registry, Arc::new(InMemoryJobStore::new()));
        let job = orchestrator.orchestrate_states(vec!["ZZ".to_string()], vec![LayerType::County], JobOptions::default(), None).await.unwrap();
        assert_eq!(job.tasks[0].status, TaskStatus::NotConfigured);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn continue_on_error_false_marks_job_failed_on_first_task_failure() {
        let registry = registry_with_expected("WI", 8).await;
        let orchestrator = Orchestrator::new(Arc::new(AlwaysFails), registry, Arc::new(InMemoryJobStore::new()));
        let options = JobOptions { max_retries: 0, retry_delay: Duration::from_millis(1), continue_on_error: false, ..Default::default() };
        let job = orchestrator.orchestrate_states(vec!["WI".to_string()], vec![LayerType::County], options, None).await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.tasks[0].status, TaskStatus::Failed);
    }

    #[tokio::test]
    async fn continue_on_error_true_reports_partial_status() {
        let registry = registry_with_expected("WI", 8).await;
        let orchestrator = Orchestrator::new(Arc::new(AlwaysFails), registry, Arc::new(InMemoryJobStore::new()));
        let options = JobOptions { max_retries: 0, retry_delay: Duration::from_millis(1), continue_on_error: true, ..Default::default() };
        let job = orchestrator.orchestrate_states(vec!["WI".to_string()], vec![LayerType::County], options, None).await.unwrap();
        assert_eq!(job.status, JobStatus::Partial);
    }

    #[tokio::test]
    async fn task_retries_until_it_succeeds_within_the_retry_budget() {
        let registry = registry_with_expected("WI", 3).await;
        let extractor = Arc::new(FailsThenSucceeds { calls: AtomicUsize::new(0) });
        let orchestrator = Orchestrator::new(extractor, registry, Arc::new(InMemoryJobStore::new()));
        let options = JobOptions { max_retries: 2, retry_delay: Duration::from_millis(1), ..Default::default() };
        let job = orchestrator.orchestrate_states(vec!["WI".to_string()], vec![LayerType::County], options, None).await.unwrap();
        assert_eq!(job.tasks[0].status, TaskStatus::Completed);
        assert_eq!(job.tasks[0].retries, 1);
    }

    #[tokio::test]
    async fn resume_job_reruns_only_failed_tasks() {
        let registry = registry_with_expected("WI", 8).await;
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let failing = Orchestrator::new(Arc::new(AlwaysFails), Arc::clone(&registry), Arc::clone(&store));
        let options = JobOptions { max_retries: 0, retry_delay: Duration::from_millis(1), continue_on_error: true, ..Default::default() };
        let job = failing.orchestrate_states(vec!["WI".to_string()], vec![LayerType::County], options, None).await.unwrap();
        assert_eq!(job.tasks[0].status, TaskStatus::Failed);

        let succeeding = Orchestrator::new(Arc::new(AlwaysSucceeds { count: 8 }), registry, store);
        let resumed = succeeding.resume_job(job.id, None).await.unwrap();
        assert_eq!(resumed.tasks[0].status, TaskStatus::Completed);
        assert_eq!(resumed.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn export_validation_report_writes_expected_shape() {
        let registry = registry_with_expected("WI", 8).await;
        let orchestrator = Orchestrator::new(Arc::new(AlwaysSucceeds { count: 7 }), registry, Arc::new(InMemoryJobStore::new()));
        let job = orchestrator.orchestrate_states(vec!["WI".to_string()], vec![LayerType::County], JobOptions::default(), None).await.unwrap();

        let mut path = std::env::temp_dir();
        path.push(format!("boundary-kernel-report-{}.json", uuid::Uuid::new_v4()));
        orchestrator.export_validation_report(job.id, &path).await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["summary"]["mismatched"], 1);
        assert_eq!(parsed["totalStates"], 1);
        tokio::fs::remove_file(&path).await.ok();
    }
}
