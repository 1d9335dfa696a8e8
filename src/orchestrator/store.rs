//! Durable persistence for [`JobState`]: atomic temp-file-then-rename
//! writes, mirroring [`crate::snapshot::store::FileSnapshotStore`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use crate::ids::JobId;

use super::job::JobState;

/// Error surface for job persistence.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// Underlying filesystem operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A stored job record could not be deserialized.
    #[error("malformed job record: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Durable storage for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist `job`, overwriting any prior record with the same id.
    async fn save(&self, job: &JobState) -> Result<(), JobStoreError>;

    /// Load a job by id.
    async fn load(&self, id: JobId) -> Result<Option<JobState>, JobStoreError>;

    /// List up to `limit` jobs, most recently updated first.
    async fn list(&self, limit: usize) -> Result<Vec<JobState>, JobStoreError>;
}

/// In-memory [`JobStore`], for tests and ephemeral single-process use.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<BTreeMap<JobId, JobState>>,
}

impl InMemoryJobStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(&self, job: &JobState) -> Result<(), JobStoreError> {
        self.jobs.write().insert(job.id, job.clone());
        Ok(())
    }

    async fn load(&self, id: JobId) -> Result<Option<JobState>, JobStoreError> {
        Ok(self.jobs.read().get(&id).cloned())
    }

    async fn list(&self, limit: usize) -> Result<Vec<JobState>, JobStoreError> {
        let mut jobs: Vec<JobState> = self.jobs.read().values().cloned().collect();
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}

/// File-backed [`JobStore`]: one `job-<uuid>.json` document per job,
/// written atomically.
pub struct FileJobStore {
    dir: PathBuf,
}

impl FileJobStore {
    /// Construct a store rooted at `dir` (created on first write).
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: JobId) -> PathBuf {
        self.dir.join(format!("job-{}.json", id.as_uuid()))
    }

    async fn write_atomic(&self, path: &Path, contents: &str) -> Result<(), JobStoreError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn save(&self, job: &JobState) -> Result<(), JobStoreError> {
        let contents = serde_json::to_string_pretty(job)?;
        self.write_atomic(&self.path_for(job.id), &contents).await
    }

    async fn load(&self, id: JobId) -> Result<Option<JobState>, JobStoreError> {
        let path = self.path_for(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, limit: usize) -> Result<Vec<JobState>, JobStoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut jobs = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_job_file = path.file_name().and_then(|n| n.to_str()).map(|n| n.starts_with("job-") && n.ends_with(".json")).unwrap_or(false);
            if !is_job_file {
                continue;
            }
            let contents = tokio::fs::read_to_string(&path).await?;
            if let Ok(job) = serde_json::from_str::<JobState>(&contents) {
                jobs.push(job);
            }
        }
        jobs.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        jobs.truncate(limit);
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::LayerType;
    use crate::orchestrator::job::JobOptions;

    fn temp_dir() -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("boundary-kernel-jobstore-test-{}", uuid::Uuid::new_v4()));
        dir
    }

    #[tokio::test]
    async fn in_memory_store_round_trips_a_job() {
        let store = InMemoryJobStore::new();
        let job = JobState::new(&["WI".to_string()], &[LayerType::County], JobOptions::default());
        store.save(&job).await.unwrap();
        let loaded = store.load(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, job.id);
    }

    #[tokio::test]
    async fn file_store_persists_and_reloads_across_instances() {
        let dir = temp_dir();
        let job = JobState::new(&["WI".to_string()], &[LayerType::County], JobOptions::default());
        {
            let store = FileJobStore::new(&dir);
            store.save(&job).await.unwrap();
        }
        let reopened = FileJobStore::new(&dir);
        let loaded = reopened.load(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.tasks.len(), 1);
        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn list_orders_by_most_recently_updated_first() {
        let store = InMemoryJobStore::new();
        let mut older = JobState::new(&["WI".to_string()], &[LayerType::County], JobOptions::default());
        older.updated_at = chrono::Utc::now() - chrono::Duration::hours(1);
        let newer = JobState::new(&["MI".to_string()], &[LayerType::County], JobOptions::default());
        store.save(&older).await.unwrap();
        store.save(&newer).await.unwrap();
        let jobs = store.list(10).await.unwrap();
        assert_eq!(jobs[0].id, newer.id);
    }
}
