//! Batch Orchestrator: durable job/task state, a bounded worker pool with
//! retries and resumability, and progress streaming.

pub mod engine;
pub mod extractor;
pub mod job;
pub mod store;

pub use engine::{
    ExtractError, ExtractOutcome, Extractor, OrchestrationError, Orchestrator, ProgressEvent, ProgressStatus, ValidationReport,
    ValidationReportRow, ValidationReportSummary,
};
pub use extractor::{ExtractorConfig, HttpExtractor};
pub use job::{JobOptions, JobState, JobStatus, TaskRecord, TaskStatus};
pub use store::{FileJobStore, InMemoryJobStore, JobStore, JobStoreError};
