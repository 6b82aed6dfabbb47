//! Streaming ingestion core
//!
//! Reader → grouper → transformer → validator → persister, driven by the
//! orchestrator and tracked through the jobs table:
//!
//! - [`source`]: chunked line streaming over local files and object storage
//! - [`batch`]: fixed-size grouping with line-number tracking
//! - [`transform`]: normalization of raw record shapes into one canonical form
//! - [`validate`]: business-rule checks per record
//! - [`persist`]: bulk upsert/insert with per-row fallback
//! - [`jobs`]: idempotent job state tracking
//! - [`pipeline`]: sequential batch processing for one file
//! - [`orchestrator`]: idempotent runs, background dispatch, multi-file driving

pub mod batch;
pub mod error;
pub mod jobs;
pub mod orchestrator;
pub mod persist;
pub mod pipeline;
pub mod source;
pub mod store;
pub mod transform;
pub mod validate;

pub use error::{IngestError, IngestResult};
pub use jobs::{
    derive_job_id, CreateJobParams, JobFilter, JobStatus, JobStatusPatch, JobStore,
    MemoryJobStore, PgJobStore, ProcessingJob,
};
pub use orchestrator::{
    FileIngestOutcome, IngestOrchestrator, IngestRequest, IngestStats, IngestStatus, StartOutcome,
};
pub use persist::{BatchPersister, BatchStats};
pub use pipeline::{BatchProgress, FilePipeline, PipelineConfig, PipelineOutcome};
pub use store::{MemoryReviewStore, PgReviewStore, ReviewStore};
pub use transform::{HotelReview, RawRecord};
pub use validate::{ReviewValidator, ValidationOutcome};
