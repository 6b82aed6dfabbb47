//! Idempotent ingestion orchestration
//!
//! Composes the job tracker, source readers and pipeline into one
//! idempotent run per file. The job row is authoritative: pipeline failures
//! are recorded there and never escape to the caller.

use sqlx::PgPool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use revstream_common::types::{Platform, StorageProvider};

use super::error::{IngestError, IngestResult};
use super::jobs::{
    derive_job_id, CreateJobParams, JobStatus, JobStatusPatch, JobStore, PgJobStore, ProcessingJob,
};
use super::persist::BatchPersister;
use super::pipeline::{FilePipeline, PipelineConfig, PipelineOutcome};
use super::source::{LocalSource, S3Source, SourceReader};
use super::store::ReviewStore;
use crate::config::IngestConfig;
use crate::storage::Storage;

/// One file to ingest
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub filepath: String,
    pub platform: Platform,
    pub storage_provider: StorageProvider,
    /// When false, the file is counted and validated but nothing is written
    pub store_to_database: bool,
}

/// Final disposition of a file-ingestion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Completed,
    AlreadyProcessed,
    Failed,
}

/// Aggregate counters reported for a run
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct IngestStats {
    pub total_records: u64,
    pub valid_records: u64,
    pub invalid_records: u64,
    pub processing_time_ms: u64,
    pub hotels_inserted: u64,
    pub reviews_inserted: u64,
}

/// Result of one file-ingestion attempt
#[derive(Debug, Clone, serde::Serialize)]
pub struct FileIngestOutcome {
    pub job_id: String,
    pub status: IngestStatus,
    pub stats: Option<IngestStats>,
    pub error: Option<String>,
}

/// Result of dispatching a background ingestion
pub enum StartOutcome {
    /// Pipeline is running; the handle is the observable completion signal
    Started {
        job_id: String,
        handle: JoinHandle<FileIngestOutcome>,
    },
    /// Preflight short-circuited: already processed, conflicting, or failed
    /// during setup
    Skipped(FileIngestOutcome),
}

impl StartOutcome {
    pub fn job_id(&self) -> &str {
        match self {
            StartOutcome::Started { job_id, .. } => job_id,
            StartOutcome::Skipped(outcome) => &outcome.job_id,
        }
    }
}

enum Preflight {
    Run,
    Short(FileIngestOutcome),
}

/// Drives idempotent ingestion runs
#[derive(Clone)]
pub struct IngestOrchestrator {
    jobs: Arc<dyn JobStore>,
    store: Arc<dyn ReviewStore>,
    local: Arc<dyn SourceReader>,
    s3: Option<Arc<dyn SourceReader>>,
    config: IngestConfig,
    cancel: CancellationToken,
}

impl IngestOrchestrator {
    pub fn new(
        pool: PgPool,
        store: Arc<dyn ReviewStore>,
        s3_storage: Option<Storage>,
        config: IngestConfig,
    ) -> Self {
        Self::with_stores(Arc::new(PgJobStore::new(pool)), store, s3_storage, config)
    }

    /// Build against explicit store implementations (used by tests)
    pub fn with_stores(
        jobs: Arc<dyn JobStore>,
        store: Arc<dyn ReviewStore>,
        s3_storage: Option<Storage>,
        config: IngestConfig,
    ) -> Self {
        let local: Arc<dyn SourceReader> = Arc::new(LocalSource::new(config.buffer_size));
        let s3 = s3_storage.map(|storage| {
            Arc::new(S3Source::new(storage, config.buffer_size)) as Arc<dyn SourceReader>
        });

        Self {
            jobs,
            store,
            local,
            s3,
            config,
            cancel: CancellationToken::new(),
        }
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    /// Token cancelling all in-flight pipelines at their next batch boundary
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process one file synchronously, end to end
    ///
    /// Never returns an error: failures are recorded on the job and
    /// reported in the outcome.
    pub async fn process_file(&self, request: &IngestRequest) -> FileIngestOutcome {
        let job_id = derive_job_id(&request.filepath, request.platform);

        match self.preflight(&job_id, request).await {
            Preflight::Short(outcome) => outcome,
            Preflight::Run => self.execute_claimed(job_id, request.clone()).await,
        }
    }

    /// Start processing and return immediately
    ///
    /// After the job is claimed, the pipeline runs on a spawned task. The
    /// returned handle resolves to the final outcome; the task also records
    /// it on the job row, so dropping the handle loses nothing.
    pub async fn start_file_processing(&self, request: IngestRequest) -> StartOutcome {
        let job_id = derive_job_id(&request.filepath, request.platform);

        match self.preflight(&job_id, &request).await {
            Preflight::Short(outcome) => StartOutcome::Skipped(outcome),
            Preflight::Run => {
                let orchestrator = self.clone();
                let task_job_id = job_id.clone();

                let handle = tokio::spawn(async move {
                    let outcome = orchestrator.execute_claimed(task_job_id, request).await;
                    match outcome.status {
                        IngestStatus::Failed => {
                            error!(
                                job_id = %outcome.job_id,
                                error = ?outcome.error,
                                "Background ingestion failed"
                            );
                        }
                        _ => {
                            info!(job_id = %outcome.job_id, status = ?outcome.status, "Background ingestion finished");
                        }
                    }
                    outcome
                });

                StartOutcome::Started { job_id, handle }
            }
        }
    }

    /// Process several files sequentially; one failure never stops the rest
    pub async fn process_files(&self, requests: &[IngestRequest]) -> Vec<FileIngestOutcome> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.process_file(request).await);
        }
        results
    }

    /// Idempotency gate: decide whether this attempt should run, and claim
    /// the job if so.
    async fn preflight(&self, job_id: &str, request: &IngestRequest) -> Preflight {
        if request.filepath.trim().is_empty() {
            return Preflight::Short(
                self.fail_job(job_id, "Filepath is required".to_string()).await,
            );
        }

        let existing = match self.jobs.get_job(job_id).await {
            Ok(job) => job,
            Err(e) => {
                return Preflight::Short(self.fail_job(job_id, e.to_string()).await);
            }
        };

        match existing {
            Some(job) if job.status() == JobStatus::Completed => {
                info!(job_id = %job_id, filepath = %request.filepath, "File already processed, skipping");
                return Preflight::Short(FileIngestOutcome {
                    job_id: job_id.to_string(),
                    status: IngestStatus::AlreadyProcessed,
                    stats: Some(stats_from_job(&job)),
                    error: None,
                });
            }
            Some(job) if job.status() == JobStatus::Processing => {
                warn!(job_id = %job_id, filepath = %request.filepath, "File is currently being processed, rejecting");
                return Preflight::Short(FileIngestOutcome {
                    job_id: job_id.to_string(),
                    status: IngestStatus::Failed,
                    stats: None,
                    error: Some("File is currently being processed".to_string()),
                });
            }
            Some(job) if job.status() == JobStatus::Failed => {
                info!(job_id = %job_id, filepath = %request.filepath, "Retrying previously failed job");
            }
            Some(_) => {},
            None => {
                let params = CreateJobParams {
                    job_id: job_id.to_string(),
                    filepath: request.filepath.clone(),
                    platform: request.platform.to_string(),
                    storage_provider: request.storage_provider.to_string(),
                };
                if let Err(e) = self.jobs.create_job(params).await {
                    return Preflight::Short(self.fail_job(job_id, e.to_string()).await);
                }
            }
        }

        // Atomic claim: exactly one concurrent attempt wins this update
        if let Err(e) = self.jobs.try_claim(job_id).await {
            return Preflight::Short(FileIngestOutcome {
                job_id: job_id.to_string(),
                status: IngestStatus::Failed,
                stats: None,
                error: Some(e.to_string()),
            });
        }

        Preflight::Run
    }

    /// Run the pipeline for a job already claimed as processing and record
    /// the terminal state.
    async fn execute_claimed(&self, job_id: String, request: IngestRequest) -> FileIngestOutcome {
        match self.run_pipeline(&job_id, &request).await {
            Ok(outcome) if outcome.errors.is_empty() => {
                let stats = stats_from_outcome(&outcome);
                let patch = patch_from_outcome(&outcome, None);

                if let Err(e) = self
                    .jobs
                    .update_status(&job_id, JobStatus::Completed, patch)
                    .await
                {
                    error!(job_id = %job_id, error = %e, "Failed to record job completion");
                }

                info!(
                    job_id = %job_id,
                    filepath = %request.filepath,
                    total_records = stats.total_records,
                    valid_records = stats.valid_records,
                    invalid_records = stats.invalid_records,
                    "File processing completed"
                );

                FileIngestOutcome {
                    job_id,
                    status: IngestStatus::Completed,
                    stats: Some(stats),
                    error: None,
                }
            }
            Ok(outcome) => {
                // Batch-level failures were absorbed but the run is not clean
                let message = outcome.errors.join(", ");
                let patch = patch_from_outcome(&outcome, Some(outcome.errors.clone()));

                if let Err(e) = self
                    .jobs
                    .update_status(&job_id, JobStatus::Failed, patch)
                    .await
                {
                    error!(job_id = %job_id, error = %e, "Failed to record job failure");
                }

                FileIngestOutcome {
                    job_id,
                    status: IngestStatus::Failed,
                    stats: Some(stats_from_outcome(&outcome)),
                    error: Some(message),
                }
            }
            Err(e) => self.fail_job(&job_id, e.to_string()).await,
        }
    }

    async fn run_pipeline(
        &self,
        job_id: &str,
        request: &IngestRequest,
    ) -> IngestResult<PipelineOutcome> {
        let reader = self.reader_for(request.storage_provider)?;

        reader.validate(&request.filepath).await?;
        let stat = reader.stat(&request.filepath).await?;
        let stream = reader.open(&request.filepath).await?;

        let mut pipeline = FilePipeline::new(PipelineConfig {
            batch_size: self.config.batch_size,
            batch_timeout_secs: self.config.batch_timeout_secs,
        })
        .with_cancellation(self.cancel.child_token());

        // Streaming mode: persist each batch as it is produced
        if request.store_to_database {
            pipeline = pipeline.with_persister(BatchPersister::new(self.store.clone()));
        }

        pipeline.run(stream, job_id, Some(stat.size)).await
    }

    fn reader_for(&self, provider: StorageProvider) -> IngestResult<&Arc<dyn SourceReader>> {
        match provider {
            StorageProvider::Local => Ok(&self.local),
            StorageProvider::S3 => self.s3.as_ref().ok_or_else(|| {
                IngestError::Orchestration(
                    "S3 storage provider requested but no storage is configured".to_string(),
                )
            }),
        }
    }

    /// Record a failure on the job (best effort) and build the outcome
    async fn fail_job(&self, job_id: &str, message: String) -> FileIngestOutcome {
        error!(job_id = %job_id, error = %message, "File processing failed");

        let patch = JobStatusPatch {
            errors: Some(vec![message.clone()]),
            ..Default::default()
        };
        if let Err(e) = self
            .jobs
            .update_status(job_id, JobStatus::Failed, patch)
            .await
        {
            error!(job_id = %job_id, error = %e, "Failed to record job failure");
        }

        FileIngestOutcome {
            job_id: job_id.to_string(),
            status: IngestStatus::Failed,
            stats: None,
            error: Some(message),
        }
    }
}

fn stats_from_outcome(outcome: &PipelineOutcome) -> IngestStats {
    IngestStats {
        total_records: outcome.total_records,
        valid_records: outcome.valid_records,
        invalid_records: outcome.invalid_records,
        processing_time_ms: outcome.processing_time_ms,
        hotels_inserted: outcome.hotels_inserted,
        reviews_inserted: outcome.reviews_inserted,
    }
}

fn stats_from_job(job: &ProcessingJob) -> IngestStats {
    IngestStats {
        total_records: job.total_records.max(0) as u64,
        valid_records: job.valid_records.max(0) as u64,
        invalid_records: job.invalid_records.max(0) as u64,
        processing_time_ms: job.processing_time_ms.max(0) as u64,
        // Not stored on the job row
        hotels_inserted: 0,
        reviews_inserted: 0,
    }
}

fn patch_from_outcome(outcome: &PipelineOutcome, errors: Option<Vec<String>>) -> JobStatusPatch {
    JobStatusPatch {
        total_records: Some(outcome.total_records as i64),
        valid_records: Some(outcome.valid_records as i64),
        invalid_records: Some(outcome.invalid_records as i64),
        processing_time_ms: Some(outcome.processing_time_ms as i64),
        errors,
    }
}
