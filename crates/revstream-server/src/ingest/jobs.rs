//! Processing-job state tracking
//!
//! One row per deterministic job id makes ingestion idempotent: reprocessing
//! the same file and platform resolves to the same job, whose status decides
//! whether the run is skipped, rejected, or retried. The [`JobStore`] trait
//! is the only writer of job state; [`PgJobStore`] is the production
//! implementation and [`MemoryJobStore`] backs tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, QueryBuilder};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

use revstream_common::types::Platform;

use super::error::{IngestError, IngestResult};

/// Derive the deterministic job id for a file + platform pair
///
/// Reprocessing the same pair always resolves to the same job.
pub fn derive_job_id(filepath: &str, platform: Platform) -> String {
    let digest = md5::compute(format!("{}-{}", filepath, platform));
    format!("job-{:x}", digest)
}

/// Lifecycle status of a processing job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// True once the job reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl From<String> for JobStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "processing" => JobStatus::Processing,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Processing job (maps to the processing_jobs table)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessingJob {
    pub job_id: String,
    pub filepath: String,
    pub platform: String,
    pub storage_provider: String,
    pub status: String,
    pub total_records: i64,
    pub valid_records: i64,
    pub invalid_records: i64,
    pub processing_time_ms: i64,
    pub errors: serde_json::Value,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingJob {
    pub fn status(&self) -> JobStatus {
        JobStatus::from(self.status.clone())
    }
}

/// Parameters for creating a new job
#[derive(Debug, Clone)]
pub struct CreateJobParams {
    pub job_id: String,
    pub filepath: String,
    pub platform: String,
    pub storage_provider: String,
}

/// Partial update applied when transitioning a job
///
/// Counters and errors are only meaningful for terminal transitions; the
/// store stamps `started_at`/`completed_at` from the status alone.
#[derive(Debug, Clone, Default)]
pub struct JobStatusPatch {
    pub total_records: Option<i64>,
    pub valid_records: Option<i64>,
    pub invalid_records: Option<i64>,
    pub processing_time_ms: Option<i64>,
    pub errors: Option<Vec<String>>,
}

/// Filter for listing jobs
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobFilter {
    pub status: Option<String>,
    pub platform: Option<String>,
}

/// Persists and transitions processing jobs
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a new job with status `pending`
    async fn create_job(&self, params: CreateJobParams) -> IngestResult<ProcessingJob>;

    /// Fetch a job by its deterministic id
    async fn get_job(&self, job_id: &str) -> IngestResult<Option<ProcessingJob>>;

    /// Atomically claim a job for processing
    ///
    /// The conditional update closes the check-then-act window between two
    /// concurrent start attempts: only one of them observes an affected row.
    /// Fails with [`IngestError::JobConflict`] when the job is already
    /// processing.
    async fn try_claim(&self, job_id: &str) -> IngestResult<()>;

    /// Transition a job, stamping timestamps from the target status
    ///
    /// `processing` stamps `started_at`; `completed`/`failed` stamp
    /// `completed_at` and write the final counters and error list when
    /// provided.
    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        patch: JobStatusPatch,
    ) -> IngestResult<Option<ProcessingJob>>;

    /// List jobs, newest first, with optional status/platform filters
    async fn list_jobs(
        &self,
        filter: &JobFilter,
        limit: i64,
        offset: i64,
    ) -> IngestResult<Vec<ProcessingJob>>;
}

const JOB_COLUMNS: &str = "job_id, filepath, platform, storage_provider, status, \
                           total_records, valid_records, invalid_records, processing_time_ms, \
                           errors, started_at, completed_at, created_at, updated_at";

/// PostgreSQL-backed job store
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, params: CreateJobParams) -> IngestResult<ProcessingJob> {
        let job = sqlx::query_as::<_, ProcessingJob>(&format!(
            r#"
            INSERT INTO processing_jobs
                (job_id, filepath, platform, storage_provider, status,
                 total_records, valid_records, invalid_records, processing_time_ms,
                 errors, created_at, updated_at)
            VALUES ($1, $2, $3, $4, 'pending', 0, 0, 0, 0, '[]'::jsonb, NOW(), NOW())
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(&params.job_id)
        .bind(&params.filepath)
        .bind(&params.platform)
        .bind(&params.storage_provider)
        .fetch_one(&self.pool)
        .await?;

        info!(job_id = %job.job_id, filepath = %job.filepath, "Processing job created");
        Ok(job)
    }

    async fn get_job(&self, job_id: &str) -> IngestResult<Option<ProcessingJob>> {
        let job = sqlx::query_as::<_, ProcessingJob>(&format!(
            "SELECT {JOB_COLUMNS} FROM processing_jobs WHERE job_id = $1"
        ))
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(job)
    }

    async fn try_claim(&self, job_id: &str) -> IngestResult<()> {
        let claimed = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE processing_jobs
            SET status = 'processing', started_at = NOW(), updated_at = NOW()
            WHERE job_id = $1 AND status <> 'processing'
            RETURNING job_id
            "#,
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await?;

        match claimed {
            Some(_) => {
                info!(job_id = %job_id, "Job claimed for processing");
                Ok(())
            }
            None => Err(IngestError::JobConflict(format!(
                "Job '{}' is currently being processed",
                job_id
            ))),
        }
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        patch: JobStatusPatch,
    ) -> IngestResult<Option<ProcessingJob>> {
        let errors_json = patch.errors.map(|errors| serde_json::json!(errors));

        let job = sqlx::query_as::<_, ProcessingJob>(&format!(
            r#"
            UPDATE processing_jobs
            SET status = $2,
                updated_at = NOW(),
                started_at = CASE WHEN $2 = 'processing' THEN NOW() ELSE started_at END,
                completed_at = CASE WHEN $2 IN ('completed', 'failed') THEN NOW() ELSE completed_at END,
                total_records = COALESCE($3, total_records),
                valid_records = COALESCE($4, valid_records),
                invalid_records = COALESCE($5, invalid_records),
                processing_time_ms = COALESCE($6, processing_time_ms),
                errors = COALESCE($7, errors)
            WHERE job_id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(job_id)
        .bind(status.as_str())
        .bind(patch.total_records)
        .bind(patch.valid_records)
        .bind(patch.invalid_records)
        .bind(patch.processing_time_ms)
        .bind(errors_json)
        .fetch_optional(&self.pool)
        .await?;

        if job.is_some() {
            info!(job_id = %job_id, status = %status, "Processing job status updated");
        }
        Ok(job)
    }

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        limit: i64,
        offset: i64,
    ) -> IngestResult<Vec<ProcessingJob>> {
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {JOB_COLUMNS} FROM processing_jobs WHERE TRUE"
        ));

        if let Some(status) = &filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(platform) = &filter.platform {
            builder.push(" AND platform = ").push_bind(platform);
        }

        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit.clamp(1, 100))
            .push(" OFFSET ")
            .push_bind(offset.max(0));

        let jobs = builder
            .build_query_as::<ProcessingJob>()
            .fetch_all(&self.pool)
            .await?;

        Ok(jobs)
    }
}

/// In-memory job store with the same transition semantics as Postgres
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<String, ProcessingJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> IngestResult<std::sync::MutexGuard<'_, HashMap<String, ProcessingJob>>> {
        self.jobs
            .lock()
            .map_err(|_| IngestError::Orchestration("job store poisoned".to_string()))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, params: CreateJobParams) -> IngestResult<ProcessingJob> {
        let now = Utc::now();
        let job = ProcessingJob {
            job_id: params.job_id.clone(),
            filepath: params.filepath,
            platform: params.platform,
            storage_provider: params.storage_provider,
            status: JobStatus::Pending.as_str().to_string(),
            total_records: 0,
            valid_records: 0,
            invalid_records: 0,
            processing_time_ms: 0,
            errors: serde_json::json!([]),
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut jobs = self.lock()?;
        if jobs.contains_key(&params.job_id) {
            return Err(IngestError::Orchestration(format!(
                "Job '{}' already exists",
                params.job_id
            )));
        }
        jobs.insert(params.job_id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: &str) -> IngestResult<Option<ProcessingJob>> {
        Ok(self.lock()?.get(job_id).cloned())
    }

    async fn try_claim(&self, job_id: &str) -> IngestResult<()> {
        let mut jobs = self.lock()?;
        let job = jobs.get_mut(job_id).ok_or_else(|| {
            IngestError::Orchestration(format!("Job '{}' not found", job_id))
        })?;

        if job.status() == JobStatus::Processing {
            return Err(IngestError::JobConflict(format!(
                "Job '{}' is currently being processed",
                job_id
            )));
        }

        job.status = JobStatus::Processing.as_str().to_string();
        job.started_at = Some(Utc::now());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
        patch: JobStatusPatch,
    ) -> IngestResult<Option<ProcessingJob>> {
        let mut jobs = self.lock()?;
        let Some(job) = jobs.get_mut(job_id) else {
            return Ok(None);
        };

        let now = Utc::now();
        job.status = status.as_str().to_string();
        job.updated_at = now;
        match status {
            JobStatus::Processing => job.started_at = Some(now),
            JobStatus::Completed | JobStatus::Failed => job.completed_at = Some(now),
            JobStatus::Pending => {},
        }
        if let Some(total) = patch.total_records {
            job.total_records = total;
        }
        if let Some(valid) = patch.valid_records {
            job.valid_records = valid;
        }
        if let Some(invalid) = patch.invalid_records {
            job.invalid_records = invalid;
        }
        if let Some(elapsed) = patch.processing_time_ms {
            job.processing_time_ms = elapsed;
        }
        if let Some(errors) = patch.errors {
            job.errors = serde_json::json!(errors);
        }

        Ok(Some(job.clone()))
    }

    async fn list_jobs(
        &self,
        filter: &JobFilter,
        limit: i64,
        offset: i64,
    ) -> IngestResult<Vec<ProcessingJob>> {
        let jobs = self.lock()?;
        let mut matching: Vec<ProcessingJob> = jobs
            .values()
            .filter(|job| {
                filter.status.as_deref().map_or(true, |s| job.status == s)
                    && filter.platform.as_deref().map_or(true, |p| job.platform == p)
            })
            .cloned()
            .collect();

        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.clamp(1, 100) as usize)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_is_deterministic() {
        let a = derive_job_id("/data/reviews/agoda_com-batch7.jl", Platform::Agoda);
        let b = derive_job_id("/data/reviews/agoda_com-batch7.jl", Platform::Agoda);
        assert_eq!(a, b);
        assert!(a.starts_with("job-"));
        // md5 hex digest after the prefix
        assert_eq!(a.len(), "job-".len() + 32);
    }

    #[test]
    fn test_job_id_varies_with_inputs() {
        let base = derive_job_id("/data/reviews/a.jl", Platform::Agoda);
        assert_ne!(base, derive_job_id("/data/reviews/b.jl", Platform::Agoda));
        assert_ne!(base, derive_job_id("/data/reviews/a.jl", Platform::Booking));
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from(status.as_str().to_string()), status);
        }
        // Unknown statuses degrade to pending
        assert_eq!(JobStatus::from("archived".to_string()), JobStatus::Pending);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    fn params(job_id: &str) -> CreateJobParams {
        CreateJobParams {
            job_id: job_id.to_string(),
            filepath: "/data/reviews/a.jl".to_string(),
            platform: "agoda".to_string(),
            storage_provider: "local".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryJobStore::new();
        let job = store.create_job(params("job-1")).await.unwrap();
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(job.started_at.is_none());

        store.try_claim("job-1").await.unwrap();
        let claimed = store.get_job("job-1").await.unwrap().unwrap();
        assert_eq!(claimed.status(), JobStatus::Processing);
        assert!(claimed.started_at.is_some());

        let patch = JobStatusPatch {
            total_records: Some(10),
            valid_records: Some(9),
            invalid_records: Some(1),
            processing_time_ms: Some(12),
            errors: None,
        };
        let done = store
            .update_status("job-1", JobStatus::Completed, patch)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.status(), JobStatus::Completed);
        assert!(done.completed_at.is_some());
        assert_eq!(done.valid_records + done.invalid_records, done.total_records);
    }

    #[tokio::test]
    async fn test_memory_store_claim_is_exclusive() {
        let store = MemoryJobStore::new();
        store.create_job(params("job-1")).await.unwrap();

        store.try_claim("job-1").await.unwrap();
        let err = store.try_claim("job-1").await.unwrap_err();
        assert!(matches!(err, IngestError::JobConflict(_)));

        // Failed jobs can be reclaimed
        store
            .update_status("job-1", JobStatus::Failed, JobStatusPatch::default())
            .await
            .unwrap();
        store.try_claim("job-1").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_store_list_filters() {
        let store = MemoryJobStore::new();
        for (id, platform) in [("job-1", "agoda"), ("job-2", "booking"), ("job-3", "agoda")] {
            let mut p = params(id);
            p.platform = platform.to_string();
            store.create_job(p).await.unwrap();
        }
        store.try_claim("job-2").await.unwrap();

        let filter = JobFilter {
            platform: Some("agoda".to_string()),
            status: None,
        };
        assert_eq!(store.list_jobs(&filter, 10, 0).await.unwrap().len(), 2);

        let filter = JobFilter {
            status: Some("processing".to_string()),
            platform: None,
        };
        let processing = store.list_jobs(&filter, 10, 0).await.unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].job_id, "job-2");
    }
}
