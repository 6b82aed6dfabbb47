//! Ingestion error taxonomy
//!
//! Only run-level failures are expressed as errors. Malformed lines and
//! business-rule violations are absorbed into the invalid-record counters by
//! the pipeline and never surface here.

use thiserror::Error;

/// Result type alias for ingestion operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Run-level ingestion failures
#[derive(Error, Debug)]
pub enum IngestError {
    /// Source file is missing or unreadable. Fatal for the run.
    #[error("Source access error: {0}")]
    SourceAccess(String),

    /// Source file exists but is not ingestible (empty, wrong suffix).
    /// Fatal for the run.
    #[error("Invalid source format: {0}")]
    InvalidFormat(String),

    /// Database failure that escaped the per-record fallback path
    #[error("Persistence error: {0}")]
    Database(#[from] sqlx::Error),

    /// Another run currently holds the same job id
    #[error("Job conflict: {0}")]
    JobConflict(String),

    /// A batch exceeded the configured persistence timeout
    #[error("Batch {batch_number} timed out after {timeout_secs}s")]
    BatchTimeout { batch_number: u64, timeout_secs: u64 },

    /// The run was cancelled at a batch boundary
    #[error("Ingestion cancelled")]
    Cancelled,

    /// Invalid run setup or any uncaught job-level failure
    #[error("Orchestration error: {0}")]
    Orchestration(String),
}

impl IngestError {
    /// True when the error indicates the source itself cannot be processed,
    /// before the pipeline ever ran.
    pub fn is_source_error(&self) -> bool {
        matches!(
            self,
            IngestError::SourceAccess(_) | IngestError::InvalidFormat(_)
        )
    }
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        IngestError::SourceAccess(err.to_string())
    }
}
