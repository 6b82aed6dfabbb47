//! Single-file ingestion pipeline
//!
//! Drives one line stream through grouping, normalization, validation and
//! (optionally) persistence. Batches are processed strictly sequentially:
//! persistence of batch N is awaited before batch N+1 is grouped, which
//! bounds memory and naturally backpressures reading against writing.
//!
//! Record-level problems (malformed JSON, rule violations) become counters.
//! Batch-level persistence failures are recorded and the run continues.
//! Only cancellation and source errors abort the run.

use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::batch::{Batch, BatchGrouper, DEFAULT_BATCH_SIZE};
use super::error::{IngestError, IngestResult};
use super::persist::{BatchPersister, BatchStats};
use super::source::LineStream;
use super::transform::decode_line;
use super::validate::ReviewValidator;

/// Log streaming progress for files larger than this (10 MiB)
const PROGRESS_LOG_THRESHOLD_BYTES: u64 = 10 * 1024 * 1024;

/// Pipeline tuning knobs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Lines per batch
    pub batch_size: usize,
    /// Upper bound on persisting a single batch
    pub batch_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            batch_timeout_secs: 30,
        }
    }
}

/// Completion event emitted after every batch
#[derive(Debug, Clone, Copy)]
pub struct BatchProgress {
    pub batch_number: u64,
    pub first_line: u64,
    pub valid: u64,
    pub invalid: u64,
    pub hotels_inserted: u64,
    pub reviews_inserted: u64,
}

/// Aggregated result of one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    pub total_records: u64,
    pub valid_records: u64,
    pub invalid_records: u64,
    pub processing_time_ms: u64,
    pub hotels_inserted: u64,
    pub reviews_inserted: u64,
    /// Batch-level failure messages; empty means a clean run
    pub errors: Vec<String>,
}

/// Composes the grouper, transformer, validator and persister for one file
pub struct FilePipeline {
    validator: ReviewValidator,
    persister: Option<BatchPersister>,
    config: PipelineConfig,
    cancel: CancellationToken,
    progress: Option<mpsc::UnboundedSender<BatchProgress>>,
}

impl FilePipeline {
    /// Stats-only pipeline; nothing is written anywhere
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            validator: ReviewValidator::new(),
            persister: None,
            config,
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Enable streaming persistence: each batch is written as soon as it is
    /// produced.
    pub fn with_persister(mut self, persister: BatchPersister) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Honor an external cancellation signal at batch boundaries
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Emit a [`BatchProgress`] event after every batch
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<BatchProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    /// Run the pipeline to end of stream
    pub async fn run(
        &self,
        mut stream: Box<dyn LineStream>,
        job_id: &str,
        file_size: Option<u64>,
    ) -> IngestResult<PipelineOutcome> {
        let started = Instant::now();
        let mut grouper = BatchGrouper::new(self.config.batch_size);
        let mut totals = RunTotals::default();
        let mut bytes_read: u64 = 0;

        while let Some(line) = stream.next_line().await? {
            bytes_read += line.len() as u64 + 1;

            if let Some(batch) = grouper.push(&line) {
                self.process_batch(&batch, job_id, &mut totals).await?;
                log_progress(job_id, file_size, bytes_read, grouper.lines_seen());
            }
        }

        if let Some(batch) = grouper.flush() {
            self.process_batch(&batch, job_id, &mut totals).await?;
        }

        let outcome = PipelineOutcome {
            total_records: grouper.total_records(),
            valid_records: totals.valid,
            invalid_records: totals.invalid,
            processing_time_ms: started.elapsed().as_millis() as u64,
            hotels_inserted: totals.hotels_inserted,
            reviews_inserted: totals.reviews_inserted,
            errors: totals.errors,
        };

        info!(
            job_id = %job_id,
            total_records = outcome.total_records,
            valid_records = outcome.valid_records,
            invalid_records = outcome.invalid_records,
            processing_time_ms = outcome.processing_time_ms,
            "Pipeline run completed"
        );

        Ok(outcome)
    }

    async fn process_batch(
        &self,
        batch: &Batch,
        job_id: &str,
        totals: &mut RunTotals,
    ) -> IngestResult<()> {
        if self.cancel.is_cancelled() {
            return Err(IngestError::Cancelled);
        }

        // Transform + validate
        let mut valid_reviews = Vec::with_capacity(batch.lines.len());
        let mut invalid: u64 = 0;

        for line in &batch.lines {
            match decode_line(&line.text) {
                Ok(review) => {
                    let outcome = self.validator.validate(&review);
                    if outcome.is_valid {
                        valid_reviews.push(review);
                    } else {
                        invalid += 1;
                        debug!(
                            job_id = %job_id,
                            line = line.line_number,
                            errors = ?outcome.errors,
                            "Record failed validation"
                        );
                    }
                }
                Err(e) => {
                    invalid += 1;
                    debug!(
                        job_id = %job_id,
                        line = line.line_number,
                        error = %e,
                        "Parse error"
                    );
                }
            }
        }

        let mut valid = valid_reviews.len() as u64;
        let mut batch_stats = BatchStats::default();

        // Persist, converting a batch-level failure into invalid counts
        if let Some(persister) = &self.persister {
            if !valid_reviews.is_empty() {
                let timeout = Duration::from_secs(self.config.batch_timeout_secs);
                match tokio::time::timeout(
                    timeout,
                    persister.persist_batch(&valid_reviews, job_id),
                )
                .await
                {
                    Ok(Ok(stats)) => batch_stats = stats,
                    Ok(Err(e)) => {
                        error!(
                            job_id = %job_id,
                            batch = batch.number,
                            error = %e,
                            "Batch persistence failed"
                        );
                        totals
                            .errors
                            .push(format!("Batch {} insertion failed: {}", batch.number, e));
                        invalid += valid;
                        valid = 0;
                    }
                    Err(_) => {
                        error!(
                            job_id = %job_id,
                            batch = batch.number,
                            timeout_secs = self.config.batch_timeout_secs,
                            "Batch persistence timed out"
                        );
                        totals.errors.push(
                            IngestError::BatchTimeout {
                                batch_number: batch.number,
                                timeout_secs: self.config.batch_timeout_secs,
                            }
                            .to_string(),
                        );
                        invalid += valid;
                        valid = 0;
                    }
                }
            }
        }

        totals.valid += valid;
        totals.invalid += invalid;
        totals.hotels_inserted += batch_stats.hotels_inserted;
        totals.reviews_inserted += batch_stats.reviews_inserted;

        if let Some(tx) = &self.progress {
            // Receiver may already be gone; progress is best-effort
            let _ = tx.send(BatchProgress {
                batch_number: batch.number,
                first_line: batch.first_line(),
                valid,
                invalid,
                hotels_inserted: batch_stats.hotels_inserted,
                reviews_inserted: batch_stats.reviews_inserted,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct RunTotals {
    valid: u64,
    invalid: u64,
    hotels_inserted: u64,
    reviews_inserted: u64,
    errors: Vec<String>,
}

fn log_progress(job_id: &str, file_size: Option<u64>, bytes_read: u64, lines_seen: u64) {
    let Some(size) = file_size else { return };
    if size < PROGRESS_LOG_THRESHOLD_BYTES {
        return;
    }
    let percent = ((bytes_read as f64 / size as f64) * 100.0).min(100.0).round();
    debug!(
        job_id = %job_id,
        percent = percent,
        bytes_read = bytes_read,
        file_size = size,
        lines_seen = lines_seen,
        "Streaming progress"
    );
}
