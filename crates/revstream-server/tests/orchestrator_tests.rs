//! Orchestrator idempotency tests
//!
//! Exercises the job lifecycle end to end against the in-memory job and
//! review stores: skip-on-completed, reject-on-processing, retry-after-
//! failure, background dispatch and multi-file runs.

use std::io::Write;
use std::sync::Arc;

use revstream_common::types::{Platform, StorageProvider};
use revstream_server::config::IngestConfig;
use revstream_server::ingest::{
    derive_job_id, CreateJobParams, IngestOrchestrator, IngestRequest, IngestStatus, JobStatus,
    JobStatusPatch, JobStore, MemoryJobStore, MemoryReviewStore, StartOutcome,
};

struct Harness {
    jobs: Arc<MemoryJobStore>,
    reviews: Arc<MemoryReviewStore>,
    orchestrator: IngestOrchestrator,
}

fn harness() -> Harness {
    let jobs = Arc::new(MemoryJobStore::new());
    let reviews = Arc::new(MemoryReviewStore::new());
    let orchestrator = IngestOrchestrator::with_stores(
        jobs.clone(),
        reviews.clone(),
        None,
        IngestConfig::default(),
    );
    Harness {
        jobs,
        reviews,
        orchestrator,
    }
}

fn flat_line(hotel_id: i64, review_id: i64, rating: f64) -> String {
    format!(
        r#"{{"hotelId":{},"platform":"agoda","hotelName":"Hotel {}","hotelReviewId":{},"rating":{}}}"#,
        hotel_id, hotel_id, review_id, rating
    )
}

fn review_file(lines: &[String]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    for line in lines {
        writeln!(file, "{}", line).expect("write line");
    }
    file.flush().expect("flush");
    file
}

fn request(filepath: &str, store_to_database: bool) -> IngestRequest {
    IngestRequest {
        filepath: filepath.to_string(),
        platform: Platform::Agoda,
        storage_provider: StorageProvider::Local,
        store_to_database,
    }
}

#[tokio::test]
async fn fresh_file_completes_with_consistent_counters() {
    let h = harness();
    let lines: Vec<String> = (1..=7).map(|i| flat_line(i, 100 + i, 8.0)).collect();
    let file = review_file(&lines);
    let path = file.path().to_str().expect("utf8 path");

    let outcome = h.orchestrator.process_file(&request(path, true)).await;

    assert_eq!(outcome.status, IngestStatus::Completed);
    let stats = outcome.stats.expect("stats");
    assert_eq!(stats.total_records, 7);
    assert_eq!(stats.valid_records + stats.invalid_records, stats.total_records);
    assert_eq!(h.reviews.review_count(), 7);

    let job = h
        .jobs
        .get_job(&outcome.job_id)
        .await
        .expect("get job")
        .expect("job exists");
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.total_records, 7);
    assert_eq!(job.valid_records + job.invalid_records, job.total_records);
    assert!(job.started_at.is_some());
    assert!(job.completed_at.is_some());
}

#[tokio::test]
async fn completed_job_is_skipped_without_reading_the_file() {
    let h = harness();

    // A filepath that does not exist on disk: if the orchestrator tried to
    // read it, the run would fail rather than report the stored stats.
    let filepath = "/data/reviews/already-done.jl";
    let job_id = derive_job_id(filepath, Platform::Agoda);

    h.jobs
        .create_job(CreateJobParams {
            job_id: job_id.clone(),
            filepath: filepath.to_string(),
            platform: "agoda".to_string(),
            storage_provider: "local".to_string(),
        })
        .await
        .expect("create");
    h.jobs
        .update_status(
            &job_id,
            JobStatus::Completed,
            JobStatusPatch {
                total_records: Some(1000),
                valid_records: Some(990),
                invalid_records: Some(10),
                processing_time_ms: Some(1234),
                errors: None,
            },
        )
        .await
        .expect("update");

    let outcome = h.orchestrator.process_file(&request(filepath, true)).await;

    assert_eq!(outcome.job_id, job_id);
    assert_eq!(outcome.status, IngestStatus::AlreadyProcessed);
    let stats = outcome.stats.expect("stored stats");
    assert_eq!(stats.total_records, 1000);
    assert_eq!(stats.valid_records, 990);
    assert_eq!(stats.invalid_records, 10);
    assert_eq!(h.reviews.review_count(), 0);
}

#[tokio::test]
async fn processing_job_is_rejected_with_conflict() {
    let h = harness();
    let filepath = "/data/reviews/in-flight.jl";
    let job_id = derive_job_id(filepath, Platform::Agoda);

    h.jobs
        .create_job(CreateJobParams {
            job_id: job_id.clone(),
            filepath: filepath.to_string(),
            platform: "agoda".to_string(),
            storage_provider: "local".to_string(),
        })
        .await
        .expect("create");
    h.jobs.try_claim(&job_id).await.expect("claim");

    let outcome = h.orchestrator.process_file(&request(filepath, true)).await;

    assert_eq!(outcome.status, IngestStatus::Failed);
    assert!(outcome
        .error
        .expect("conflict error")
        .contains("currently being processed"));

    // The in-flight job keeps its status
    let job = h.jobs.get_job(&job_id).await.expect("get").expect("job");
    assert_eq!(job.status(), JobStatus::Processing);
}

#[tokio::test]
async fn failed_job_is_retried_and_completes() {
    let h = harness();
    let lines: Vec<String> = (1..=3).map(|i| flat_line(i, 200 + i, 7.5)).collect();
    let file = review_file(&lines);
    let path = file.path().to_str().expect("utf8 path");
    let job_id = derive_job_id(path, Platform::Agoda);

    h.jobs
        .create_job(CreateJobParams {
            job_id: job_id.clone(),
            filepath: path.to_string(),
            platform: "agoda".to_string(),
            storage_provider: "local".to_string(),
        })
        .await
        .expect("create");
    h.jobs
        .update_status(
            &job_id,
            JobStatus::Failed,
            JobStatusPatch {
                errors: Some(vec!["Source access error: transient".to_string()]),
                ..Default::default()
            },
        )
        .await
        .expect("update");

    let outcome = h.orchestrator.process_file(&request(path, true)).await;

    assert_eq!(outcome.status, IngestStatus::Completed);
    let job = h.jobs.get_job(&job_id).await.expect("get").expect("job");
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.total_records, 3);
}

#[tokio::test]
async fn missing_file_fails_the_job_not_the_caller() {
    let h = harness();

    let outcome = h
        .orchestrator
        .process_file(&request("/no/such/reviews.jl", true))
        .await;

    assert_eq!(outcome.status, IngestStatus::Failed);
    let message = outcome.error.expect("error message");
    assert!(message.contains("/no/such/reviews.jl"));

    let job = h
        .jobs
        .get_job(&outcome.job_id)
        .await
        .expect("get")
        .expect("job recorded");
    assert_eq!(job.status(), JobStatus::Failed);
    assert!(job.errors.to_string().contains("/no/such/reviews.jl"));
}

#[tokio::test]
async fn empty_file_is_an_invalid_format_failure() {
    let h = harness();
    let file = tempfile::NamedTempFile::new().expect("temp file");
    let path = file.path().to_str().expect("utf8 path");

    let outcome = h.orchestrator.process_file(&request(path, true)).await;

    assert_eq!(outcome.status, IngestStatus::Failed);
    assert!(outcome.error.expect("error").contains("empty"));
}

#[tokio::test]
async fn background_start_returns_immediately_and_completes() {
    let h = harness();
    let lines: Vec<String> = (1..=12).map(|i| flat_line(i, 300 + i, 8.8)).collect();
    let file = review_file(&lines);
    let path = file.path().to_str().expect("utf8 path");

    let started = h
        .orchestrator
        .start_file_processing(request(path, true))
        .await;

    let StartOutcome::Started { job_id, handle } = started else {
        panic!("expected a started background run");
    };

    // The job is claimed before the call returns; the background task may
    // already have finished, but it can never still be pending.
    let job = h.jobs.get_job(&job_id).await.expect("get").expect("job");
    assert_ne!(job.status(), JobStatus::Pending);
    assert!(job.started_at.is_some());

    // The handle is the observable completion signal
    let outcome = handle.await.expect("task join");
    assert_eq!(outcome.status, IngestStatus::Completed);

    let job = h.jobs.get_job(&job_id).await.expect("get").expect("job");
    assert_eq!(job.status(), JobStatus::Completed);
    assert_eq!(job.total_records, 12);
    assert_eq!(h.reviews.review_count(), 12);
}

#[tokio::test]
async fn background_start_rejects_already_processing() {
    let h = harness();
    let filepath = "/data/reviews/busy.jl";
    let job_id = derive_job_id(filepath, Platform::Agoda);

    h.jobs
        .create_job(CreateJobParams {
            job_id: job_id.clone(),
            filepath: filepath.to_string(),
            platform: "agoda".to_string(),
            storage_provider: "local".to_string(),
        })
        .await
        .expect("create");
    h.jobs.try_claim(&job_id).await.expect("claim");

    let started = h
        .orchestrator
        .start_file_processing(request(filepath, true))
        .await;

    let StartOutcome::Skipped(outcome) = started else {
        panic!("expected a skipped start");
    };
    assert_eq!(outcome.status, IngestStatus::Failed);
}

#[tokio::test]
async fn multiple_files_run_sequentially_and_failures_do_not_stop_the_rest() {
    let h = harness();
    let good_a = review_file(&[flat_line(1, 401, 8.0)]);
    let good_b = review_file(&[flat_line(2, 402, 8.0)]);

    let requests = vec![
        request(good_a.path().to_str().expect("utf8 path"), true),
        request("/no/such/reviews.jl", true),
        request(good_b.path().to_str().expect("utf8 path"), true),
    ];

    let outcomes = h.orchestrator.process_files(&requests).await;

    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0].status, IngestStatus::Completed);
    assert_eq!(outcomes[1].status, IngestStatus::Failed);
    assert_eq!(outcomes[2].status, IngestStatus::Completed);
    assert_eq!(h.reviews.review_count(), 2);
}

#[tokio::test]
async fn overlapping_files_skip_duplicate_reviews() {
    let h = harness();

    // File A carries reviews 501-503, file B overlaps with 502-504
    let file_a = review_file(&(1..=3).map(|i| flat_line(i, 500 + i, 8.0)).collect::<Vec<_>>());
    let file_b = review_file(&(2..=4).map(|i| flat_line(i, 500 + i, 9.0)).collect::<Vec<_>>());

    let a = h
        .orchestrator
        .process_file(&request(file_a.path().to_str().expect("utf8 path"), true))
        .await;
    let b = h
        .orchestrator
        .process_file(&request(file_b.path().to_str().expect("utf8 path"), true))
        .await;

    assert_eq!(a.status, IngestStatus::Completed);
    assert_eq!(b.status, IngestStatus::Completed);

    let stats_b = b.stats.expect("stats");
    // All of file B counts valid; only the new review id lands
    assert_eq!(stats_b.valid_records, 3);
    assert_eq!(stats_b.reviews_inserted, 1);
    assert_eq!(h.reviews.review_count(), 4);

    // First write wins for the overlapping ids
    assert_eq!(h.reviews.review(502).expect("review").rating, 8.0);
}

#[tokio::test]
async fn same_inputs_resolve_to_the_same_job() {
    let h = harness();
    let lines = vec![flat_line(1, 601, 8.0)];
    let file = review_file(&lines);
    let path = file.path().to_str().expect("utf8 path");

    let first = h.orchestrator.process_file(&request(path, false)).await;
    let second = h.orchestrator.process_file(&request(path, false)).await;

    assert_eq!(first.job_id, second.job_id);
    assert_eq!(first.status, IngestStatus::Completed);
    assert_eq!(second.status, IngestStatus::AlreadyProcessed);
}
