//! Revstream Server Library
//!
//! Streaming ingestion service for line-delimited JSON hotel-review files.
//!
//! # Overview
//!
//! The server ingests review exports from multiple source platforms,
//! normalizes heterogeneous record shapes, validates business rules and
//! persists hotel/review projections into PostgreSQL with idempotent,
//! retry-safe semantics:
//!
//! - **Source Backends**: local filesystem and S3-compatible object storage
//!   behind one chunked streaming contract
//! - **Pipeline**: fixed-size batches, strictly sequential, persisted as
//!   they are produced so files larger than memory stream cleanly
//! - **Bulk Persistence**: set-based upsert/insert with per-row fallback
//! - **Job Tracking**: one deterministic job per file + platform makes every
//!   run idempotent and observable
//!
//! # Framework Stack
//!
//! - **Axum**: HTTP entry points (start ingestion, poll jobs)
//! - **SQLx**: PostgreSQL pool and queries
//! - **AWS SDK**: S3 object streaming
//! - **Tracing**: structured logging throughout
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use revstream_server::config::Config;
//! use revstream_server::ingest::{IngestOrchestrator, PgReviewStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let pool = sqlx::PgPool::connect(&config.database.url).await?;
//!     let store = Arc::new(PgReviewStore::new(pool.clone()));
//!     let _orchestrator = IngestOrchestrator::new(pool, store, None, config.ingest);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;
pub mod storage;

// Re-export commonly used types
pub use error::{AppError, AppResult};
