//! HTTP surface
//!
//! Thin wiring over the ingestion core's entry points: start an ingestion,
//! poll a job, list jobs, health probe. Request and response schemas beyond
//! these are out of scope.

pub mod routes;

pub use routes::{router, AppState};
