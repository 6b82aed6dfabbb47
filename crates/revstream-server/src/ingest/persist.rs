//! Bulk persistence of validated batches
//!
//! Each canonical record is split into at most one hotel projection and at
//! most one review projection, then written set-based: hotels as an upsert
//! (last write wins), reviews as an insert that skips duplicates (first
//! write wins, which is what makes re-ingesting overlapping files safe).
//! A failed bulk statement falls back to per-row writes so one poisoned row
//! cannot block the rest of the batch.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::IngestResult;
use super::store::{HotelRow, ReviewRow, ReviewStore};
use super::transform::HotelReview;

/// Per-batch persistence counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub valid_records: u64,
    pub invalid_records: u64,
    pub hotels_inserted: u64,
    pub reviews_inserted: u64,
}

impl BatchStats {
    pub fn merge(&mut self, other: &BatchStats) {
        self.valid_records += other.valid_records;
        self.invalid_records += other.invalid_records;
        self.hotels_inserted += other.hotels_inserted;
        self.reviews_inserted += other.reviews_inserted;
    }
}

/// Writes batches of canonical records through a [`ReviewStore`]
pub struct BatchPersister {
    store: Arc<dyn ReviewStore>,
}

impl BatchPersister {
    pub fn new(store: Arc<dyn ReviewStore>) -> Self {
        Self { store }
    }

    /// Persist one batch. Record-level problems are absorbed into the
    /// returned counters; rows that fail even the per-row fallback are
    /// logged and dropped.
    pub async fn persist_batch(
        &self,
        records: &[HotelReview],
        job_id: &str,
    ) -> IngestResult<BatchStats> {
        let mut stats = BatchStats::default();
        let mut hotel_batch = Vec::new();
        let mut review_batch = Vec::new();

        for record in records {
            if !is_storable(record) {
                stats.invalid_records += 1;
                continue;
            }
            stats.valid_records += 1;

            if let Some(hotel) = hotel_projection(record) {
                hotel_batch.push(hotel);
            }
            if let Some(review) = review_projection(record, job_id) {
                review_batch.push(review);
            }
        }

        if !hotel_batch.is_empty() {
            stats.hotels_inserted = match self.store.bulk_upsert_hotels(&hotel_batch).await {
                Ok(count) => count,
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Bulk hotel upsert failed, falling back to per-row upserts");
                    self.fallback_hotel_upserts(&hotel_batch, job_id).await
                }
            };
        }

        if !review_batch.is_empty() {
            stats.reviews_inserted = match self.store.bulk_insert_reviews(&review_batch).await {
                Ok(count) => count,
                Err(e) => {
                    warn!(job_id = %job_id, error = %e, "Bulk review insert failed, falling back to per-row inserts");
                    self.fallback_review_inserts(&review_batch, job_id).await
                }
            };
        }

        debug!(
            job_id = %job_id,
            valid = stats.valid_records,
            invalid = stats.invalid_records,
            hotels = stats.hotels_inserted,
            reviews = stats.reviews_inserted,
            "Batch persisted"
        );

        Ok(stats)
    }

    async fn fallback_hotel_upserts(&self, rows: &[HotelRow], job_id: &str) -> u64 {
        let mut inserted = 0;
        for row in rows {
            match self.store.upsert_hotel(row).await {
                Ok(()) => inserted += 1,
                Err(e) => {
                    warn!(
                        job_id = %job_id,
                        hotel_id = row.hotel_id,
                        error = %e,
                        "Dropping hotel row that failed individual upsert"
                    );
                }
            }
        }
        inserted
    }

    async fn fallback_review_inserts(&self, rows: &[ReviewRow], job_id: &str) -> u64 {
        let mut inserted = 0;
        for row in rows {
            match self.store.insert_review(row).await {
                Ok(true) => inserted += 1,
                Ok(false) => {}, // duplicate, silently skipped
                Err(e) => {
                    warn!(
                        job_id = %job_id,
                        hotel_review_id = row.hotel_review_id,
                        error = %e,
                        "Dropping review row that failed individual insert"
                    );
                }
            }
        }
        inserted
    }
}

/// Structural check for this stage: the record must carry the keys both
/// projections hang off of.
fn is_storable(record: &HotelReview) -> bool {
    record
        .platform
        .as_deref()
        .map_or(false, |p| !p.trim().is_empty())
        && record.hotel_id.map_or(false, |id| id != 0)
        && record.hotel_review_id.map_or(false, |id| id != 0)
        && record.rating.is_some()
}

/// Hotel projection, present when the record names the hotel
fn hotel_projection(record: &HotelReview) -> Option<HotelRow> {
    let hotel_id = record.hotel_id.filter(|id| *id != 0)?;
    let hotel_name = record
        .hotel_name
        .as_deref()
        .filter(|name| !name.is_empty())?
        .to_string();

    let provider = record
        .overall_by_providers
        .as_ref()
        .and_then(|providers| providers.first());

    Some(HotelRow {
        hotel_id,
        platform: record.platform.clone().unwrap_or_default(),
        hotel_name,
        overall_score: provider.and_then(|p| p.overall_score),
        review_count: provider.and_then(|p| p.review_count).unwrap_or(0),
        grades: provider
            .and_then(|p| p.grades.clone())
            .unwrap_or_else(|| serde_json::json!({})),
    })
}

/// Review projection, present when the record carries a review id and rating
fn review_projection(record: &HotelReview, job_id: &str) -> Option<ReviewRow> {
    let hotel_review_id = record.hotel_review_id.filter(|id| *id != 0)?;
    let rating = record.rating?;

    Some(ReviewRow {
        hotel_review_id,
        hotel_id: record.hotel_id,
        platform: record.platform.clone().unwrap_or_default(),
        rating,
        rating_text: record.rating_text.clone(),
        review_title: record.review_title.clone(),
        review_comments: record.review_comments.clone(),
        review_positives: record.review_positives.clone(),
        review_negatives: record.review_negatives.clone(),
        review_date: parse_review_date(record.review_date.as_deref()),
        check_in_date_month_and_year: record.check_in_date_month_and_year.clone(),
        is_show_review_response: record.is_show_review_response.unwrap_or(false),
        responder_name: record.responder_name.clone(),
        response_date_text: record.response_date_text.clone(),
        translate_source: record.translate_source.clone(),
        translate_target: record.translate_target.clone(),
        encrypted_review_data: record.encrypted_review_data.clone(),
        provider_id: record.provider_id,
        review_provider_text: record.review_provider_text.clone(),
        processing_job_id: job_id.to_string(),
    })
}

/// Parse the platform-supplied review date, falling back to the Unix epoch
/// when absent or unparseable.
fn parse_review_date(raw: Option<&str>) -> DateTime<Utc> {
    let Some(raw) = raw else {
        return DateTime::UNIX_EPOCH;
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return naive.and_utc();
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|n| n.and_utc()).unwrap_or(DateTime::UNIX_EPOCH);
    }

    DateTime::UNIX_EPOCH
}
