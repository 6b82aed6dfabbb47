//! Store capability for hotel and review projections
//!
//! The persister writes through the [`ReviewStore`] trait: bulk operations
//! with single-row fallbacks of each. [`PgReviewStore`] is the production
//! implementation; [`MemoryReviewStore`] backs tests and persistence-free
//! development runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Hotel projection row, keyed by the platform-native hotel id
#[derive(Debug, Clone, PartialEq)]
pub struct HotelRow {
    pub hotel_id: i64,
    pub platform: String,
    pub hotel_name: String,
    pub overall_score: Option<f64>,
    pub review_count: i64,
    pub grades: serde_json::Value,
}

/// Review projection row, keyed by the platform-native review id
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRow {
    pub hotel_review_id: i64,
    pub hotel_id: Option<i64>,
    pub platform: String,
    pub rating: f64,
    pub rating_text: Option<String>,
    pub review_title: Option<String>,
    pub review_comments: Option<String>,
    pub review_positives: Option<String>,
    pub review_negatives: Option<String>,
    pub review_date: DateTime<Utc>,
    pub check_in_date_month_and_year: Option<String>,
    pub is_show_review_response: bool,
    pub responder_name: Option<String>,
    pub response_date_text: Option<String>,
    pub translate_source: Option<String>,
    pub translate_target: Option<String>,
    pub encrypted_review_data: Option<String>,
    pub provider_id: Option<i64>,
    pub review_provider_text: Option<String>,
    pub processing_job_id: String,
}

/// Set-based writes with per-row fallbacks
#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Upsert all hotels in one statement; conflict on hotel id overwrites
    /// the mutable fields (last write wins). Returns rows inserted or
    /// updated.
    async fn bulk_upsert_hotels(&self, rows: &[HotelRow]) -> Result<u64, sqlx::Error>;

    /// Single-row variant of [`ReviewStore::bulk_upsert_hotels`]
    async fn upsert_hotel(&self, row: &HotelRow) -> Result<(), sqlx::Error>;

    /// Insert all reviews in one statement, silently skipping rows whose
    /// review id already exists (first write wins). Returns rows actually
    /// inserted.
    async fn bulk_insert_reviews(&self, rows: &[ReviewRow]) -> Result<u64, sqlx::Error>;

    /// Single-row variant of [`ReviewStore::bulk_insert_reviews`]; returns
    /// whether the row was inserted (false on duplicate).
    async fn insert_review(&self, row: &ReviewRow) -> Result<bool, sqlx::Error>;
}

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgReviewStore {
    pool: PgPool,
}

impl PgReviewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReviewStore for PgReviewStore {
    async fn bulk_upsert_hotels(&self, rows: &[HotelRow]) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO hotels \
             (hotel_id, platform, hotel_name, overall_score, review_count, grades, created_at, updated_at) ",
        );
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.hotel_id)
                .push_bind(&row.platform)
                .push_bind(&row.hotel_name)
                .push_bind(row.overall_score)
                .push_bind(row.review_count)
                .push_bind(&row.grades)
                .push_bind(now)
                .push_bind(now);
        });
        builder.push(
            " ON CONFLICT (hotel_id) DO UPDATE SET \
             hotel_name = EXCLUDED.hotel_name, \
             overall_score = EXCLUDED.overall_score, \
             review_count = EXCLUDED.review_count, \
             grades = EXCLUDED.grades, \
             updated_at = EXCLUDED.updated_at",
        );

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn upsert_hotel(&self, row: &HotelRow) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO hotels
                (hotel_id, platform, hotel_name, overall_score, review_count, grades, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            ON CONFLICT (hotel_id) DO UPDATE SET
                hotel_name = EXCLUDED.hotel_name,
                overall_score = EXCLUDED.overall_score,
                review_count = EXCLUDED.review_count,
                grades = EXCLUDED.grades,
                updated_at = NOW()
            "#,
        )
        .bind(row.hotel_id)
        .bind(&row.platform)
        .bind(&row.hotel_name)
        .bind(row.overall_score)
        .bind(row.review_count)
        .bind(&row.grades)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn bulk_insert_reviews(&self, rows: &[ReviewRow]) -> Result<u64, sqlx::Error> {
        if rows.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let mut builder: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(
            "INSERT INTO reviews \
             (hotel_review_id, hotel_id, platform, rating, rating_text, review_title, \
              review_comments, review_positives, review_negatives, review_date, \
              check_in_date_month_and_year, is_show_review_response, responder_name, \
              response_date_text, translate_source, translate_target, encrypted_review_data, \
              provider_id, review_provider_text, processing_job_id, created_at, updated_at) ",
        );
        builder.push_values(rows, |mut b, row| {
            b.push_bind(row.hotel_review_id)
                .push_bind(row.hotel_id)
                .push_bind(&row.platform)
                .push_bind(row.rating)
                .push_bind(&row.rating_text)
                .push_bind(&row.review_title)
                .push_bind(&row.review_comments)
                .push_bind(&row.review_positives)
                .push_bind(&row.review_negatives)
                .push_bind(row.review_date)
                .push_bind(&row.check_in_date_month_and_year)
                .push_bind(row.is_show_review_response)
                .push_bind(&row.responder_name)
                .push_bind(&row.response_date_text)
                .push_bind(&row.translate_source)
                .push_bind(&row.translate_target)
                .push_bind(&row.encrypted_review_data)
                .push_bind(row.provider_id)
                .push_bind(&row.review_provider_text)
                .push_bind(&row.processing_job_id)
                .push_bind(now)
                .push_bind(now);
        });
        builder.push(" ON CONFLICT (hotel_review_id) DO NOTHING");

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn insert_review(&self, row: &ReviewRow) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO reviews
                (hotel_review_id, hotel_id, platform, rating, rating_text, review_title,
                 review_comments, review_positives, review_negatives, review_date,
                 check_in_date_month_and_year, is_show_review_response, responder_name,
                 response_date_text, translate_source, translate_target, encrypted_review_data,
                 provider_id, review_provider_text, processing_job_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, NOW(), NOW())
            ON CONFLICT (hotel_review_id) DO NOTHING
            "#,
        )
        .bind(row.hotel_review_id)
        .bind(row.hotel_id)
        .bind(&row.platform)
        .bind(row.rating)
        .bind(&row.rating_text)
        .bind(&row.review_title)
        .bind(&row.review_comments)
        .bind(&row.review_positives)
        .bind(&row.review_negatives)
        .bind(row.review_date)
        .bind(&row.check_in_date_month_and_year)
        .bind(row.is_show_review_response)
        .bind(&row.responder_name)
        .bind(&row.response_date_text)
        .bind(&row.translate_source)
        .bind(&row.translate_target)
        .bind(&row.encrypted_review_data)
        .bind(row.provider_id)
        .bind(&row.review_provider_text)
        .bind(&row.processing_job_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// In-memory store with the same conflict semantics as Postgres
///
/// Backs persister unit tests and the integration suite; bulk operations
/// can be forced to fail to exercise the per-row fallback path.
#[derive(Default)]
pub struct MemoryReviewStore {
    hotels: Mutex<HashMap<i64, HotelRow>>,
    reviews: Mutex<HashMap<i64, ReviewRow>>,
    fail_bulk_ops: AtomicBool,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every bulk operation fail, forcing callers onto the per-row
    /// fallback path.
    pub fn set_fail_bulk_ops(&self, fail: bool) {
        self.fail_bulk_ops.store(fail, Ordering::SeqCst);
    }

    pub fn hotel(&self, hotel_id: i64) -> Option<HotelRow> {
        self.hotels
            .lock()
            .ok()
            .and_then(|map| map.get(&hotel_id).cloned())
    }

    pub fn review(&self, hotel_review_id: i64) -> Option<ReviewRow> {
        self.reviews
            .lock()
            .ok()
            .and_then(|map| map.get(&hotel_review_id).cloned())
    }

    pub fn hotel_count(&self) -> usize {
        self.hotels.lock().map(|map| map.len()).unwrap_or(0)
    }

    pub fn review_count(&self) -> usize {
        self.reviews.lock().map(|map| map.len()).unwrap_or(0)
    }

    fn bulk_failure(&self) -> Option<sqlx::Error> {
        if self.fail_bulk_ops.load(Ordering::SeqCst) {
            Some(sqlx::Error::Protocol(
                "simulated bulk operation failure".into(),
            ))
        } else {
            None
        }
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn bulk_upsert_hotels(&self, rows: &[HotelRow]) -> Result<u64, sqlx::Error> {
        if let Some(err) = self.bulk_failure() {
            return Err(err);
        }
        for row in rows {
            self.upsert_hotel(row).await?;
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_hotel(&self, row: &HotelRow) -> Result<(), sqlx::Error> {
        let mut hotels = self
            .hotels
            .lock()
            .map_err(|_| sqlx::Error::Protocol("hotel store poisoned".into()))?;
        hotels.insert(row.hotel_id, row.clone());
        Ok(())
    }

    async fn bulk_insert_reviews(&self, rows: &[ReviewRow]) -> Result<u64, sqlx::Error> {
        if let Some(err) = self.bulk_failure() {
            return Err(err);
        }
        let mut inserted = 0;
        for row in rows {
            if self.insert_review(row).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn insert_review(&self, row: &ReviewRow) -> Result<bool, sqlx::Error> {
        let mut reviews = self
            .reviews
            .lock()
            .map_err(|_| sqlx::Error::Protocol("review store poisoned".into()))?;
        if reviews.contains_key(&row.hotel_review_id) {
            return Ok(false);
        }
        reviews.insert(row.hotel_review_id, row.clone());
        Ok(true)
    }
}
