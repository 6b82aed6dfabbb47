//! Record normalization
//!
//! Source platforms deliver reviews in one of two shapes: an already
//! flattened record, or a nested record whose review fields live in a
//! `comment` sub-object. Decoding is an explicit two-variant union where
//! each variant has its own schema, and normalization flattens the nested
//! shape into the canonical [`HotelReview`]. Pure and deterministic;
//! validation happens downstream.

use serde::{Deserialize, Serialize};

/// Per-provider aggregate carried alongside a review
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderAggregate {
    #[serde(default)]
    pub provider_id: Option<i64>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub review_count: Option<i64>,
    #[serde(default)]
    pub grades: Option<serde_json::Value>,
}

/// Canonical flattened hotel review
///
/// Every field is optional at this stage; the validator and the persister
/// decide what a record is good for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotelReview {
    #[serde(default)]
    pub hotel_id: Option<i64>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub hotel_name: Option<String>,
    #[serde(default)]
    pub hotel_review_id: Option<i64>,
    #[serde(default)]
    pub provider_id: Option<i64>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub rating_text: Option<String>,
    #[serde(default)]
    pub review_title: Option<String>,
    #[serde(default)]
    pub review_comments: Option<String>,
    #[serde(default)]
    pub review_positives: Option<String>,
    #[serde(default)]
    pub review_negatives: Option<String>,
    #[serde(default)]
    pub review_date: Option<String>,
    #[serde(default)]
    pub check_in_date_month_and_year: Option<String>,
    #[serde(default)]
    pub is_show_review_response: Option<bool>,
    #[serde(default)]
    pub responder_name: Option<String>,
    #[serde(default)]
    pub response_date_text: Option<String>,
    #[serde(default)]
    pub translate_source: Option<String>,
    #[serde(default)]
    pub translate_target: Option<String>,
    #[serde(default)]
    pub encrypted_review_data: Option<String>,
    #[serde(default)]
    pub review_provider_text: Option<String>,
    /// Reviewer metadata preserved as-is
    #[serde(default)]
    pub reviewer_info: Option<serde_json::Value>,
    #[serde(default)]
    pub overall_by_providers: Option<Vec<ProviderAggregate>>,
}

/// Review fields as nested under `comment` in the raw shape
///
/// `rating` is required here: it is what distinguishes a genuine nested
/// record from a flat record that merely happens to carry a `comment` key.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewComment {
    pub rating: f64,
    #[serde(default)]
    pub hotel_review_id: Option<i64>,
    #[serde(default)]
    pub provider_id: Option<i64>,
    #[serde(default)]
    pub rating_text: Option<String>,
    #[serde(default)]
    pub review_title: Option<String>,
    #[serde(default)]
    pub review_comments: Option<String>,
    #[serde(default)]
    pub review_positives: Option<String>,
    #[serde(default)]
    pub review_negatives: Option<String>,
    #[serde(default)]
    pub review_date: Option<String>,
    #[serde(default)]
    pub check_in_date_month_and_year: Option<String>,
    #[serde(default)]
    pub is_show_review_response: Option<bool>,
    #[serde(default)]
    pub responder_name: Option<String>,
    #[serde(default)]
    pub response_date_text: Option<String>,
    #[serde(default)]
    pub translate_source: Option<String>,
    #[serde(default)]
    pub translate_target: Option<String>,
    #[serde(default)]
    pub encrypted_review_data: Option<String>,
    #[serde(default)]
    pub review_provider_text: Option<String>,
    #[serde(default)]
    pub reviewer_info: Option<serde_json::Value>,
}

/// Raw nested shape: hotel fields top-level, review fields under `comment`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedReview {
    #[serde(default)]
    pub hotel_id: Option<i64>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub hotel_name: Option<String>,
    pub comment: ReviewComment,
    #[serde(default)]
    pub overall_by_providers: Option<Vec<ProviderAggregate>>,
}

/// One parsed input record, in either accepted shape
///
/// Variants are tried in order, so a record only decodes as `Flat` after
/// failing the nested schema.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawRecord {
    Nested(NestedReview),
    Flat(HotelReview),
}

impl RawRecord {
    /// Normalize into the canonical flattened shape
    pub fn into_canonical(self) -> HotelReview {
        match self {
            RawRecord::Flat(review) => review,
            RawRecord::Nested(raw) => {
                let comment = raw.comment;
                HotelReview {
                    hotel_id: raw.hotel_id,
                    platform: raw.platform,
                    hotel_name: raw.hotel_name,
                    hotel_review_id: comment.hotel_review_id,
                    provider_id: comment.provider_id,
                    rating: Some(comment.rating),
                    rating_text: comment.rating_text,
                    review_title: comment.review_title,
                    review_comments: comment.review_comments,
                    review_positives: comment.review_positives,
                    review_negatives: comment.review_negatives,
                    review_date: comment.review_date,
                    check_in_date_month_and_year: comment.check_in_date_month_and_year,
                    is_show_review_response: comment.is_show_review_response,
                    responder_name: comment.responder_name,
                    response_date_text: comment.response_date_text,
                    translate_source: comment.translate_source,
                    translate_target: comment.translate_target,
                    encrypted_review_data: comment.encrypted_review_data,
                    review_provider_text: comment.review_provider_text,
                    reviewer_info: comment.reviewer_info,
                    overall_by_providers: raw.overall_by_providers,
                }
            }
        }
    }
}

/// Parse one raw line into a canonical review
pub fn decode_line(line: &str) -> Result<HotelReview, serde_json::Error> {
    let record: RawRecord = serde_json::from_str(line)?;
    Ok(record.into_canonical())
}
