//! Business-rule validation for canonical reviews
//!
//! Stateless checks over the flattened shape. Rule violations are reported,
//! never thrown; parse failures are handled upstream and never reach this
//! stage.

use super::transform::HotelReview;

/// Outcome of validating one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

/// Applies business rules to canonical reviews
#[derive(Debug, Clone, Copy, Default)]
pub struct ReviewValidator;

impl ReviewValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, review: &HotelReview) -> ValidationOutcome {
        let mut errors = Vec::new();

        if let Some(rating) = review.rating {
            if !(0.0..=10.0).contains(&rating) {
                errors.push("Rating must be between 0 and 10".to_string());
            }
        }

        match review.hotel_id {
            Some(id) if id != 0 => {},
            _ => errors.push("Hotel ID is required".to_string()),
        }

        let platform_missing = review
            .platform
            .as_deref()
            .map_or(true, |p| p.trim().is_empty());
        if platform_missing {
            errors.push("Platform is required".to_string());
        }

        ValidationOutcome {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}
