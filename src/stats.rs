use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ValidationError;

pub const MIN_BIAS: i64 = -3;
pub const MAX_BIAS: i64 = 3;

/// Perceived slant of a source, -3..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct BiasRating(i8);

impl BiasRating {
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if (MIN_BIAS..=MAX_BIAS).contains(&value) {
            Ok(Self(value as i8))
        } else {
            Err(ValidationError::BiasOutOfRange(value))
        }
    }

    pub fn value(&self) -> i64 {
        i64::from(self.0)
    }
}

impl TryFrom<i64> for BiasRating {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Accumulated bias observations for one normalized domain.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStats {
    pub normalized_domain: String,
    pub total_sources: u32,
    /// `None` exactly when `total_sources == 0`.
    pub avg_bias_rating: Option<f64>,
    pub usage_frequency: u32,
    pub first_seen: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

impl DomainStats {
    /// Row for a domain seen for the first time.
    pub fn first_observation(domain: &str, rating: BiasRating, now: DateTime<Utc>) -> Self {
        Self {
            normalized_domain: domain.to_string(),
            total_sources: 1,
            avg_bias_rating: Some(rating.value() as f64),
            usage_frequency: 1,
            first_seen: now,
            last_used: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BiasSuggestion {
    pub suggested_bias: Option<f64>,
    pub confidence: f64,
    pub domain_stats: Option<DomainStats>,
}

impl BiasSuggestion {
    pub fn none() -> Self {
        Self {
            suggested_bias: None,
            confidence: 0.0,
            domain_stats: None,
        }
    }

    pub fn from_stats(stats: DomainStats) -> Self {
        match stats.avg_bias_rating {
            Some(avg) => Self {
                suggested_bias: Some(round_half_up(avg, 1)),
                confidence: confidence_for(stats.total_sources),
                domain_stats: Some(stats),
            },
            None => Self::none(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.suggested_bias.is_none()
    }
}

/// Step function over the number of sources backing an average.
pub fn confidence_for(total_sources: u32) -> f64 {
    match total_sources {
        0..=2 => 0.3,
        3..=5 => 0.6,
        6..=10 => 0.8,
        _ => 0.95,
    }
}

/// Stored averages carry two decimals.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Ties go toward positive infinity, so -0.25 becomes -0.2.
pub fn round_half_up(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor + 0.5).floor() / factor
}

/// Mean of ratings rounded for storage, `None` when empty.
pub fn mean_rating(sum: i64, count: u32) -> Option<f64> {
    if count == 0 {
        None
    } else {
        Some(round_to(sum as f64 / f64::from(count), 2))
    }
}
