use chrono::{DateTime, Utc};
use thiserror::Error;

/// Input rejected before it reaches storage.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("event date {date} is in the future (latest allowed: {latest})")]
    FutureDate {
        date: DateTime<Utc>,
        latest: DateTime<Utc>,
    },

    #[error("bias rating {0} is outside the range -3..=3")]
    BiasOutOfRange(i64),

    #[error("invalid date '{0}': expected YYYY-MM-DD or RFC 3339")]
    InvalidDate(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("URL or domain cannot be empty")]
    Empty,

    #[error("invalid URL or domain: {0}")]
    Invalid(String),

    #[error("invalid domain '{0}': must include a top-level domain")]
    MissingTld(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("database lock poisoned: {0}")]
    Lock(String),

    #[error("invalid count {value} in column {column}")]
    Count { column: &'static str, value: i64 },

    #[error("corrupt timestamp '{value}' in column {column}")]
    Timestamp { column: &'static str, value: String },
}

pub type StoreResult<T> = Result<T, StoreError>;
