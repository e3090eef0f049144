pub mod args;
pub mod domain;
pub mod error;
pub mod intel;
pub mod period;
pub mod report;
pub mod sqlite;
pub mod stats;
pub mod store;
pub mod utils;

pub use args::Args;
pub use error::{DomainError, StoreError, ValidationError};
pub use intel::{DomainIntelligence, ObservationOutcome, RecalculationSummary};
pub use period::{classify_period, validate_event_date, AdministrativePeriod};
pub use sqlite::SqliteStore;
pub use stats::{BiasRating, BiasSuggestion, DomainStats};
pub use store::{DomainQuery, DomainSort, DomainStore};
