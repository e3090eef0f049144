use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::stats::{mean_rating, DomainStats};

/// Count and stored-precision mean of the source ratings matching a domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceAggregate {
    pub count: u32,
    pub avg_bias_rating: Option<f64>,
}

impl SourceAggregate {
    pub fn from_sum(sum: i64, count: u32) -> Self {
        Self {
            count,
            avg_bias_rating: mean_rating(sum, count),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomainSort {
    #[default]
    LastUsed,
    TotalSources,
    AvgBias,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainQuery {
    pub limit: usize,
    pub offset: usize,
    pub sort: DomainSort,
}

impl Default for DomainQuery {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
            sort: DomainSort::default(),
        }
    }
}

/// Everything the aggregator needs from persistence.
///
/// Implementations only move data. Deciding when to create, refresh or
/// delete a row is left to [`crate::intel::DomainIntelligence`].
pub trait DomainStore {
    fn find_domain(&self, domain: &str) -> StoreResult<Option<DomainStats>>;

    /// Aggregates every stored source whose URL contains `domain` as a substring.
    fn aggregate_sources(&self, domain: &str) -> StoreResult<SourceAggregate>;

    fn insert_domain(&self, stats: &DomainStats) -> StoreResult<()>;

    /// Overwrites the aggregate columns and bumps `usage_frequency` by `usage_increment`.
    fn refresh_domain(
        &self,
        domain: &str,
        aggregate: SourceAggregate,
        usage_increment: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Returns whether a row was removed.
    fn delete_domain(&self, domain: &str) -> StoreResult<bool>;

    fn list_domains(&self, query: DomainQuery) -> StoreResult<(Vec<DomainStats>, usize)>;

    fn domain_keys(&self) -> StoreResult<Vec<String>>;

    /// URL of every stored source.
    fn source_urls(&self) -> StoreResult<Vec<String>>;
}
