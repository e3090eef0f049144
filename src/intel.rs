use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{info, warn};

use crate::domain::{extract_domain_from_url, normalize_domain};
use crate::error::{DomainError, StoreResult};
use crate::sqlite::{NewSource, SqliteStore};
use crate::stats::{BiasRating, BiasSuggestion, DomainStats};
use crate::store::{DomainQuery, DomainStore, SourceAggregate};

/// What a recorded observation did. Never an error from the caller's side.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ObservationOutcome {
    Created { domain: String },
    Updated { domain: String, total_sources: u32 },
    Skipped { reason: SkipReason },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum SkipReason {
    InvalidUrl(String),
    Storage(String),
}

impl ObservationOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    fn invalid_url(err: DomainError) -> Self {
        Self::Skipped {
            reason: SkipReason::InvalidUrl(err.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DomainPage {
    pub domains: Vec<DomainStats>,
    pub total: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecalculationSummary {
    pub updated: usize,
    pub deleted: usize,
    /// Source URLs that could not be reduced to a domain.
    pub skipped_urls: usize,
    /// Storage operations that failed; the pass keeps going past them.
    pub errors: usize,
}

#[derive(Debug, Default)]
struct DomainTally {
    domains: HashSet<String>,
    skipped_urls: usize,
}

impl DomainTally {
    fn merge(mut self, other: DomainTally) -> DomainTally {
        self.domains.extend(other.domains);
        self.skipped_urls += other.skipped_urls;
        self
    }
}

pub fn default_workers() -> usize {
    std::cmp::min(num_cpus::get(), 8)
}

/// Distinct hostnames referenced by stored sources.
fn tally_sources(urls: Vec<String>) -> DomainTally {
    urls.into_par_iter()
        .fold(DomainTally::default, |mut acc, url| {
            match extract_domain_from_url(&url) {
                Ok(domain) => {
                    acc.domains.insert(domain);
                }
                Err(_) => acc.skipped_urls += 1,
            }
            acc
        })
        .reduce(DomainTally::default, DomainTally::merge)
}

/// Per-domain bias statistics and rating suggestions.
///
/// Best-effort throughout: storage failures and bad URLs are logged and turn
/// into empty results, never into errors for the caller.
pub struct DomainIntelligence<S> {
    store: S,
}

impl<S: DomainStore> DomainIntelligence<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Folds one new source rating into its domain's statistics.
    ///
    /// Existing rows are recomputed from every stored source matching the
    /// domain rather than adjusted incrementally, so edits and deletions of
    /// sources are picked up on the next observation.
    pub fn record_observation(&self, url: &str, rating: BiasRating) -> ObservationOutcome {
        let domain = match extract_domain_from_url(url) {
            Ok(domain) => domain,
            Err(e) => {
                warn!(action = "record", component = "domain_intel", url = url, error = %e, "Skipping observation for unparsable URL");
                return ObservationOutcome::invalid_url(e);
            }
        };

        match self.try_record(&domain, rating, Utc::now()) {
            Ok(outcome) => {
                info!(action = "record", component = "domain_intel", domain = %domain, rating = rating.value(), outcome = ?outcome, "Recorded domain observation");
                outcome
            }
            Err(e) => {
                warn!(action = "record", component = "domain_intel", domain = %domain, error = %e, "Failed to record domain observation");
                ObservationOutcome::Skipped {
                    reason: SkipReason::Storage(e.to_string()),
                }
            }
        }
    }

    fn try_record(
        &self,
        domain: &str,
        rating: BiasRating,
        now: DateTime<Utc>,
    ) -> StoreResult<ObservationOutcome> {
        if self.store.find_domain(domain)?.is_none() {
            self.store
                .insert_domain(&DomainStats::first_observation(domain, rating, now))?;
            return Ok(ObservationOutcome::Created {
                domain: domain.to_string(),
            });
        }

        let aggregate = self.store.aggregate_sources(domain)?;
        self.store.refresh_domain(domain, aggregate, 1, now)?;
        Ok(ObservationOutcome::Updated {
            domain: domain.to_string(),
            total_sources: aggregate.count,
        })
    }

    pub fn domain_stats(&self, domain: &str) -> Option<DomainStats> {
        let normalized = match normalize_domain(domain) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(action = "lookup", component = "domain_intel", domain = domain, error = %e, "Invalid domain");
                return None;
            }
        };

        self.store
            .find_domain(&normalized)
            .unwrap_or_else(|e| {
                warn!(action = "lookup", component = "domain_intel", domain = %normalized, error = %e, "Failed to load domain stats");
                None
            })
    }

    pub fn domain_stats_for_url(&self, url: &str) -> Option<DomainStats> {
        match extract_domain_from_url(url) {
            Ok(domain) => self.domain_stats(&domain),
            Err(e) => {
                warn!(action = "lookup", component = "domain_intel", url = url, error = %e, "Invalid URL");
                None
            }
        }
    }

    /// Suggested rating for a source at `url`, with a confidence derived from
    /// how many sources back the domain's average.
    pub fn suggest_bias_rating(&self, url: &str) -> BiasSuggestion {
        self.domain_stats_for_url(url)
            .map(BiasSuggestion::from_stats)
            .unwrap_or_else(BiasSuggestion::none)
    }

    pub fn list_domains(&self, query: DomainQuery) -> DomainPage {
        match self.store.list_domains(query) {
            Ok((domains, total)) => DomainPage { domains, total },
            Err(e) => {
                warn!(action = "list", component = "domain_intel", error = %e, "Failed to list domains");
                DomainPage::default()
            }
        }
    }

    /// Rebuilds one domain's row from the stored sources. Removes the row
    /// and returns `None` when no sources remain.
    pub fn recalculate(&self, domain: &str) -> Option<DomainStats> {
        let normalized = match normalize_domain(domain) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(action = "recalculate", component = "domain_intel", domain = domain, error = %e, "Invalid domain");
                return None;
            }
        };

        match self.try_recalculate(&normalized, Utc::now()) {
            Ok(stats) => stats,
            Err(e) => {
                warn!(action = "recalculate", component = "domain_intel", domain = %normalized, error = %e, "Failed to recalculate domain stats");
                None
            }
        }
    }

    fn try_recalculate(&self, domain: &str, now: DateTime<Utc>) -> StoreResult<Option<DomainStats>> {
        let aggregate = self.store.aggregate_sources(domain)?;

        if aggregate.count == 0 {
            self.store.delete_domain(domain)?;
            return Ok(None);
        }

        self.write_aggregate(domain, aggregate, now)?;
        self.store.find_domain(domain)
    }

    /// Upsert without touching `usage_frequency` of existing rows.
    fn write_aggregate(
        &self,
        domain: &str,
        aggregate: SourceAggregate,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        if self.store.find_domain(domain)?.is_some() {
            self.store.refresh_domain(domain, aggregate, 0, now)
        } else {
            self.store.insert_domain(&DomainStats {
                normalized_domain: domain.to_string(),
                total_sources: aggregate.count,
                avg_bias_rating: aggregate.avg_bias_rating,
                usage_frequency: aggregate.count,
                first_seen: now,
                last_used: now,
            })
        }
    }

    /// Full rebuild: every domain referenced by a source is recomputed with
    /// the same substring rule as [`Self::recalculate`], and rows with no
    /// remaining sources are deleted. Hostnames are collected on `workers`
    /// threads.
    pub fn recalculate_all(&self, workers: Option<usize>) -> RecalculationSummary {
        let start_time = Instant::now();
        let mut summary = RecalculationSummary::default();
        info!(action = "start", component = "recalculate_all", "Recalculating all domain stats");

        let urls = match self.store.source_urls() {
            Ok(urls) => urls,
            Err(e) => {
                warn!(action = "scan", component = "recalculate_all", error = %e, "Failed to load sources");
                summary.errors += 1;
                return summary;
            }
        };

        let workers = workers.unwrap_or_else(default_workers);
        let tally = match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
            Ok(pool) => pool.install(|| tally_sources(urls)),
            Err(e) => {
                warn!(action = "configure", component = "recalculate_all", worker_count = workers, error = %e, "Falling back to the global thread pool");
                tally_sources(urls)
            }
        };
        summary.skipped_urls = tally.skipped_urls;

        let now = Utc::now();
        for domain in &tally.domains {
            match self.try_recalculate(domain, now) {
                Ok(Some(_)) => summary.updated += 1,
                // Hostname never appears verbatim in a URL (IDN hosts)
                Ok(None) => {}
                Err(e) => {
                    warn!(action = "update", component = "recalculate_all", domain = %domain, error = %e, "Failed to update domain");
                    summary.errors += 1;
                }
            }
        }

        match self.store.domain_keys() {
            Ok(keys) => {
                for key in keys.iter().filter(|k| !tally.domains.contains(k.as_str())) {
                    match self.store.delete_domain(key) {
                        Ok(_) => summary.deleted += 1,
                        Err(e) => {
                            warn!(action = "delete", component = "recalculate_all", domain = %key, error = %e, "Failed to delete orphaned domain");
                            summary.errors += 1;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(action = "scan", component = "recalculate_all", error = %e, "Failed to list domains for cleanup");
                summary.errors += 1;
            }
        }

        info!(
            action = "complete",
            component = "recalculate_all",
            updated = summary.updated,
            deleted = summary.deleted,
            skipped_urls = summary.skipped_urls,
            errors = summary.errors,
            worker_count = workers,
            duration_ms = start_time.elapsed().as_millis(),
            "Recalculated domain stats"
        );
        summary
    }
}

impl DomainIntelligence<SqliteStore> {
    /// Stores a source, then records its observation. Only the insert can fail.
    pub fn add_source(&self, source: &NewSource) -> StoreResult<(i64, ObservationOutcome)> {
        let id = self.store.insert_source(source)?;
        let outcome = self.record_observation(&source.url, source.bias_rating);
        Ok((id, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::store::DomainSort;

    fn rating(value: i64) -> BiasRating {
        BiasRating::new(value).unwrap()
    }

    fn new_source(url: &str, bias: i64) -> NewSource {
        NewSource {
            url: url.to_string(),
            article_title: None,
            bias_rating: rating(bias),
        }
    }

    fn service() -> DomainIntelligence<SqliteStore> {
        DomainIntelligence::new(SqliteStore::open_in_memory().unwrap())
    }

    struct OfflineStore;

    fn offline<T>() -> StoreResult<T> {
        Err(StoreError::Lock("offline".into()))
    }

    impl DomainStore for OfflineStore {
        fn find_domain(&self, _: &str) -> StoreResult<Option<DomainStats>> {
            offline()
        }
        fn aggregate_sources(&self, _: &str) -> StoreResult<SourceAggregate> {
            offline()
        }
        fn insert_domain(&self, _: &DomainStats) -> StoreResult<()> {
            offline()
        }
        fn refresh_domain(&self, _: &str, _: SourceAggregate, _: u32, _: DateTime<Utc>) -> StoreResult<()> {
            offline()
        }
        fn delete_domain(&self, _: &str) -> StoreResult<bool> {
            offline()
        }
        fn list_domains(&self, _: DomainQuery) -> StoreResult<(Vec<DomainStats>, usize)> {
            offline()
        }
        fn domain_keys(&self) -> StoreResult<Vec<String>> {
            offline()
        }
        fn source_urls(&self) -> StoreResult<Vec<String>> {
            offline()
        }
    }

    #[test]
    fn test_cold_start_creates_row() {
        let intel = service();
        let outcome = intel.record_observation("https://example.com/a", rating(2));
        assert_eq!(
            outcome,
            ObservationOutcome::Created {
                domain: "example.com".into()
            }
        );

        let stats = intel.domain_stats("example.com").unwrap();
        assert_eq!(stats.total_sources, 1);
        assert_eq!(stats.avg_bias_rating, Some(2.0));
        assert_eq!(stats.usage_frequency, 1);
        assert_eq!(stats.first_seen, stats.last_used);
    }

    #[test]
    fn test_average_recomputed_from_sources() {
        let intel = service();
        for (url, bias) in [
            ("https://www.example.com/one", 2),
            ("https://example.com/two", -1),
            ("https://example.com/three", 0),
        ] {
            let (_, outcome) = intel.add_source(&new_source(url, bias)).unwrap();
            assert!(!outcome.is_skipped());
        }

        let stats = intel.domain_stats("https://www.example.com").unwrap();
        assert_eq!(stats.total_sources, 3);
        assert_eq!(stats.avg_bias_rating, Some(0.33));
        assert_eq!(stats.usage_frequency, 3);
    }

    #[test]
    fn test_edits_are_picked_up_on_next_observation() {
        let intel = service();
        let (first, _) = intel.add_source(&new_source("https://example.com/1", 3)).unwrap();
        intel.add_source(&new_source("https://example.com/2", 3)).unwrap();

        intel.store().update_source_rating(first, rating(-3)).unwrap();
        intel.add_source(&new_source("https://example.com/3", 0)).unwrap();

        let stats = intel.domain_stats("example.com").unwrap();
        assert_eq!(stats.total_sources, 3);
        assert_eq!(stats.avg_bias_rating, Some(0.0));
    }

    #[test]
    fn test_malformed_url_changes_nothing() {
        let intel = service();
        intel.record_observation("https://example.com", rating(1));
        let before = intel.list_domains(DomainQuery::default());

        let outcome = intel.record_observation("not a url", rating(1));
        assert!(matches!(
            outcome,
            ObservationOutcome::Skipped {
                reason: SkipReason::InvalidUrl(_)
            }
        ));
        assert_eq!(intel.list_domains(DomainQuery::default()), before);
    }

    #[test]
    fn test_unknown_domain_has_no_suggestion() {
        let intel = service();
        let suggestion = intel.suggest_bias_rating("https://neverseen.example");
        assert_eq!(suggestion, BiasSuggestion::none());
        assert_eq!(intel.suggest_bias_rating("::garbage::"), BiasSuggestion::none());
    }

    #[test]
    fn test_suggestion_confidence_grows_with_sources() {
        let intel = service();
        let expected = [
            (1, 0.3),
            (2, 0.3),
            (3, 0.6),
            (5, 0.6),
            (6, 0.8),
            (10, 0.8),
            (11, 0.95),
        ];
        let mut added = 0;
        for (target, confidence) in expected {
            while added < target {
                added += 1;
                intel
                    .add_source(&new_source(&format!("https://thehill.com/{added}"), 1))
                    .unwrap();
            }
            let suggestion = intel.suggest_bias_rating("https://www.thehill.com/new-article");
            assert_eq!(suggestion.suggested_bias, Some(1.0));
            assert_eq!(suggestion.confidence, confidence, "sources={target}");
            assert_eq!(suggestion.domain_stats.unwrap().total_sources, target);
        }
    }

    #[test]
    fn test_recalculate_single_domain() {
        let intel = service();
        let (a, _) = intel.add_source(&new_source("https://example.com/a", 2)).unwrap();
        let (b, _) = intel.add_source(&new_source("https://example.com/b", -2)).unwrap();
        let (c, _) = intel.add_source(&new_source("https://example.com/c", 1)).unwrap();

        intel.store().delete_source(c).unwrap();
        let stats = intel.recalculate("www.example.com").unwrap();
        assert_eq!(stats.total_sources, 2);
        assert_eq!(stats.avg_bias_rating, Some(0.0));
        assert_eq!(stats.usage_frequency, 3);

        intel.store().delete_source(a).unwrap();
        intel.store().delete_source(b).unwrap();
        assert!(intel.recalculate("example.com").is_none());
        assert!(intel.domain_stats("example.com").is_none());
    }

    #[test]
    fn test_recalculate_creates_missing_row() {
        let intel = service();
        intel.store().insert_source(&new_source("https://npr.org/x", -1)).unwrap();
        intel.store().insert_source(&new_source("https://npr.org/y", -2)).unwrap();

        let stats = intel.recalculate("npr.org").unwrap();
        assert_eq!(stats.total_sources, 2);
        assert_eq!(stats.avg_bias_rating, Some(-1.5));
        assert_eq!(stats.usage_frequency, 2);
    }

    #[test]
    fn test_recalculate_all_converges() {
        let intel = service();
        for (url, bias) in [
            ("https://foxnews.com/a", 3),
            ("https://www.foxnews.com/b", 2),
            ("https://cnn.com/a", -2),
            ("https://bbc.co.uk/news/1", 0),
        ] {
            intel.store().insert_source(&new_source(url, bias)).unwrap();
        }
        intel.record_observation("https://stale.example.org/a", rating(1));

        let summary = intel.recalculate_all(Some(2));
        assert_eq!(summary.updated, 3);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.skipped_urls, 0);
        assert_eq!(summary.errors, 0);

        let fox = intel.domain_stats("foxnews.com").unwrap();
        assert_eq!(fox.total_sources, 2);
        assert_eq!(fox.avg_bias_rating, Some(2.5));
        assert_eq!(intel.domain_stats("cnn.com").unwrap().avg_bias_rating, Some(-2.0));
        assert_eq!(intel.domain_stats("bbc.co.uk").unwrap().avg_bias_rating, Some(0.0));
        assert!(intel.domain_stats("stale.example.org").is_none());

        let page = intel.list_domains(DomainQuery {
            sort: DomainSort::TotalSources,
            ..DomainQuery::default()
        });
        assert_eq!(page.total, 3);
        assert_eq!(page.domains[0].normalized_domain, "foxnews.com");
    }

    #[test]
    fn test_mixed_case_urls_match_their_domain() {
        let intel = service();
        intel.add_source(&new_source("https://www.NYTimes.com/a", 2)).unwrap();
        intel.add_source(&new_source("https://www.NYTimes.com/b", 2)).unwrap();

        let stats = intel.domain_stats("nytimes.com").unwrap();
        assert_eq!(stats.total_sources, 2);
        assert_eq!(stats.avg_bias_rating, Some(2.0));
        assert_eq!(
            intel.suggest_bias_rating("https://nytimes.com/c").suggested_bias,
            Some(2.0)
        );

        let stats = intel.recalculate("nytimes.com").unwrap();
        assert_eq!(stats.total_sources, 2);
    }

    #[test]
    fn test_full_and_single_recalculation_agree() {
        let intel = service();
        intel.store().insert_source(&new_source("https://example.com/a", 2)).unwrap();
        intel.store().insert_source(&new_source("https://news.example.com/b", -2)).unwrap();

        let summary = intel.recalculate_all(Some(2));
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.deleted, 0);

        let parent = intel.domain_stats("example.com").unwrap();
        assert_eq!(parent.total_sources, 2);
        assert_eq!(parent.avg_bias_rating, Some(0.0));
        let child = intel.domain_stats("news.example.com").unwrap();
        assert_eq!(child.total_sources, 1);
        assert_eq!(child.avg_bias_rating, Some(-2.0));

        let parent_again = intel.recalculate("example.com").unwrap();
        assert_eq!(parent_again.total_sources, parent.total_sources);
        assert_eq!(parent_again.avg_bias_rating, parent.avg_bias_rating);
        let child_again = intel.recalculate("news.example.com").unwrap();
        assert_eq!(child_again.total_sources, child.total_sources);
        assert_eq!(child_again.avg_bias_rating, child.avg_bias_rating);
    }

    #[test]
    fn test_recalculate_all_counts_unparsable_urls() {
        let intel = service();
        intel.store().insert_source(&new_source("not a url", 1)).unwrap();
        intel.store().insert_source(&new_source("https://apnews.com/1", 0)).unwrap();

        let summary = intel.recalculate_all(None);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.skipped_urls, 1);
    }

    #[test]
    fn test_storage_failures_degrade_silently() {
        let intel = DomainIntelligence::new(OfflineStore);

        let outcome = intel.record_observation("https://example.com", rating(1));
        assert!(matches!(
            outcome,
            ObservationOutcome::Skipped {
                reason: SkipReason::Storage(_)
            }
        ));
        assert_eq!(intel.suggest_bias_rating("https://example.com"), BiasSuggestion::none());
        assert!(intel.domain_stats("example.com").is_none());
        assert!(intel.recalculate("example.com").is_none());
        assert_eq!(intel.list_domains(DomainQuery::default()), DomainPage::default());

        let summary = intel.recalculate_all(Some(1));
        assert_eq!(summary.errors, 1);
        assert_eq!(summary.updated, 0);
    }
}
