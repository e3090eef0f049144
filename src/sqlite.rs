use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::stats::{BiasRating, DomainStats};
use crate::store::{DomainQuery, DomainSort, DomainStore, SourceAggregate};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    article_title TEXT,
    bias_rating INTEGER NOT NULL CHECK (bias_rating BETWEEN -3 AND 3),
    date_accessed TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS domain_stats (
    normalized_domain TEXT PRIMARY KEY,
    total_sources INTEGER NOT NULL DEFAULT 0,
    avg_bias_rating REAL,
    usage_frequency INTEGER NOT NULL DEFAULT 0,
    first_seen TEXT NOT NULL,
    last_used TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_domain_stats_last_used ON domain_stats(last_used);
"#;

const DOMAIN_COLUMNS: &str =
    "normalized_domain, total_sources, avg_bias_rating, usage_frequency, first_seen, last_used";

#[derive(Debug, Clone)]
pub struct NewSource {
    pub url: String,
    pub article_title: Option<String>,
    pub bias_rating: BiasRating,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub id: i64,
    pub url: String,
    pub article_title: Option<String>,
    pub bias_rating: i64,
    pub created_at: DateTime<Utc>,
}

type DomainRow = (String, i64, Option<f64>, i64, String, String);

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_ts(column: &'static str, value: String) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp { column, value })
}

fn domain_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<DomainRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn parse_count(column: &'static str, value: i64) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Count { column, value })
}

fn into_stats(row: DomainRow) -> StoreResult<DomainStats> {
    let (normalized_domain, total, avg, usage, first_seen, last_used) = row;
    Ok(DomainStats {
        normalized_domain,
        total_sources: parse_count("total_sources", total)?,
        avg_bias_rating: avg,
        usage_frequency: parse_count("usage_frequency", usage)?,
        first_seen: parse_ts("first_seen", first_seen)?,
        last_used: parse_ts("last_used", last_used)?,
    })
}

impl SqliteStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let start_time = Instant::now();
        let conn = Connection::open(path)?;
        let store = Self::from_connection(conn)?;
        info!(
            action = "open",
            component = "sqlite_store",
            path = ?path,
            duration_ms = start_time.elapsed().as_millis(),
            "Opened ledger database"
        );
        Ok(store)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn get_conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::Lock(e.to_string()))
    }

    pub fn insert_source(&self, source: &NewSource) -> StoreResult<i64> {
        let conn = self.get_conn()?;
        let now = format_ts(Utc::now());
        conn.execute(
            "INSERT INTO sources (url, article_title, bias_rating, date_accessed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![
                source.url,
                source.article_title,
                source.bias_rating.value(),
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!(action = "insert", component = "sources", source_id = id, url = %source.url, "Stored source");
        Ok(id)
    }

    pub fn delete_source(&self, id: i64) -> StoreResult<bool> {
        let conn = self.get_conn()?;
        let removed = conn.execute("DELETE FROM sources WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    pub fn update_source_rating(&self, id: i64, rating: BiasRating) -> StoreResult<bool> {
        let conn = self.get_conn()?;
        let changed = conn.execute(
            "UPDATE sources SET bias_rating = ?2 WHERE id = ?1",
            params![id, rating.value()],
        )?;
        Ok(changed > 0)
    }

    pub fn find_source(&self, id: i64) -> StoreResult<Option<SourceRecord>> {
        let conn = self.get_conn()?;
        let raw = conn
            .query_row(
                "SELECT id, url, article_title, bias_rating, created_at FROM sources WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        raw.map(
            |(id, url, article_title, bias_rating, created_at)| -> StoreResult<SourceRecord> {
                Ok(SourceRecord {
                    id,
                    url,
                    article_title,
                    bias_rating,
                    created_at: parse_ts("created_at", created_at)?,
                })
            },
        )
        .transpose()
    }

    pub fn source_count(&self) -> StoreResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sources", [], |row| row.get(0))?;
        Ok(parse_count("source_count", count)? as usize)
    }
}

impl DomainStore for SqliteStore {
    fn find_domain(&self, domain: &str) -> StoreResult<Option<DomainStats>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                &format!("SELECT {DOMAIN_COLUMNS} FROM domain_stats WHERE normalized_domain = ?1"),
                params![domain],
                domain_from_row,
            )
            .optional()?;
        row.map(into_stats).transpose()
    }

    fn aggregate_sources(&self, domain: &str) -> StoreResult<SourceAggregate> {
        let conn = self.get_conn()?;
        // Keys are lowercase; instr avoids LIKE wildcards in the domain
        let (count, sum): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), SUM(bias_rating) FROM sources WHERE instr(lower(url), ?1) > 0",
            params![domain],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(SourceAggregate::from_sum(
            sum.unwrap_or(0),
            parse_count("source_count", count)?,
        ))
    }

    fn insert_domain(&self, stats: &DomainStats) -> StoreResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            &format!("INSERT INTO domain_stats ({DOMAIN_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
            params![
                stats.normalized_domain,
                stats.total_sources,
                stats.avg_bias_rating,
                stats.usage_frequency,
                format_ts(stats.first_seen),
                format_ts(stats.last_used),
            ],
        )?;
        Ok(())
    }

    fn refresh_domain(
        &self,
        domain: &str,
        aggregate: SourceAggregate,
        usage_increment: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            "UPDATE domain_stats
             SET total_sources = ?2,
                 avg_bias_rating = ?3,
                 usage_frequency = usage_frequency + ?4,
                 last_used = ?5
             WHERE normalized_domain = ?1",
            params![
                domain,
                aggregate.count,
                aggregate.avg_bias_rating,
                usage_increment,
                format_ts(now),
            ],
        )?;
        Ok(())
    }

    fn delete_domain(&self, domain: &str) -> StoreResult<bool> {
        let conn = self.get_conn()?;
        let removed = conn.execute(
            "DELETE FROM domain_stats WHERE normalized_domain = ?1",
            params![domain],
        )?;
        Ok(removed > 0)
    }

    fn list_domains(&self, query: DomainQuery) -> StoreResult<(Vec<DomainStats>, usize)> {
        let start_time = Instant::now();
        let conn = self.get_conn()?;

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM domain_stats", [], |row| row.get(0))?;

        let order_by = match query.sort {
            DomainSort::LastUsed => "last_used DESC",
            DomainSort::TotalSources => "total_sources DESC",
            DomainSort::AvgBias => "avg_bias_rating DESC",
        };
        let mut stmt = conn.prepare(&format!(
            "SELECT {DOMAIN_COLUMNS} FROM domain_stats
             ORDER BY {order_by}, normalized_domain ASC
             LIMIT ?1 OFFSET ?2"
        ))?;
        let rows = stmt
            .query_map(
                params![
                    i64::try_from(query.limit).unwrap_or(i64::MAX),
                    i64::try_from(query.offset).unwrap_or(i64::MAX)
                ],
                domain_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let domains = rows
            .into_iter()
            .map(into_stats)
            .collect::<StoreResult<Vec<_>>>()?;

        debug!(
            action = "query",
            component = "domain_listing",
            returned = domains.len(),
            total,
            duration_ms = start_time.elapsed().as_millis(),
            "Listed domains"
        );
        Ok((domains, usize::try_from(total).unwrap_or(0)))
    }

    fn domain_keys(&self) -> StoreResult<Vec<String>> {
        let conn = self.get_conn()?;
        let keys = conn
            .prepare("SELECT normalized_domain FROM domain_stats")?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    fn source_urls(&self) -> StoreResult<Vec<String>> {
        let start_time = Instant::now();
        let conn = self.get_conn()?;
        let urls = conn
            .prepare("SELECT url FROM sources")?
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        info!(
            action = "query",
            component = "source_scan",
            source_count = urls.len(),
            duration_ms = start_time.elapsed().as_millis(),
            "Loaded source URLs"
        );
        Ok(urls)
    }
}
