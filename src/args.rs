use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::store::DomainSort;

#[derive(Parser, Debug)]
#[command(
    name = "ledger",
    about = "Classify accountability events and track bias ratings per news domain",
    version,
    long_about = None
)]
pub struct Args {
    /// SQLite database holding sources and domain statistics
    #[arg(long, env = "LEDGER_DB", default_value = "ledger.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Number of worker threads for full recalculation
    #[arg(short, long, global = true)]
    pub workers: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show which administrative period an event date falls into
    Classify {
        /// Event date, YYYY-MM-DD or RFC 3339
        date: String,
    },

    /// Store a source and record its domain observation
    AddSource {
        url: String,

        /// Bias rating from -3 to 3
        #[arg(short, long, allow_hyphen_values = true)]
        bias: i64,

        /// Article title
        #[arg(short, long)]
        title: Option<String>,
    },

    /// Delete a stored source (domain stats are refreshed by `recalculate`)
    RemoveSource { id: i64 },

    /// Record a domain observation without storing a source
    Record {
        url: String,

        #[arg(short, long, allow_hyphen_values = true)]
        bias: i64,
    },

    /// Suggest a bias rating for a URL from its domain history
    Suggest { url: String },

    /// Show statistics for one domain
    Stats { domain: String },

    /// List tracked domains
    Domains {
        #[arg(short, long, default_value_t = 50)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(short, long, value_enum, default_value_t = SortKey::LastUsed)]
        sort: SortKey,
    },

    /// Rebuild domain statistics from stored sources
    Recalculate {
        /// Domain to rebuild; omit with --all
        domain: Option<String>,

        /// Rebuild every domain and remove orphaned rows
        #[arg(long, conflicts_with = "domain")]
        all: bool,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    LastUsed,
    TotalSources,
    AvgBias,
}

impl From<SortKey> for DomainSort {
    fn from(key: SortKey) -> Self {
        match key {
            SortKey::LastUsed => DomainSort::LastUsed,
            SortKey::TotalSources => DomainSort::TotalSources,
            SortKey::AvgBias => DomainSort::AvgBias,
        }
    }
}
