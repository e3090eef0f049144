use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::info;

use crate::args::{Args, Command};
use crate::intel::{DomainIntelligence, DomainPage, ObservationOutcome, RecalculationSummary, SkipReason};
use crate::period::{classify_period, parse_event_date, validate_event_date, AdministrativePeriod};
use crate::sqlite::{NewSource, SqliteStore};
use crate::stats::{BiasRating, BiasSuggestion, DomainStats};
use crate::store::DomainQuery;
use crate::utils::format_number;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Classification {
    date: String,
    admin_period: AdministrativePeriod,
    label: &'static str,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

pub fn run(args: &Args) -> Result<()> {
    let start_time = Instant::now();

    match &args.command {
        // Pure date logic; no database needed
        Command::Classify { date } => classify(date, args.json)?,
        Command::AddSource { url, bias, title } => {
            let intel = open_intel(&args.db)?;
            let source = NewSource {
                url: url.clone(),
                article_title: title.clone(),
                bias_rating: BiasRating::new(*bias)?,
            };
            let (id, outcome) = intel.add_source(&source).context("Failed to store source")?;
            if args.json {
                print_json(&serde_json::json!({ "sourceId": id, "observation": outcome }))?;
            } else {
                println!("Stored source #{id}");
                print_outcome(&outcome);
            }
        }
        Command::RemoveSource { id } => {
            let intel = open_intel(&args.db)?;
            let removed = intel
                .store()
                .delete_source(*id)
                .context("Failed to delete source")?;
            if !removed {
                anyhow::bail!("Source #{} not found", id);
            }
            println!("Removed source #{id}");
        }
        Command::Record { url, bias } => {
            let intel = open_intel(&args.db)?;
            let outcome = intel.record_observation(url, BiasRating::new(*bias)?);
            if args.json {
                print_json(&outcome)?;
            } else {
                print_outcome(&outcome);
            }
        }
        Command::Suggest { url } => {
            let intel = open_intel(&args.db)?;
            let suggestion = intel.suggest_bias_rating(url);
            if args.json {
                print_json(&suggestion)?;
            } else {
                print_suggestion(url, &suggestion);
            }
        }
        Command::Stats { domain } => {
            let intel = open_intel(&args.db)?;
            let stats = intel.domain_stats(domain);
            if args.json {
                print_json(&stats)?;
            } else {
                match stats {
                    Some(stats) => print_domain_stats(&stats),
                    None => println!("No statistics for {domain}"),
                }
            }
        }
        Command::Domains { limit, offset, sort } => {
            let intel = open_intel(&args.db)?;
            let page = intel.list_domains(DomainQuery {
                limit: *limit,
                offset: *offset,
                sort: (*sort).into(),
            });
            if args.json {
                print_json(&page)?;
            } else {
                print_domain_page(&page, *offset);
            }
        }
        Command::Recalculate { domain, all } => {
            let intel = open_intel(&args.db)?;
            if *all {
                let summary = intel.recalculate_all(args.workers);
                if args.json {
                    print_json(&summary)?;
                } else {
                    print_summary(&summary);
                }
            } else if let Some(domain) = domain {
                let stats = intel.recalculate(domain);
                if args.json {
                    print_json(&stats)?;
                } else {
                    match stats {
                        Some(stats) => print_domain_stats(&stats),
                        None => println!("{domain}: no sources remain, statistics removed"),
                    }
                }
            }
        }
    }

    info!(
        action = "complete",
        component = "command",
        duration_ms = start_time.elapsed().as_millis(),
        "Command finished"
    );
    Ok(())
}

fn open_intel(db: &Path) -> Result<DomainIntelligence<SqliteStore>> {
    let store = SqliteStore::open(db)
        .with_context(|| format!("Failed to open database at {db:?}"))?;
    Ok(DomainIntelligence::new(store))
}

fn classify(input: &str, json: bool) -> Result<()> {
    let date = parse_event_date(input)?;
    validate_event_date(date)?;

    let period = classify_period(date);
    if json {
        print_json(&Classification {
            date: date.format("%Y-%m-%d").to_string(),
            admin_period: period,
            label: period.label(),
        })
    } else {
        println!("{}: {} ({})", date.format("%B %-d, %Y"), period.label(), period);
        Ok(())
    }
}

fn print_outcome(outcome: &ObservationOutcome) {
    match outcome {
        ObservationOutcome::Created { domain } => println!("Tracking new domain {domain}"),
        ObservationOutcome::Updated {
            domain,
            total_sources,
        } => println!(
            "Updated {domain} ({} sources)",
            format_number(*total_sources)
        ),
        ObservationOutcome::Skipped { reason } => match reason {
            SkipReason::InvalidUrl(detail) => println!("Domain not tracked: {detail}"),
            SkipReason::Storage(_) => println!("Domain not tracked (statistics unavailable)"),
        },
    }
}

fn format_bias(value: Option<f64>) -> String {
    value
        .map(|v| format!("{v:+.2}"))
        .unwrap_or_else(|| "n/a".to_string())
}

fn print_suggestion(url: &str, suggestion: &BiasSuggestion) {
    match (suggestion.suggested_bias, &suggestion.domain_stats) {
        (Some(bias), Some(stats)) => println!(
            "Suggested bias for {}: {:+.1} (confidence {:.0}%, from {} sources)",
            stats.normalized_domain,
            bias,
            suggestion.confidence * 100.0,
            format_number(stats.total_sources)
        ),
        _ => println!("No suggestion for {url}"),
    }
}

fn print_domain_stats(stats: &DomainStats) {
    println!("\n--- {} ---", stats.normalized_domain);
    println!("Sources: {}", format_number(stats.total_sources));
    println!("Average bias: {}", format_bias(stats.avg_bias_rating));
    println!("Observations: {}", format_number(stats.usage_frequency));
    println!("First seen: {}", stats.first_seen.format("%B %-d, %Y"));
    println!("Last used: {}", stats.last_used.format("%B %-d, %Y"));
}

fn print_domain_page(page: &DomainPage, offset: usize) {
    println!(
        "\nTracked domains: {}",
        format_number(u32::try_from(page.total).unwrap_or(u32::MAX))
    );
    for (i, stats) in page.domains.iter().enumerate() {
        println!(
            "{:>4}. {} - {} sources, avg {}, last used {}",
            offset + i + 1,
            stats.normalized_domain,
            format_number(stats.total_sources),
            format_bias(stats.avg_bias_rating),
            stats.last_used.format("%Y-%m-%d")
        );
    }
}

fn print_summary(summary: &RecalculationSummary) {
    println!(
        "Recalculated domain stats: {} updated, {} deleted",
        summary.updated, summary.deleted
    );
    if summary.skipped_urls > 0 {
        println!("Skipped {} sources with unparsable URLs", summary.skipped_urls);
    }
    if summary.errors > 0 {
        println!("{} storage operations failed; see log output", summary.errors);
    }
}
