mod error;
mod feed;
mod fetch;
mod lines;
mod model;
mod parser;
mod resolver;
mod store;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::lines::LineRepository;
use crate::model::Observation;
use crate::parser::ParseOutcome;
use crate::store::Store;

const DEFAULT_FEED_URL: &str = "https://www.kvv.de/fahrplan/meldungen.html";

#[derive(Parser)]
#[command(name = "ausfall_scraper", about = "S-Bahn cancellation announcement scraper")]
struct Cli {
    /// Directory of per-line train number definition files
    #[arg(long, default_value = "data/lines")]
    lines_dir: PathBuf,
    /// Root directory of the cancellation store
    #[arg(long, default_value = "data/ausfaelle")]
    store_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the feed, parse relevant articles, merge records into the store
    Run {
        /// Max articles to process (default: all relevant)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Announcement feed URL (also AUSFALL_FEED_URL)
        #[arg(long)]
        feed: Option<String>,
    },
    /// Parse a single article URL and print its records without storing
    Parse { url: String },
    /// Stored record counts per (year, line) bucket
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { limit, feed } => {
            let feed_url = feed
                .or_else(|| std::env::var("AUSFALL_FEED_URL").ok())
                .unwrap_or_else(|| DEFAULT_FEED_URL.to_string());
            run(&cli.lines_dir, &cli.store_dir, &feed_url, limit).await
        }
        Commands::Parse { url } => parse_single(&cli.lines_dir, &url).await,
        Commands::Stats => {
            let store = Store::new(&cli.store_dir);
            let counts = store.bucket_counts().await?;
            if counts.is_empty() {
                println!("Store is empty.");
                return Ok(());
            }
            println!("{:<6} | {:<6} | {:>7}", "Year", "Line", "Records");
            println!("{}", "-".repeat(26));
            let mut total = 0;
            for (year, line, count) in &counts {
                println!("{year:<6} | {line:<6} | {count:>7}");
                total += count;
            }
            println!("\n{total} records in {} buckets", counts.len());
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run(
    lines_dir: &PathBuf,
    store_dir: &PathBuf,
    feed_url: &str,
    limit: Option<usize>,
) -> Result<()> {
    let mut repo = LineRepository::load(lines_dir)?;
    let client = fetch::client()?;

    let mut items = feed::fetch_feed(&client, feed_url).await?;
    if let Some(n) = limit {
        items.truncate(n);
    }
    if items.is_empty() {
        println!("No relevant announcements in the feed.");
        return Ok(());
    }

    println!("Fetching {} articles...", items.len());
    let pages = fetch::fetch_pages(&client, items).await?;

    let mut records = Vec::new();
    let mut observations: Vec<Observation> = Vec::new();
    let mut skipped = 0usize;
    let mut failures: Vec<(String, String)> = Vec::new();

    for page in &pages {
        let Some(html) = &page.html else {
            failures.push((
                page.url.clone(),
                page.error.clone().unwrap_or_else(|| "fetch failed".into()),
            ));
            continue;
        };
        info!("Processing {} ({})", page.url, page.title);
        match parser::process_article(html, &page.url, &mut repo)? {
            ParseOutcome::Parsed(result) => {
                for fb in &result.fallbacks {
                    warn!("{fb}");
                }
                records.extend(result.records);
                observations.extend(result.observations);
            }
            ParseOutcome::NoTrips => {
                info!("skipping {}: {}", page.url, error::ParseError::NoTripsFound);
                skipped += 1;
            }
            ParseOutcome::Unresolved {
                train_number,
                mentioned,
            } => {
                failures.push((
                    page.url.clone(),
                    error::ParseError::UnresolvedMapping {
                        train_number,
                        mentioned: mentioned.join(", "),
                    }
                    .to_string(),
                ));
            }
        }
    }

    // Valid records are persisted even when some articles failed.
    let store = Store::new(store_dir);
    let report = store.merge(records).await?;
    let learned = repo.merge_observations(&observations)?;

    println!(
        "Stored {} new records ({} duplicates), {} articles without trips, learned {} train numbers.",
        report.added, report.duplicates, skipped, learned
    );

    if !failures.is_empty() {
        for (url, msg) in &failures {
            eprintln!("FAILED {url}: {msg}");
        }
        bail!("{} of {} articles failed", failures.len(), pages.len());
    }
    Ok(())
}

async fn parse_single(lines_dir: &PathBuf, url: &str) -> Result<()> {
    let mut repo = LineRepository::load(lines_dir)?;
    let client = fetch::client()?;
    let html = fetch::fetch_one(&client, url).await?;

    match parser::process_article(&html, url, &mut repo)? {
        ParseOutcome::Parsed(result) => {
            println!("{}", serde_json::to_string_pretty(&result.records)?);
            for fb in &result.fallbacks {
                eprintln!("VERIFY: {fb}");
            }
            for obs in &result.observations {
                println!("observed: {} -> {}", obs.line, obs.train_number);
            }
            Ok(())
        }
        ParseOutcome::NoTrips => {
            println!("No trips found.");
            Ok(())
        }
        ParseOutcome::Unresolved {
            train_number,
            mentioned,
        } => bail!(
            "no line mapping for train {} (mentioned: {})",
            train_number,
            mentioned.join(", ")
        ),
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
