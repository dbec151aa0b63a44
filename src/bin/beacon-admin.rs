use anyhow::{Context, Result};
use beacon::analytics::aggregator::{DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};
use beacon::analytics::Aggregator;
use beacon::clock::{Clock, SystemClock};
use beacon::config::Config;
use beacon::storage::build_store;
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "beacon-admin")]
#[command(about = "Beacon store inspection CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the trailing-window report
    Report {
        /// Number of days, most recent first
        #[arg(long, default_value_t = DEFAULT_WINDOW_DAYS)]
        days: u32,
        /// Emit JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Delete expired entries now
    Purge,
    /// Print the raw value stored under a key
    Get {
        key: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::with_offset_minutes(config.day_offset_minutes));
    let store = build_store(&config.store, Arc::clone(&clock)).await?;

    // Ensure tables exist
    store.init().await?;

    match cli.command {
        Commands::Report { days, json } => {
            let aggregator = Aggregator::new(Arc::clone(&store), clock);
            let report = aggregator.report(days.clamp(1, MAX_WINDOW_DAYS)).await?;

            if json {
                let out = serde_json::to_string_pretty(&report)
                    .context("failed to serialize report")?;
                println!("{out}");
            } else {
                println!("{:<12} {:>10} {:>10} {:>8}", "Date", "Pageviews", "Uniques", "Clicks");
                println!("{}", "-".repeat(44));
                for day in &report.days {
                    let clicks: u64 = day.clicks.values().sum();
                    println!(
                        "{:<12} {:>10} {:>10} {:>8}",
                        day.date, day.pageviews, day.unique_visitors, clicks
                    );
                }
                println!("{}", "-".repeat(44));
                println!(
                    "{:<12} {:>10} {:>10} {:>8}",
                    "Total",
                    report.total_pageviews,
                    report.total_uniques,
                    report.total_clicks.values().sum::<u64>()
                );
            }
        }
        Commands::Purge => {
            let removed = store.purge_expired().await?;
            println!("✓ Removed {} expired entries", removed);
        }
        Commands::Get { key } => match store.get(&key).await? {
            Some(value) => println!("{value}"),
            None => println!("⚠ No live value under '{}'", key),
        },
    }

    Ok(())
}
