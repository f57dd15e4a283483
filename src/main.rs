mod compact;
mod error;
mod fetcher;
mod parser;
mod pipeline;
mod records;
mod schema;
mod settings;
mod staging;

use std::path::PathBuf;
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing::info;

use crate::compact::{read_table, render_table, TableCompactor};
use crate::fetcher::HttpFetcher;
use crate::pipeline::{ExecutionContext, PipelineDriver, RunOutcome};
use crate::settings::Settings;

#[derive(Parser)]
#[command(
    name = "gh_repo_etl",
    about = "Scrape a GitHub organization's repositories into a Parquet table"
)]
struct Cli {
    /// Staging directory for per-page JSON batches
    #[arg(long, global = true)]
    staging_dir: Option<PathBuf>,
    /// Consolidated Parquet table
    #[arg(long, global = true)]
    table: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, parse, stage and compact, then print the table (the default)
    Run {
        /// Organization URL, e.g. https://github.com/orgs/<org> (repeatable)
        #[arg(long = "org")]
        orgs: Vec<String>,
        /// Leave the table untouched when a listing fetch fails
        #[arg(long)]
        no_compact_on_fetch_failure: bool,
        /// Skip printing the table afterwards
        #[arg(long)]
        quiet: bool,
    },
    /// Rebuild the table from whatever is staged
    Compact,
    /// Print the consolidated table
    Show {
        /// Max rows to display
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Emit rows as JSON Lines instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    if let Some(dir) = cli.staging_dir {
        settings.staging_dir = dir;
    }
    if let Some(table) = cli.table {
        settings.table_path = table;
    }
    info!(settings = ?settings, "Starting repository ETL");

    let command = cli.command.unwrap_or(Commands::Run {
        orgs: Vec::new(),
        no_compact_on_fetch_failure: false,
        quiet: false,
    });

    match command {
        Commands::Run {
            orgs,
            no_compact_on_fetch_failure,
            quiet,
        } => {
            if !orgs.is_empty() {
                settings.org_urls = orgs;
            }
            if no_compact_on_fetch_failure {
                settings.compact_on_fetch_failure = false;
            }
            let table_path = settings.table_path.clone();

            let exec = ExecutionContext::new(settings.workers)?;
            let driver = PipelineDriver::new(HttpFetcher::new()?, settings);
            let report = driver.run(&exec).await?;
            drop(exec);
            info!(stages = ?report.stages, "Run finished");

            for failed in &report.failed {
                println!("  {} -> HTTP {}", failed.url, failed.status);
            }
            match report.outcome {
                RunOutcome::Completed => println!(
                    "Staged {} records in {} batches.",
                    report.staged_records, report.staged_batches
                ),
                RunOutcome::FetchFailed { compacted } => println!(
                    "{} listing fetch(es) failed; {}.",
                    report.failed.len(),
                    if compacted {
                        "compacted existing staging data"
                    } else {
                        "table left untouched"
                    }
                ),
            }
            if let Some(stats) = report.compaction {
                println!(
                    "Wrote {} rows from {} batches to {}",
                    stats.rows,
                    stats.batches,
                    table_path.display()
                );
            }
            if !quiet && table_path.exists() {
                println!("{}", render_table(&table_path, None)?);
            }
        }
        Commands::Compact => {
            let stats = TableCompactor::new(&settings.staging_dir, settings.staging_pattern.as_str())
                .compact(&settings.table_path)?;
            println!(
                "Wrote {} rows from {} batches to {}",
                stats.rows,
                stats.batches,
                settings.table_path.display()
            );
        }
        Commands::Show { limit, json: false } => {
            println!("{}", render_table(&settings.table_path, limit)?);
        }
        Commands::Show { limit, json: true } => {
            let rows = read_table(&settings.table_path)?;
            for row in rows.iter().take(limit.unwrap_or(usize::MAX)) {
                println!("{}", serde_json::to_string(row)?);
            }
        }
    }

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {:.1}s", elapsed.as_secs_f64());
    }
    Ok(())
}
