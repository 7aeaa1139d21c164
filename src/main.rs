//! ria-harvest main entry point
//!
//! This is the command-line interface for the car listing harvester.

use anyhow::{Context, Result};
use clap::Parser;
use ria_harvest::config::{load_config_with_hash, Config, CrawlConfig, StrategyKind};
use ria_harvest::crawler::run_crawl;
use ria_harvest::extract::extract_listing_items;
use ria_harvest::output::{load_statistics, print_report, print_statistics};
use ria_harvest::storage::{open_storage, Storage};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// ria-harvest: a crawler for paginated used-car listings
///
/// Walks the listing pages from the configured start URL, visits every
/// advertisement and stores one record per advertisement that was not
/// stored before.
#[derive(Parser, Debug)]
#[command(name = "ria-harvest")]
#[command(version)]
#[command(about = "Crawl and extract used-car advertisements", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Override the item quota from the config file
    #[arg(long, value_name = "N")]
    max_items: Option<u32>,

    /// Override the fetch strategy from the config file
    #[arg(long, value_name = "STRATEGY")]
    strategy: Option<StrategyKind>,

    /// Delete the record database before crawling
    #[arg(long)]
    fresh_db: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the effective run settings without crawling
    #[arg(long, conflicts_with_all = ["stats", "import_listing"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "import_listing"])]
    stats: bool,

    /// Extract records from a saved listing page and store them, then exit
    #[arg(long, value_name = "FILE", conflicts_with_all = ["dry_run", "stats"])]
    import_listing: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (mut config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(strategy) = cli.strategy {
        config.crawler.strategy = strategy;
    }

    if cli.dry_run {
        handle_dry_run(&config, cli.max_items)
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(path) = &cli.import_listing {
        handle_import_listing(&config, path)
    } else {
        if cli.fresh_db {
            remove_database(Path::new(&config.output.database_path))?;
        }
        handle_crawl(&config, &config_hash, cli.max_items).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ria_harvest=info,warn"),
            1 => EnvFilter::new("ria_harvest=debug,info"),
            2 => EnvFilter::new("ria_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the settings a run would use
fn handle_dry_run(config: &Config, max_items: Option<u32>) -> Result<()> {
    let run = CrawlConfig::from_config(config, max_items)?;

    println!("=== ria-harvest Dry Run ===\n");

    println!("Crawl:");
    println!("  Start URL: {}", run.start_url);
    println!("  Strategy: {}", run.strategy);
    println!("  Max pages: {}", run.effective_max_pages());
    println!("  Max items: {}", run.max_items);
    println!("  Concurrency: {}", run.concurrency);
    if let Some(cap) = run.per_page_item_cap() {
        println!("  Test mode: at most {} items per page", cap);
    }

    println!("\nPacing:");
    println!(
        "  Request delay: {:?} (+ up to {:.0}% jitter)",
        run.request_delay,
        run.jitter * 100.0
    );
    println!("  Page delay multiplier: {}", run.page_delay_multiplier);
    println!(
        "  Retries: {} attempts, backoff from {:?} (x{} when blocked)",
        run.retry_attempts, run.retry_backoff, run.blocked_backoff_multiplier
    );
    println!("  Request timeout: {:?}", run.request_timeout);

    println!("\nProxy:");
    match &run.proxy {
        Some(proxy) => println!(
            "  {} of {} configured ({})",
            proxy.server,
            config.proxy.servers.len(),
            if proxy.username.is_some() { "with credentials" } else { "no credentials" }
        ),
        None => println!("  disabled"),
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open the record database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --import-listing mode: stores records from a saved listing page
fn handle_import_listing(config: &Config, path: &Path) -> Result<()> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let run = CrawlConfig::from_config(config, None)?;

    let records = extract_listing_items(&html, &run.base_origin);
    tracing::info!("Found {} advertisements in {}", records.len(), path.display());

    let mut storage = open_storage(Path::new(&config.output.database_path))
        .context("Failed to open the record database")?;

    let mut inserted = 0;
    for record in &records {
        if storage.upsert_record(record)? {
            inserted += 1;
        }
    }

    println!(
        "Imported {} of {} advertisements from {} ({} already stored)",
        inserted,
        records.len(),
        path.display(),
        records.len() - inserted
    );

    Ok(())
}

/// Deletes the database file and its WAL companions
fn remove_database(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        let file = PathBuf::from(name);
        if file.exists() {
            std::fs::remove_file(&file)
                .with_context(|| format!("Failed to remove {}", file.display()))?;
            tracing::info!("Removed {}", file.display());
        }
    }
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str, max_items: Option<u32>) -> Result<()> {
    let cancel = CancellationToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight items");
            on_signal.cancel();
        }
    });

    let report = run_crawl(config, config_hash, max_items, cancel)
        .await
        .context("Crawl failed")?;

    print_report(&report);
    Ok(())
}
