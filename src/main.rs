//! Harvester main entry point
//!
//! This is the command-line interface for the harvester engine.

use anyhow::{bail, Context};
use clap::Parser;
use harvester::config::{load_config_with_hash, Config};
use harvester::export::export_collection;
use harvester::frontier::{load_statistics, open_frontier, print_statistics, SharedFrontier};
use harvester::site::{select_sites, SiteDefinition};
use harvester::{Orchestrator, RunSummary};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Harvester: a concurrent web-harvesting engine
///
/// Harvester seeds each configured site, runs its discovery and detail
/// processors against a persistent URL frontier, and stores the extracted
/// entities for export or downstream submission.
#[derive(Parser, Debug)]
#[command(name = "harvester")]
#[command(version = "1.0.0")]
#[command(about = "A concurrent web-harvesting engine", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Only run the named site
    #[arg(long, value_name = "NAME")]
    site: Option<String>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would run without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "export"])]
    dry_run: bool,

    /// Show frontier statistics and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export"])]
    stats: bool,

    /// Export an entity collection to CSV and exit
    #[arg(long, value_name = "COLLECTION", conflicts_with_all = ["dry_run", "stats"])]
    export: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("Failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config, cli.site.as_deref())
    } else if cli.stats {
        handle_stats(&config)
    } else if let Some(collection) = cli.export.as_deref() {
        handle_export(&config, collection)
    } else {
        handle_run(&config, cli.site.as_deref()).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("harvester=info,warn"),
            1 => EnvFilter::new("harvester=debug,info"),
            2 => EnvFilter::new("harvester=trace,debug"),
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

/// Handles --dry-run: prints the engine settings and every processor
fn handle_dry_run(config: &Config, only: Option<&str>) -> anyhow::Result<()> {
    let sites = select_sites(config, only)?;

    println!("=== Harvester Dry Run ===\n");

    println!("Engine:");
    println!("  Environment: {:?}", config.engine.environment);
    println!("  Max retry attempts: {}", config.engine.max_retry_attempts);
    println!("  Batch size: {}", config.engine.batch_size);
    println!("  Concurrency limit: {}", config.engine.concurrency_limit);
    match config.engine.effective_item_cap() {
        Some(cap) => println!("  Item cap: {}", cap),
        None => println!("  Item cap: none"),
    }

    println!("\nNavigation:");
    println!("  Backend: {}", config.navigation.backend.as_str());
    println!("  Timeout: {}ms", config.navigation.timeout_ms);

    println!("\nProxies:");
    println!("  Strategy: {}", config.proxy.strategy);
    for proxy in &config.proxy.servers {
        println!("  - {}", proxy);
    }

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);
    println!("  Exports: {}", config.output.export_dir);
    if let Some(dir) = &config.output.snapshot_dir {
        println!("  Snapshots: {}", dir);
    }

    println!("\nSites ({}):", sites.len());
    for site in &sites {
        print_site(site);
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

fn print_site(site: &SiteDefinition) {
    println!("  - {} ({} seeds into {})", site.name, site.seeds.len(), site.root_collection);
    for processor in &site.processors {
        println!(
            "    * {} [{}]: {} -> {}",
            processor.name,
            if processor.is_discovery() { "discovery" } else { "detail" },
            processor.source,
            processor.destination
        );
    }
}

/// Handles --stats: shows per-collection frontier statistics
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let store = open_frontier(
        Path::new(&config.output.database_path),
        config.engine.max_retry_attempts,
    )?;
    let stats = load_statistics(&store)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles --export: dumps one entity collection to CSV
fn handle_export(config: &Config, collection: &str) -> anyhow::Result<()> {
    let store = open_frontier(
        Path::new(&config.output.database_path),
        config.engine.max_retry_attempts,
    )?;

    let summary = export_collection(
        &store,
        collection,
        Path::new(&config.output.export_dir),
        config.output.export_page_size,
    )?;

    println!("✓ Exported {} rows to {}", summary.rows, summary.path.display());
    Ok(())
}

/// Runs the selected sites until drained, capped or interrupted
async fn handle_run(config: &Config, only: Option<&str>) -> anyhow::Result<()> {
    let sites = select_sites(config, only)?;
    if sites.is_empty() {
        bail!("No sites configured");
    }

    let store = open_frontier(
        Path::new(&config.output.database_path),
        config.engine.max_retry_attempts,
    )?;
    let frontier = SharedFrontier::new(store, config.engine.store_timeout());
    let orchestrator = Orchestrator::new(config, frontier.clone())?;

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing in-flight work");
            cancel.cancel();
        }
    });

    let mut total = RunSummary::default();
    let mut outcome = Ok(());
    for site in &sites {
        match orchestrator.run_site(site).await {
            Ok(summary) => {
                total.processors.extend(summary.processors);
                total.cap_reached |= summary.cap_reached;
                total.cancelled |= summary.cancelled;
            }
            Err(e) => {
                tracing::error!("Site {} halted: {}", site.name, e);
                outcome = Err(e);
                break;
            }
        }
        if total.cancelled {
            break;
        }
    }

    orchestrator.shutdown().await;

    tracing::info!(
        "Run finished: {} processed, {} succeeded, {} failed, {} new links{}",
        total.processed(),
        total.succeeded(),
        total.failed(),
        total.discovered(),
        if total.cap_reached { " (item cap reached)" } else { "" }
    );
    tracing::info!("Request metrics: {}", orchestrator.metrics().snapshot());

    match frontier.statistics().await {
        Ok(stats) => print_statistics(&stats),
        Err(e) => tracing::warn!("Could not load statistics: {}", e),
    }

    outcome.context("Run halted by a fatal error")
}
