//! Scrapedex main entry point
//!
//! Crawls the configured site by default; `--stats`, `--search` and
//! `--suggest` work on an existing database instead.

use anyhow::{bail, Context};
use clap::Parser;
use scrapedex::config::{load_config_with_hash, Config, IndexerConfig};
use scrapedex::crawler::print_statistics;
use scrapedex::storage::{open_storage, CrawlRecordStore, RunStatusStore, SqliteStorage};
use scrapedex::{CrawlEngine, IndexCache, RunStatus, SearchService};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Scrapedex: a selector-driven web scraper with built-in search
///
/// Scrapedex crawls a site with a pool of work-stealing workers, extracts
/// records with CSS or XPath selectors into SQLite, and answers ranked
/// searches and autocomplete suggestions over what it collected.
#[derive(Parser, Debug)]
#[command(name = "scrapedex")]
#[command(version)]
#[command(about = "A selector-driven web scraper with built-in search", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be crawled without crawling
    #[arg(long, conflicts_with_all = ["stats", "search", "suggest"])]
    dry_run: bool,

    /// Show statistics of the latest run and exit
    #[arg(long, conflicts_with_all = ["search", "suggest"])]
    stats: bool,

    /// Search the collected documents
    #[arg(long, value_name = "QUERY", conflicts_with = "suggest")]
    search: Option<String>,

    /// Suggest dictionary entities for a prefix
    #[arg(long, value_name = "PREFIX")]
    suggest: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    let storage = Arc::new(
        open_storage(Path::new(&config.output.database_path))
            .context("failed to open the database")?,
    );

    if cli.stats {
        handle_stats(&storage)
    } else if let Some(query) = cli.search {
        handle_search(&config, storage, &query)
    } else if let Some(prefix) = cli.suggest {
        handle_suggest(&config, storage, &prefix)
    } else {
        handle_crawl(config, &config_hash, storage).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("scrapedex=info,warn"),
            1 => EnvFilter::new("scrapedex=debug,info"),
            2 => EnvFilter::new("scrapedex=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn handle_dry_run(config: &Config) {
    let crawler = &config.crawler;
    println!("=== Scrapedex Dry Run ===\n");

    println!("Crawler:");
    println!("  Seed URL: {}", crawler.seed_url);
    println!("  Threads: {}", crawler.threads);
    println!("  Max depth: {}", crawler.max_depth);
    println!("  Max pages: {}", crawler.max_pages);
    println!("  Max collected documents: {}", crawler.max_collected_docs);
    println!("  Traversal: {:?}", crawler.traversal);
    println!("  Excluded URLs: {}", crawler.excluded_urls.len());

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nFields ({}):", config.fields.len());
    for field in &config.fields {
        println!(
            "  - {} = {:?} '{}'{}",
            field.name,
            field.selector_kind,
            field.selector,
            field
                .attribute
                .as_deref()
                .map(|a| format!(" @{}", a))
                .unwrap_or_default()
        );
    }

    println!("\nActions ({}):", config.actions.len());
    for action in &config.actions {
        println!("  - {:?}", action);
    }

    if let Some(indexer) = &config.indexer {
        println!("\nIndexer '{}': fields {:?}", indexer.name, indexer.fields);
    }

    println!("\n✓ Configuration is valid");
}

fn handle_stats(storage: &SqliteStorage) -> anyhow::Result<()> {
    let Some(run) = storage.latest_run()? else {
        println!("No runs recorded yet");
        return Ok(());
    };

    println!(
        "Run {} ({}), {} documents collected\n",
        run.id, run.state.status, run.state.collected_documents
    );
    match storage.load_statistics(run.id)? {
        Some(stats) => print_statistics(&stats),
        None => println!("No statistics recorded for this run"),
    }
    Ok(())
}

fn indexer_of(config: &Config) -> anyhow::Result<&IndexerConfig> {
    match &config.indexer {
        Some(indexer) => Ok(indexer),
        None => bail!("the configuration has no [indexer] section"),
    }
}

fn handle_search(config: &Config, storage: Arc<SqliteStorage>, query: &str) -> anyhow::Result<()> {
    let indexer = indexer_of(config)?;
    let service = SearchService::new(Arc::new(IndexCache::new()), storage);
    let results = service.search(indexer, query)?;

    println!("Searched for: {}\n", results.keywords.join(" "));
    for (rank, hit) in results.hits.iter().take(20).enumerate() {
        println!("{:>2}. document {} (score {:.3})", rank + 1, hit.document_id, hit.score);
        for (field, value) in &hit.values {
            println!("      {}: {}", field, value);
        }
    }
    if results.hits.is_empty() {
        println!("No matches");
    }
    Ok(())
}

fn handle_suggest(config: &Config, storage: Arc<SqliteStorage>, prefix: &str) -> anyhow::Result<()> {
    let indexer = indexer_of(config)?;
    let service = SearchService::new(Arc::new(IndexCache::new()), storage);

    for suggestion in service.suggest(indexer, prefix)?.iter().take(10) {
        if suggestion.matched_name == suggestion.name {
            println!("{} (ped {}, score {})", suggestion.name, suggestion.ped, suggestion.score);
        } else {
            println!(
                "{} via '{}' (ped {}, score {})",
                suggestion.name, suggestion.matched_name, suggestion.ped, suggestion.score
            );
        }
    }
    Ok(())
}

async fn handle_crawl(
    config: Config,
    config_hash: &str,
    storage: Arc<SqliteStorage>,
) -> anyhow::Result<()> {
    let run_id = storage.create_run(config_hash)?;
    let engine = CrawlEngine::over_http(config, Arc::clone(&storage))?;

    // Ctrl-C asks the workers to stop after their current page
    let stopper = {
        let storage = Arc::clone(&storage);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, stopping run {}", run_id);
                if let Err(e) = storage.set_status(run_id, RunStatus::Exit) {
                    tracing::error!("Failed to stop run {}: {}", run_id, e);
                }
            }
        })
    };

    let outcome = engine.run(run_id).await;
    stopper.abort();
    let outcome = outcome.context("crawl failed")?;

    tracing::info!(
        "Run {} finished as {}: {} documents, {} links",
        outcome.run_id,
        outcome.state.status,
        outcome.state.collected_documents,
        outcome.discovered_links
    );
    print_statistics(&outcome.statistics);
    Ok(())
}
