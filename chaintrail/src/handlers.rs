use anyhow::{Context, anyhow, bail};
use chaintrail_core::crawl::{
    CrawlConfig, CrawlSummary, Scheduler, generate_crawl_report, generate_graph_report,
};
use chaintrail_core::data::{RunStatus, SqliteGraphStore};
use chaintrail_core::enrich::{DEFAULT_BATCH_SIZE, EnrichmentClient, run_enrichment};
use chaintrail_core::memory::MemoryGraphStore;
use chaintrail_core::store::GraphStore;
use chaintrail_core::Config;
use chaintrail_scanner::{LedgerSource, TransactionFetcher};
use clap::ArgMatches;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

// Helper functions for crawl handler

/// Load seed addresses from a file: one per line, surrounding whitespace
/// trimmed, blank lines ignored.
pub fn load_seeds_from_file(path: &Path) -> Result<Vec<String>, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read seed file {}: {}", path.display(), e))?;

    let seeds: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if seeds.is_empty() {
        return Err(format!("No seed addresses found in {}", path.display()));
    }

    Ok(seeds)
}

fn new_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

/// Crawl `seeds` into `store` and wait for every job to finish.
pub async fn run_crawl(
    source: Arc<dyn LedgerSource>,
    store: Arc<dyn GraphStore>,
    config: CrawlConfig,
    seeds: &[String],
    depth: i64,
    show_progress: bool,
) -> CrawlSummary {
    let mut scheduler = Scheduler::new(source, store, config);

    let spinner = show_progress.then(new_spinner);
    if let Some(ref spinner) = spinner {
        spinner.set_message(format!("Crawling {} seeds", seeds.len()));
        let pb = spinner.clone();
        scheduler = scheduler.with_progress_callback(Arc::new(move |address: &str, depth: i64| {
            pb.set_message(format!("depth {}: {}", depth, address));
        }));
    }

    let summary = Arc::new(scheduler).run(seeds, depth).await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    summary
}

pub async fn handle_crawl(sub_matches: &ArgMatches, quiet: bool) -> anyhow::Result<()> {
    let seed_file = sub_matches
        .get_one::<PathBuf>("SEED_FILE")
        .ok_or_else(|| anyhow!("a seed file is required"))?;
    let depth = *sub_matches
        .get_one::<i64>("DEPTH")
        .ok_or_else(|| anyhow!("a crawl depth is required"))?;
    let workers = sub_matches
        .get_one::<usize>("workers")
        .copied()
        .unwrap_or(CrawlConfig::default().workers);
    let dry_run = sub_matches.get_flag("dry-run");

    let seeds = load_seeds_from_file(seed_file).map_err(anyhow::Error::msg)?;
    let config = Config::from_env()?;
    let fetcher = TransactionFetcher::new(config.electrum_client());

    match fetcher.client().server_version().await {
        Ok(Some(version)) => info!("Connected to {}: {}", fetcher.client().endpoint(), version),
        Ok(None) => warn!("{} is not answering; crawl will likely fail", fetcher.client().endpoint()),
        Err(e) => warn!("Version check against {} failed: {}", fetcher.client().endpoint(), e),
    }

    println!("\n⛓  Crawling {} seed addresses", seeds.len());
    println!("Workers: {}", workers);
    println!("Max depth: {}", depth);

    let crawl_config = CrawlConfig {
        workers,
        ..Default::default()
    };
    let source: Arc<dyn LedgerSource> = Arc::new(fetcher);

    let (summary, stats) = if dry_run {
        println!("Store: in-memory (dry run)\n");
        let store = Arc::new(MemoryGraphStore::new());
        let summary = run_crawl(source, store.clone(), crawl_config, &seeds, depth, !quiet).await;
        (summary, store.stats()?)
    } else {
        let location = config.graph_store_location()?;
        println!("Store: {}\n", location);
        let store = Arc::new(
            SqliteGraphStore::open(&location)
                .with_context(|| format!("Failed to open graph store at {}", location))?,
        );

        let run_id = store.begin_run(&seeds, depth)?;
        let summary = run_crawl(source, store.clone(), crawl_config, &seeds, depth, !quiet).await;
        let status = if summary.completed == 0 && summary.failed > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        store.finish_run(&run_id, status)?;
        info!("Crawl run {} finished: {}", run_id, status.as_str());
        (summary, store.stats()?)
    };

    println!("\n{} Crawl complete!\n", "✓".green().bold());
    print!("{}", generate_crawl_report(&summary, &stats));
    Ok(())
}

pub async fn handle_enrich(sub_matches: &ArgMatches) -> anyhow::Result<()> {
    let batch_size = sub_matches
        .get_one::<usize>("batch-size")
        .copied()
        .unwrap_or(DEFAULT_BATCH_SIZE);

    let config = Config::from_env()?;
    let (endpoint, token) = config.enrichment()?;
    let store = open_existing_store(&config)?;
    let client = EnrichmentClient::new(endpoint, token)?;

    println!("\n🏷  Enriching addresses via {}", client.endpoint());
    println!("Batch size: {}\n", batch_size);

    let summary = run_enrichment(&store, &client, batch_size).await?;

    print_divider();
    println!("  Addresses: {}", summary.addresses);
    println!("  Batches: {}", summary.batches);
    if summary.failed_batches > 0 {
        println!(
            "  Failed batches: {}",
            summary.failed_batches.to_string().red().bold()
        );
    } else {
        println!("  Failed batches: 0");
    }
    println!("  Tagged: {}", summary.tagged.to_string().green().bold());
    print_divider();
    Ok(())
}

pub fn handle_stats(sub_matches: &ArgMatches) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let store = open_existing_store(&config)?;
    let stats = store.stats()?;

    if sub_matches.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("Store: {}\n", store.location());
        print!("{}", generate_graph_report(&stats));
    }
    Ok(())
}

fn open_existing_store(config: &Config) -> anyhow::Result<SqliteGraphStore> {
    let location = config.graph_store_location()?;
    if !location.starts_with("file:") && !SqliteGraphStore::exists(Path::new(&location)) {
        bail!("No graph store at {}; run a crawl first", location);
    }
    SqliteGraphStore::open(&location)
        .with_context(|| format!("Failed to open graph store at {}", location))
}
