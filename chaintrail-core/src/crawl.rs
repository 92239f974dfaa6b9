//! Depth-bounded, concurrent address crawler.
//!
//! Every address is a job. A job fetches the address's transactions, writes
//! them through the [`GraphStore`], and submits one child job per counterparty
//! at `depth - 1`. Jobs never wait for their children; the run ends when the
//! job registry drains.

use crate::error::StoreResult;
use crate::model::{AddressLabel, GraphStats, TransactionRecord};
use crate::store::{GraphSession, GraphStore};
use chaintrail_scanner::{AddressData, LedgerSource, Transaction, TxInput};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Called with (address, remaining depth) when a job starts processing.
pub type CrawlProgressCallback = Arc<dyn Fn(&str, i64) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum number of jobs running at once.
    pub workers: usize,
    /// Addresses with more transactions than this are labelled Service and
    /// not expanded.
    pub service_tx_limit: usize,
    /// A transaction moving more than this many coins is not expanded.
    pub service_output_sum: f64,
    /// A transaction with more inputs or outputs than this is not expanded.
    pub service_fanout: usize,
    /// Pause after each address, to go easy on the upstream server.
    pub pause: Duration,
    /// How often the drain loop reports on pending jobs.
    pub poll_interval: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            workers: 50,
            service_tx_limit: 100,
            service_output_sum: 5.0,
            service_fanout: 20,
            pause: Duration::from_millis(50),
            poll_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Skipped,
    Failed,
    Completed,
}

#[derive(Debug, Default)]
struct CrawlStats {
    submitted: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
    completed: AtomicUsize,
}

impl CrawlStats {
    fn record(&self, outcome: JobOutcome) {
        let counter = match outcome {
            JobOutcome::Skipped => &self.skipped,
            JobOutcome::Failed => &self.failed,
            JobOutcome::Completed => &self.completed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    pub submitted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub completed: usize,
    /// Distinct addresses that made it past the visited check.
    pub visited: usize,
}

pub struct Scheduler {
    source: Arc<dyn LedgerSource>,
    store: Arc<dyn GraphStore>,
    config: CrawlConfig,
    pool: Arc<Semaphore>,
    frontier: Mutex<HashMap<String, i64>>,
    registry: StdMutex<Vec<JoinHandle<()>>>,
    stats: CrawlStats,
    progress_callback: Option<CrawlProgressCallback>,
}

impl Scheduler {
    pub fn new(
        source: Arc<dyn LedgerSource>,
        store: Arc<dyn GraphStore>,
        config: CrawlConfig,
    ) -> Self {
        let pool = Arc::new(Semaphore::new(config.workers.max(1)));
        Self {
            source,
            store,
            config,
            pool,
            frontier: Mutex::new(HashMap::new()),
            registry: StdMutex::new(Vec::new()),
            stats: CrawlStats::default(),
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: CrawlProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Submit every seed at `depth` and wait for the crawl to finish.
    pub async fn run(self: &Arc<Self>, seeds: &[String], depth: i64) -> CrawlSummary {
        info!(
            "Starting crawl of {} seeds at depth {} with {} workers",
            seeds.len(),
            depth,
            self.config.workers
        );

        for seed in seeds {
            self.submit(seed.clone(), depth, true);
        }
        self.drain().await;
        self.pool.close();

        let summary = self.summary().await;
        info!(
            "Crawl complete. {} jobs: {} completed, {} skipped, {} failed",
            summary.submitted, summary.completed, summary.skipped, summary.failed
        );
        summary
    }

    /// Queue a crawl job. Never blocks: admission happens inside the job,
    /// when it waits for a pool permit.
    pub fn submit(self: &Arc<Self>, address: String, depth: i64, is_seed: bool) {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let Ok(_permit) = this.pool.clone().acquire_owned().await else {
                warn!("Worker pool closed, dropping job for {}", address);
                return;
            };
            let outcome = this.crawl(&address, depth, is_seed).await;
            this.stats.record(outcome);
        });

        self.registry().push(handle);
    }

    /// Wait until no job is in flight, logging progress every poll interval.
    pub async fn drain(&self) {
        loop {
            let mut handles = std::mem::take(&mut *self.registry());
            if handles.is_empty() {
                break;
            }

            let finished = {
                let waiting = futures::future::join_all(handles.iter_mut());
                tokio::time::timeout(self.config.poll_interval, waiting).await
            };
            match finished {
                Ok(results) => {
                    for result in results {
                        if let Err(e) = result {
                            warn!("Crawl job aborted: {}", e);
                        }
                    }
                }
                Err(_) => {
                    handles.retain(|h| !h.is_finished());
                    let mut registry = self.registry();
                    registry.extend(handles);
                    info!("{} crawl jobs still pending...", registry.len());
                }
            }
        }
        info!("All crawl jobs completed.");
    }

    pub async fn summary(&self) -> CrawlSummary {
        CrawlSummary {
            submitted: self.stats.submitted.load(Ordering::Relaxed),
            skipped: self.stats.skipped.load(Ordering::Relaxed),
            failed: self.stats.failed.load(Ordering::Relaxed),
            completed: self.stats.completed.load(Ordering::Relaxed),
            visited: self.frontier.lock().await.len(),
        }
    }

    /// Remaining depth recorded for `address`, if it was ever expanded.
    pub async fn visited_depth(&self, address: &str) -> Option<i64> {
        self.frontier.lock().await.get(address).copied()
    }

    fn registry(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.registry
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record `depth` for `address` unless it was already scheduled at least
    /// that deep.
    async fn check_and_mark(&self, address: &str, depth: i64) -> bool {
        let mut frontier = self.frontier.lock().await;
        match frontier.get(address) {
            Some(&existing) if existing >= depth => false,
            _ => {
                frontier.insert(address.to_string(), depth);
                true
            }
        }
    }

    async fn crawl(self: &Arc<Self>, address: &str, depth: i64, is_seed: bool) -> JobOutcome {
        if depth <= 0 || !self.check_and_mark(address, depth).await {
            debug!("Skipping {} (depth {})", address, depth);
            return JobOutcome::Skipped;
        }

        if let Some(ref callback) = self.progress_callback {
            callback(address, depth);
        }
        info!("Crawling {} (depth {})", address, depth);

        let data = match self.source.address_data(address).await {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to fetch {}: {}", address, e);
                return JobOutcome::Failed;
            }
        };

        match self.record(&data, depth, is_seed).await {
            Ok(()) => JobOutcome::Completed,
            Err(e) => {
                warn!("Failed to record {}: {}", address, e);
                JobOutcome::Failed
            }
        }
    }

    async fn record(self: &Arc<Self>, data: &AddressData, depth: i64, is_seed: bool) -> StoreResult<()> {
        let address = data.address.as_str();
        let mut session = self.store.session()?;

        session.upsert_address(address)?;
        if is_seed {
            session.label_address(address, AddressLabel::Seed)?;
        }

        if data.txs.len() > self.config.service_tx_limit {
            session.label_address(address, AddressLabel::Service)?;
            info!(
                "Skipping {}: too many transactions ({})",
                address,
                data.txs.len()
            );
            return Ok(());
        }

        for tx in &data.txs {
            session.upsert_transaction(&TransactionRecord::from(tx))?;

            if let Some(reason) = self.service_signal(tx) {
                info!("Skipping {} TX {}: {}", address, tx.txid, reason);
                session.label_address(address, AddressLabel::Service)?;
                link_direct(session.as_mut(), address, tx)?;
                continue;
            }

            debug!(
                "{} TX {}: {} inputs, {} outputs",
                address,
                tx.txid,
                tx.vin.len(),
                tx.vout.len()
            );

            for input in &tx.vin {
                let Some(funder) = self.resolve_input(tx, input).await else {
                    continue;
                };
                session.upsert_address(&funder)?;
                session.link_input(&funder, &tx.txid)?;
                self.submit(funder, depth - 1, false);
            }

            for output in &tx.vout {
                let Some(recipient) = output.address() else {
                    continue;
                };
                session.upsert_address(recipient)?;
                session.link_output(&tx.txid, recipient, output.amount())?;
                self.submit(recipient.to_string(), depth - 1, false);
            }
        }

        drop(session);
        tokio::time::sleep(self.config.pause).await;
        Ok(())
    }

    fn service_signal(&self, tx: &Transaction) -> Option<String> {
        let output_sum = tx.output_sum();
        if output_sum > self.config.service_output_sum {
            return Some(format!("output sum too high ({:.8})", output_sum));
        }
        if tx.vin.len() > self.config.service_fanout || tx.vout.len() > self.config.service_fanout {
            return Some(format!(
                "too many inputs/outputs ({}/{})",
                tx.vin.len(),
                tx.vout.len()
            ));
        }
        None
    }

    /// Address that owned the output spent by `input`.
    async fn resolve_input(&self, tx: &Transaction, input: &TxInput) -> Option<String> {
        let Some((prev_txid, index)) = input.outpoint() else {
            debug!("TX {}: input without previous output, skipping", tx.txid);
            return None;
        };

        match self.source.transaction(prev_txid).await {
            Ok(Some(prev)) => {
                let address = prev
                    .vout
                    .get(index as usize)
                    .and_then(|o| o.address())
                    .map(str::to_string);
                if address.is_none() {
                    debug!("TX {}: no address at {}:{}", tx.txid, prev_txid, index);
                }
                address
            }
            Ok(None) => {
                debug!("TX {}: previous tx {} unavailable", tx.txid, prev_txid);
                None
            }
            Err(e) => {
                warn!("Failed to fetch prev tx {}: {}", prev_txid, e);
                None
            }
        }
    }
}

/// Keep the edge between `address` and a transaction that is not expanded.
/// Outputs paying `address` are recorded as such; if there are none the
/// address must have funded the transaction.
fn link_direct(session: &mut dyn GraphSession, address: &str, tx: &Transaction) -> StoreResult<()> {
    let mut paid = false;
    for output in tx.vout.iter().filter(|o| o.address() == Some(address)) {
        session.link_output(&tx.txid, address, output.amount())?;
        paid = true;
    }
    if !paid {
        session.link_input(address, &tx.txid)?;
    }
    Ok(())
}

/// Render a run summary and the store totals for the terminal.
pub fn generate_crawl_report(summary: &CrawlSummary, stats: &GraphStats) -> String {
    let mut report = String::new();
    report.push_str("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    report.push_str("# Crawl:\n");
    report.push_str(&format!("  Jobs submitted: {}\n", summary.submitted));
    report.push_str(&format!("  Addresses expanded: {}\n", summary.completed));
    report.push_str(&format!("  Jobs skipped: {}\n", summary.skipped));
    report.push_str(&format!("  Jobs failed: {}\n", summary.failed));
    report.push_str(&format!("  Distinct addresses visited: {}\n", summary.visited));
    report.push('\n');
    report.push_str(&generate_graph_report(stats));
    report
}

pub fn generate_graph_report(stats: &GraphStats) -> String {
    let mut report = String::new();
    report.push_str("# Graph:\n");
    report.push_str(&format!("  Addresses: {}\n", stats.addresses));
    report.push_str(&format!("    seed: {}\n", stats.seed_addresses));
    report.push_str(&format!("    service: {}\n", stats.service_addresses));
    report.push_str(&format!("    tagged: {}\n", stats.tagged_addresses));
    report.push_str(&format!("  Transactions: {}\n", stats.transactions));
    report.push_str(&format!("  Input links: {}\n", stats.input_links));
    report.push_str(&format!("  Output links: {}\n", stats.output_links));
    report.push_str("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
    report
}
