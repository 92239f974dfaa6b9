// Tests for the crawl scheduler

use async_trait::async_trait;
use chaintrail_core::crawl::{
    CrawlConfig, CrawlSummary, Scheduler, generate_crawl_report,
};
use chaintrail_core::memory::MemoryGraphStore;
use chaintrail_core::model::{AddressLabel, GraphStats};
use chaintrail_core::store::{GraphSession, GraphStore};
use chaintrail_core::{StoreError, StoreResult};
use chaintrail_scanner::tx::ScriptPubKey;
use chaintrail_scanner::{AddressData, LedgerSource, ScanError, Transaction, TxInput, TxOutput};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Fixtures
// ============================================================================

/// Ledger served from memory. Addresses starting with "bad" fail to fetch.
#[derive(Default)]
struct FakeLedger {
    histories: HashMap<String, Vec<Transaction>>,
    transactions: HashMap<String, Transaction>,
    fetches: Mutex<Vec<String>>,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeLedger {
    fn with_history(mut self, address: &str, txs: Vec<Transaction>) -> Self {
        self.histories.insert(address.to_string(), txs);
        self
    }

    fn with_transaction(mut self, tx: Transaction) -> Self {
        self.transactions.insert(tx.txid.clone(), tx);
        self
    }

    fn fetches(&self) -> Vec<String> {
        let mut fetches = self.fetches.lock().unwrap().clone();
        fetches.sort();
        fetches
    }

    fn fetch_count(&self, address: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|a| *a == address)
            .count()
    }
}

#[async_trait]
impl LedgerSource for FakeLedger {
    async fn address_data(&self, address: &str) -> Result<AddressData, ScanError> {
        self.fetches.lock().unwrap().push(address.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if address.starts_with("bad") {
            return Err(ScanError::invalid_address(address, "unsupported address type"));
        }
        Ok(AddressData {
            address: address.to_string(),
            txs: self.histories.get(address).cloned().unwrap_or_default(),
        })
    }

    async fn transaction(&self, txid: &str) -> Result<Option<Transaction>, ScanError> {
        Ok(self.transactions.get(txid).cloned())
    }
}

/// Store whose sessions can never be opened.
struct BrokenStore;

impl GraphStore for BrokenStore {
    fn session(&self) -> StoreResult<Box<dyn GraphSession + Send + '_>> {
        Err(StoreError::Poisoned)
    }

    fn addresses(&self) -> StoreResult<Vec<String>> {
        Ok(Vec::new())
    }

    fn tag_address(&self, _: &str, _: &str, _: Option<&str>) -> StoreResult<bool> {
        Ok(false)
    }

    fn stats(&self) -> StoreResult<GraphStats> {
        Ok(GraphStats::default())
    }
}

fn test_config() -> CrawlConfig {
    CrawlConfig {
        workers: 4,
        pause: Duration::ZERO,
        poll_interval: Duration::from_millis(20),
        ..Default::default()
    }
}

fn scheduler(ledger: &Arc<FakeLedger>, store: &Arc<MemoryGraphStore>) -> Arc<Scheduler> {
    Arc::new(Scheduler::new(ledger.clone(), store.clone(), test_config()))
}

fn output(address: &str, sats: f64, n: u32) -> TxOutput {
    TxOutput {
        value: sats,
        n,
        script_pub_key: ScriptPubKey {
            address: Some(address.to_string()),
            addresses: Vec::new(),
        },
    }
}

fn spend(txid: &str, vout: u32) -> TxInput {
    TxInput {
        txid: Some(txid.to_string()),
        vout: Some(vout),
        coinbase: None,
    }
}

fn tx(txid: &str, vin: Vec<TxInput>, vout: Vec<TxOutput>) -> Transaction {
    Transaction {
        txid: txid.to_string(),
        time: Some(1_600_000_000),
        fee: Some(1_000.0),
        vin,
        vout,
        block_height: Some(700_000),
    }
}

// ============================================================================
// Visited Frontier Tests
// ============================================================================

#[tokio::test]
async fn test_shallower_resubmission_is_skipped() {
    let ledger = Arc::new(FakeLedger::default());
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    scheduler.submit("1X".to_string(), 3, false);
    scheduler.drain().await;
    scheduler.submit("1X".to_string(), 2, false);
    scheduler.drain().await;

    assert_eq!(ledger.fetch_count("1X"), 1);
    assert_eq!(scheduler.visited_depth("1X").await, Some(3));

    let summary = scheduler.summary().await;
    assert_eq!(summary.completed, 1);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn test_deeper_resubmission_is_expanded_again() {
    let ledger = Arc::new(FakeLedger::default());
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    scheduler.submit("1X".to_string(), 3, false);
    scheduler.drain().await;
    scheduler.submit("1X".to_string(), 5, false);
    scheduler.drain().await;

    assert_eq!(ledger.fetch_count("1X"), 2);
    assert_eq!(scheduler.visited_depth("1X").await, Some(5));
}

#[tokio::test]
async fn test_equal_depth_resubmission_is_skipped() {
    let ledger = Arc::new(FakeLedger::default());
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    scheduler.submit("1X".to_string(), 2, false);
    scheduler.submit("1X".to_string(), 2, false);
    scheduler.drain().await;

    assert_eq!(ledger.fetch_count("1X"), 1);
}

#[tokio::test]
async fn test_zero_depth_is_a_no_op() {
    let ledger = Arc::new(FakeLedger::default());
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    let summary = scheduler.run(&["1X".to_string()], 0).await;

    assert!(ledger.fetches().is_empty());
    assert_eq!(store.node_count(), 0);
    assert_eq!(
        summary,
        CrawlSummary {
            submitted: 1,
            skipped: 1,
            ..Default::default()
        }
    );
}

// ============================================================================
// Expansion Tests
// ============================================================================

#[tokio::test]
async fn test_one_hop_graph() {
    // A's history holds T1, which spends P0:0 (owned by B) and pays C 0.5
    let ledger = Arc::new(
        FakeLedger::default()
            .with_history(
                "1A",
                vec![tx("t1", vec![spend("p0", 0)], vec![output("1C", 50_000_000.0, 0)])],
            )
            .with_transaction(tx("p0", Vec::new(), vec![output("1B", 60_000_000.0, 0)])),
    );
    let store = Arc::new(MemoryGraphStore::new());

    let started: Arc<Mutex<Vec<(String, i64)>>> = Arc::new(Mutex::new(Vec::new()));
    let started_clone = started.clone();
    let scheduler = Arc::new(
        Scheduler::new(ledger.clone(), store.clone(), test_config()).with_progress_callback(
            Arc::new(move |address: &str, depth: i64| {
                started_clone.lock().unwrap().push((address.to_string(), depth));
            }),
        ),
    );

    let summary = scheduler.run(&["1A".to_string()], 2).await;

    // Nodes: A, T1, B, C
    assert_eq!(store.node_count(), 4);
    assert!(store.has_address("1A"));
    assert!(store.has_address("1B"));
    assert!(store.has_address("1C"));
    assert!(store.has_transaction("t1"));
    assert!(!store.has_transaction("p0"));

    // Edges: B -> T1, T1 -(0.5)-> C
    assert_eq!(store.edge_count(), 2);
    assert_eq!(store.input_links("t1"), vec!["1B".to_string()]);
    assert_eq!(store.output_links("t1"), vec![("1C".to_string(), 0.5)]);

    assert_eq!(store.labels("1A"), vec![AddressLabel::Seed]);
    assert!(store.labels("1B").is_empty());

    let record = store.transaction("t1").unwrap();
    assert_eq!(record.block_height, Some(700_000));
    assert_eq!(record.fee, 0.00001);

    let mut started = started.lock().unwrap().clone();
    started.sort();
    assert_eq!(
        started,
        vec![
            ("1A".to_string(), 2),
            ("1B".to_string(), 1),
            ("1C".to_string(), 1),
        ]
    );

    assert_eq!(summary.submitted, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.visited, 3);
}

#[tokio::test]
async fn test_children_at_depth_zero_are_not_fetched() {
    let ledger = Arc::new(FakeLedger::default().with_history(
        "1A",
        vec![tx("t1", Vec::new(), vec![output("1C", 1_000.0, 0)])],
    ));
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    let summary = scheduler.run(&["1A".to_string()], 1).await;

    assert_eq!(ledger.fetches(), vec!["1A".to_string()]);
    // C is recorded as a counterparty even though it is not expanded
    assert!(store.has_address("1C"));
    assert_eq!(summary.submitted, 2);
    assert_eq!(summary.skipped, 1);
}

#[tokio::test]
async fn test_unresolvable_inputs_are_skipped() {
    let coinbase = TxInput {
        coinbase: Some("03a0bb0d".to_string()),
        ..Default::default()
    };
    let ledger = Arc::new(
        FakeLedger::default()
            .with_history(
                "1A",
                vec![tx(
                    "t1",
                    vec![coinbase, spend("missing", 0), spend("p0", 7)],
                    vec![output("1C", 1_000.0, 0)],
                )],
            )
            .with_transaction(tx("p0", Vec::new(), vec![output("1B", 1_000.0, 0)])),
    );
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    scheduler.run(&["1A".to_string()], 2).await;

    assert!(store.input_links("t1").is_empty());
    assert!(!store.has_address("1B"));
    assert_eq!(store.output_links("t1"), vec![("1C".to_string(), 0.00001)]);
}

#[tokio::test]
async fn test_fetch_failure_does_not_stop_crawl() {
    let ledger = Arc::new(FakeLedger::default().with_history(
        "1good",
        vec![tx("t1", Vec::new(), vec![output("1C", 1_000.0, 0)])],
    ));
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    let summary = scheduler
        .run(&["bad-seed".to_string(), "1good".to_string()], 2)
        .await;

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed, 2);
    assert!(!store.has_address("bad-seed"));
    assert!(store.has_address("1good"));
    assert_eq!(store.labels("1good"), vec![AddressLabel::Seed]);
}

#[tokio::test]
async fn test_store_failure_fails_branch() {
    let ledger = Arc::new(FakeLedger::default());
    let scheduler = Arc::new(Scheduler::new(ledger.clone(), Arc::new(BrokenStore), test_config()));

    let summary = scheduler.run(&["1A".to_string()], 2).await;

    assert_eq!(ledger.fetches(), vec!["1A".to_string()]);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.completed, 0);
}

// ============================================================================
// Service Heuristic Tests
// ============================================================================

#[tokio::test]
async fn test_busy_address_is_service_and_not_expanded() {
    let history: Vec<Transaction> = (0..101)
        .map(|i| tx(&format!("t{}", i), Vec::new(), vec![output(&format!("1peer{}", i), 1_000.0, 0)]))
        .collect();
    let ledger = Arc::new(FakeLedger::default().with_history("1S", history));
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    let summary = scheduler.run(&["1S".to_string()], 3).await;

    assert_eq!(summary.submitted, 1);
    assert_eq!(ledger.fetches(), vec!["1S".to_string()]);
    assert_eq!(
        store.labels("1S"),
        vec![AddressLabel::Seed, AddressLabel::Service]
    );
    assert_eq!(store.node_count(), 1);
}

#[tokio::test]
async fn test_hundred_transactions_still_expanded() {
    let history: Vec<Transaction> = (0..100)
        .map(|i| tx(&format!("t{}", i), Vec::new(), vec![output("1peer", 1_000.0, 0)]))
        .collect();
    let ledger = Arc::new(FakeLedger::default().with_history("1S", history));
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    scheduler.run(&["1S".to_string()], 2).await;

    assert_eq!(ledger.fetch_count("1peer"), 1);
    assert_eq!(store.labels("1S"), vec![AddressLabel::Seed]);
}

#[tokio::test]
async fn test_large_output_sum_keeps_only_direct_edge() {
    // 10 coins to a whale and 1 coin back to A: over the 5 coin limit
    let ledger = Arc::new(
        FakeLedger::default()
            .with_history(
                "1A",
                vec![tx(
                    "big",
                    vec![spend("p0", 0)],
                    vec![
                        output("1whale", 1_000_000_000.0, 0),
                        output("1A", 100_000_000.0, 1),
                    ],
                )],
            )
            .with_transaction(tx("p0", Vec::new(), vec![output("1B", 1_000.0, 0)])),
    );
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    let summary = scheduler.run(&["1A".to_string()], 3).await;

    assert_eq!(summary.submitted, 1);
    assert!(store.labels("1A").contains(&AddressLabel::Service));
    assert!(store.has_transaction("big"));
    assert_eq!(store.output_links("big"), vec![("1A".to_string(), 1.0)]);
    assert!(store.input_links("big").is_empty());
    assert!(!store.has_address("1whale"));
    assert!(!store.has_address("1B"));
}

#[tokio::test]
async fn test_wide_transaction_records_funding_edge() {
    let outputs: Vec<TxOutput> = (0..21)
        .map(|i| output(&format!("1payee{}", i), 1_000.0, i))
        .collect();
    let ledger = Arc::new(
        FakeLedger::default().with_history("1A", vec![tx("wide", vec![spend("p0", 0)], outputs)]),
    );
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    let summary = scheduler.run(&["1A".to_string()], 3).await;

    assert_eq!(summary.submitted, 1);
    assert!(store.labels("1A").contains(&AddressLabel::Service));
    assert_eq!(store.input_links("wide"), vec!["1A".to_string()]);
    assert!(store.output_links("wide").is_empty());
}

#[tokio::test]
async fn test_service_transaction_does_not_block_others() {
    let wide: Vec<TxOutput> = (0..21)
        .map(|i| output(&format!("1payee{}", i), 1_000.0, i))
        .collect();
    let ledger = Arc::new(FakeLedger::default().with_history(
        "1A",
        vec![
            tx("wide", Vec::new(), wide),
            tx("small", Vec::new(), vec![output("1C", 1_000.0, 0)]),
        ],
    ));
    let store = Arc::new(MemoryGraphStore::new());
    let scheduler = scheduler(&ledger, &store);

    scheduler.run(&["1A".to_string()], 2).await;

    assert_eq!(ledger.fetch_count("1C"), 1);
    assert_eq!(ledger.fetch_count("1payee0"), 0);
}

// ============================================================================
// Worker Pool Tests
// ============================================================================

#[tokio::test]
async fn test_pool_bounds_concurrency() {
    let ledger = Arc::new(FakeLedger {
        delay: Duration::from_millis(20),
        ..Default::default()
    });
    let store = Arc::new(MemoryGraphStore::new());
    let config = CrawlConfig {
        workers: 2,
        ..test_config()
    };
    let scheduler = Arc::new(Scheduler::new(ledger.clone(), store.clone(), config));

    let seeds: Vec<String> = (0..8).map(|i| format!("1seed{}", i)).collect();
    let summary = scheduler.run(&seeds, 1).await;

    assert_eq!(summary.completed, 8);
    assert!(ledger.max_in_flight.load(Ordering::SeqCst) <= 2);
    assert_eq!(store.stats().unwrap().seed_addresses, 8);
}

// ============================================================================
// Report Tests
// ============================================================================

#[test]
fn test_crawl_report_contents() {
    let summary = CrawlSummary {
        submitted: 12,
        skipped: 4,
        failed: 1,
        completed: 7,
        visited: 8,
    };
    let stats = GraphStats {
        addresses: 8,
        transactions: 5,
        input_links: 3,
        output_links: 9,
        service_addresses: 1,
        seed_addresses: 2,
        tagged_addresses: 0,
    };

    let report = generate_crawl_report(&summary, &stats);
    assert!(report.contains("Jobs submitted: 12"));
    assert!(report.contains("Addresses expanded: 7"));
    assert!(report.contains("Jobs failed: 1"));
    assert!(report.contains("Transactions: 5"));
    assert!(report.contains("Output links: 9"));
    assert!(report.contains("service: 1"));
}
