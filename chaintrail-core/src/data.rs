use crate::error::{StoreError, StoreResult};
use crate::model::{AddressLabel, GraphStats, TransactionRecord};
use crate::store::{GraphSession, GraphStore};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// SQLite-backed graph store.
///
/// The store keeps one connection for bookkeeping and reads; every
/// [`GraphStore::session`] opens its own connection so workers do not
/// serialize on a shared handle. WAL mode lets readers proceed while a
/// writer holds the lock.
pub struct SqliteGraphStore {
    location: String,
    conn: Mutex<Connection>,
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

fn configure(conn: &Connection) -> StoreResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.execute_batch(
        "
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(())
}

impl SqliteGraphStore {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn drop(path: &Path) -> StoreResult<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    /// Open (creating if needed) the store at `location`, a filesystem path
    /// or a `file:` URI.
    pub fn open(location: &str) -> StoreResult<Self> {
        if let Some(parent) = Path::new(location).parent()
            && !location.starts_with("file:")
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(location)?;
        // journal_mode returns a row, so it cannot go through execute_batch
        let _mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        configure(&conn)?;

        let store = SqliteGraphStore {
            location: location.to_string(),
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.lock()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS addresses (
                address TEXT PRIMARY KEY,
                first_seen INTEGER NOT NULL,
                tag TEXT,
                category TEXT
            );

            -- Labels only accumulate; there is no delete path.
            CREATE TABLE IF NOT EXISTS address_labels (
                address TEXT NOT NULL,
                label TEXT NOT NULL CHECK(label IN ('seed', 'service', 'unknown')),
                labelled_at INTEGER NOT NULL,
                PRIMARY KEY(address, label),
                FOREIGN KEY(address) REFERENCES addresses(address) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS transactions (
                txid TEXT PRIMARY KEY,
                timestamp INTEGER NOT NULL DEFAULT 0,
                block_height INTEGER,      -- NULL while unconfirmed
                fee REAL NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS input_links (
                address TEXT NOT NULL,
                txid TEXT NOT NULL,
                PRIMARY KEY(address, txid),
                FOREIGN KEY(address) REFERENCES addresses(address) ON DELETE CASCADE,
                FOREIGN KEY(txid) REFERENCES transactions(txid) ON DELETE CASCADE
            );

            -- One row per distinct (txid, address, amount): several outputs of
            -- one transaction may pay the same address.
            CREATE TABLE IF NOT EXISTS output_links (
                txid TEXT NOT NULL,
                address TEXT NOT NULL,
                amount REAL NOT NULL,
                PRIMARY KEY(txid, address, amount),
                FOREIGN KEY(address) REFERENCES addresses(address) ON DELETE CASCADE,
                FOREIGN KEY(txid) REFERENCES transactions(txid) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_input_links_txid ON input_links(txid);
            CREATE INDEX IF NOT EXISTS idx_output_links_address ON output_links(address);
            CREATE INDEX IF NOT EXISTS idx_address_labels_label ON address_labels(label);

            CREATE TABLE IF NOT EXISTS crawl_runs (
                id TEXT PRIMARY KEY,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'failed')),
                depth INTEGER NOT NULL,
                seeds TEXT NOT NULL       -- JSON array
            );
            ",
        )?;
        Ok(())
    }

    // Run bookkeeping
    pub fn begin_run(&self, seeds: &[String], depth: i64) -> StoreResult<String> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let seeds_json = serde_json::to_string(seeds).unwrap_or_else(|_| "[]".to_string());

        self.lock()?.execute(
            "INSERT INTO crawl_runs (id, start_time, status, depth, seeds) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                &run_id,
                current_timestamp(),
                RunStatus::Running.as_str(),
                depth,
                seeds_json
            ],
        )?;
        Ok(run_id)
    }

    pub fn finish_run(&self, run_id: &str, status: RunStatus) -> StoreResult<()> {
        self.lock()?.execute(
            "UPDATE crawl_runs SET status = ?1, end_time = ?2 WHERE id = ?3",
            params![status.as_str(), current_timestamp(), run_id],
        )?;
        Ok(())
    }

    pub fn run_status(&self, run_id: &str) -> StoreResult<Option<String>> {
        let status = self
            .lock()?
            .query_row(
                "SELECT status FROM crawl_runs WHERE id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(status)
    }

    // Query helpers
    pub fn labels(&self, address: &str) -> StoreResult<Vec<AddressLabel>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT label FROM address_labels WHERE address = ?1 ORDER BY label")?;
        let raw = stmt
            .query_map(params![address], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(raw.iter().filter_map(|l| l.parse().ok()).collect())
    }

    pub fn tag(&self, address: &str) -> StoreResult<Option<(Option<String>, Option<String>)>> {
        let tag = self
            .lock()?
            .query_row(
                "SELECT tag, category FROM addresses WHERE address = ?1",
                params![address],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(tag)
    }

    pub fn transaction(&self, txid: &str) -> StoreResult<Option<TransactionRecord>> {
        let record = self
            .lock()?
            .query_row(
                "SELECT txid, timestamp, block_height, fee FROM transactions WHERE txid = ?1",
                params![txid],
                |row| {
                    Ok(TransactionRecord {
                        txid: row.get(0)?,
                        timestamp: row.get(1)?,
                        block_height: row.get(2)?,
                        fee: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn input_links(&self, txid: &str) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT address FROM input_links WHERE txid = ?1 ORDER BY address")?;
        let links = stmt
            .query_map(params![txid], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }

    pub fn output_links(&self, txid: &str) -> StoreResult<Vec<(String, f64)>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT address, amount FROM output_links WHERE txid = ?1 ORDER BY address, amount",
        )?;
        let links = stmt
            .query_map(params![txid], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(links)
    }
}

impl GraphStore for SqliteGraphStore {
    fn session(&self) -> StoreResult<Box<dyn GraphSession + Send + '_>> {
        let conn = Connection::open(&self.location)?;
        configure(&conn)?;
        Ok(Box::new(SqliteSession { conn }))
    }

    fn addresses(&self) -> StoreResult<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT address FROM addresses ORDER BY address")?;
        let addresses = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(addresses)
    }

    fn tag_address(&self, address: &str, tag: &str, category: Option<&str>) -> StoreResult<bool> {
        let changed = self.lock()?.execute(
            "UPDATE addresses SET tag = ?2, category = ?3 WHERE address = ?1",
            params![address, tag, category],
        )?;
        Ok(changed > 0)
    }

    fn stats(&self) -> StoreResult<GraphStats> {
        let conn = self.lock()?;
        let count = |sql: &str| -> StoreResult<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(GraphStats {
            addresses: count("SELECT COUNT(*) FROM addresses")?,
            transactions: count("SELECT COUNT(*) FROM transactions")?,
            input_links: count("SELECT COUNT(*) FROM input_links")?,
            output_links: count("SELECT COUNT(*) FROM output_links")?,
            service_addresses: count(
                "SELECT COUNT(*) FROM address_labels WHERE label = 'service'",
            )?,
            seed_addresses: count("SELECT COUNT(*) FROM address_labels WHERE label = 'seed'")?,
            tagged_addresses: count("SELECT COUNT(*) FROM addresses WHERE tag IS NOT NULL")?,
        })
    }
}

/// One connection, held for the duration of one address.
pub struct SqliteSession {
    conn: Connection,
}

impl GraphSession for SqliteSession {
    fn upsert_address(&mut self, address: &str) -> StoreResult<()> {
        self.conn
            .prepare_cached("INSERT OR IGNORE INTO addresses (address, first_seen) VALUES (?1, ?2)")?
            .execute(params![address, current_timestamp()])?;
        Ok(())
    }

    fn upsert_transaction(&mut self, tx: &TransactionRecord) -> StoreResult<()> {
        self.conn
            .prepare_cached(
                "INSERT INTO transactions (txid, timestamp, block_height, fee)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(txid) DO UPDATE SET
                    timestamp = excluded.timestamp,
                    block_height = excluded.block_height,
                    fee = excluded.fee",
            )?
            .execute(params![&tx.txid, tx.timestamp, tx.block_height, tx.fee])?;
        Ok(())
    }

    fn label_address(&mut self, address: &str, label: AddressLabel) -> StoreResult<()> {
        self.upsert_address(address)?;
        self.conn
            .prepare_cached(
                "INSERT OR IGNORE INTO address_labels (address, label, labelled_at) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![address, label.as_str(), current_timestamp()])?;
        Ok(())
    }

    fn link_input(&mut self, address: &str, txid: &str) -> StoreResult<()> {
        self.upsert_address(address)?;
        self.conn
            .prepare_cached("INSERT OR IGNORE INTO input_links (address, txid) VALUES (?1, ?2)")?
            .execute(params![address, txid])?;
        Ok(())
    }

    fn link_output(&mut self, txid: &str, address: &str, amount: f64) -> StoreResult<()> {
        self.upsert_address(address)?;
        self.conn
            .prepare_cached(
                "INSERT OR IGNORE INTO output_links (txid, address, amount) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![txid, address, amount])?;
        Ok(())
    }
}
