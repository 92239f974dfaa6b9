//! Graph store capability surface.
//!
//! Every write is an idempotent upsert keyed by natural id: repeating a call
//! with the same arguments leaves the stored graph unchanged. Labels are only
//! ever added.

use crate::error::StoreResult;
use crate::model::{AddressLabel, GraphStats, TransactionRecord};

/// Writes performed while processing one address.
pub trait GraphSession {
    fn upsert_address(&mut self, address: &str) -> StoreResult<()>;

    fn upsert_transaction(&mut self, tx: &TransactionRecord) -> StoreResult<()>;

    fn label_address(&mut self, address: &str, label: AddressLabel) -> StoreResult<()>;

    /// `address` funded `txid`.
    fn link_input(&mut self, address: &str, txid: &str) -> StoreResult<()>;

    /// `txid` paid `amount` whole coins to `address`.
    fn link_output(&mut self, txid: &str, address: &str, amount: f64) -> StoreResult<()>;
}

pub trait GraphStore: Send + Sync {
    /// Acquire a session. It is released when dropped.
    fn session(&self) -> StoreResult<Box<dyn GraphSession + Send + '_>>;

    fn addresses(&self) -> StoreResult<Vec<String>>;

    /// Attach an external entity tag. Returns whether the address existed.
    fn tag_address(&self, address: &str, tag: &str, category: Option<&str>) -> StoreResult<bool>;

    fn stats(&self) -> StoreResult<GraphStats>;
}
