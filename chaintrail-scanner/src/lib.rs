pub mod electrum;
pub mod error;
pub mod fetcher;
pub mod retry;
pub mod script;
pub mod tx;

pub use electrum::ElectrumClient;
pub use error::ScanError;
pub use fetcher::{LedgerSource, TransactionFetcher};
pub use retry::{Attempt, RetryPolicy};
pub use script::{AddressKind, address_to_scripthash};
pub use tx::{AddressData, HistoryEntry, Transaction, TxInput, TxOutput};
