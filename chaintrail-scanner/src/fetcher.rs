use crate::electrum::ElectrumClient;
use crate::error::{Result, ScanError};
use crate::script::address_to_scripthash;
use crate::tx::{AddressData, Transaction};
use async_trait::async_trait;
use tracing::{debug, warn};

/// Where the crawler gets ledger data from.
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Every transaction touching `address`, with block heights attached.
    async fn address_data(&self, address: &str) -> Result<AddressData>;

    /// A single verbose transaction; `Ok(None)` when the server had nothing.
    async fn transaction(&self, txid: &str) -> Result<Option<Transaction>>;
}

/// [`LedgerSource`] backed by an ElectrumX server. Nothing is cached: every
/// call goes back to the network.
#[derive(Debug, Clone)]
pub struct TransactionFetcher {
    client: ElectrumClient,
}

impl TransactionFetcher {
    pub fn new(client: ElectrumClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ElectrumClient {
        &self.client
    }
}

#[async_trait]
impl LedgerSource for TransactionFetcher {
    async fn address_data(&self, address: &str) -> Result<AddressData> {
        let scripthash = address_to_scripthash(address)?;
        let history = self
            .client
            .scripthash_history(&scripthash)
            .await?
            .ok_or_else(|| ScanError::HistoryUnavailable(address.to_string()))?;

        debug!("{} has {} history entries", address, history.len());

        let mut txs = Vec::with_capacity(history.len());
        for entry in history {
            match self.client.transaction_verbose(&entry.tx_hash).await {
                Ok(Some(mut tx)) => {
                    tx.block_height = entry.block_height();
                    txs.push(tx);
                }
                Ok(None) => {
                    debug!("No data for {} (history of {}), skipping", entry.tx_hash, address);
                }
                Err(ScanError::MalformedResponse(reason)) => {
                    warn!("Skipping {}: {}", entry.tx_hash, reason);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(AddressData {
            address: address.to_string(),
            txs,
        })
    }

    async fn transaction(&self, txid: &str) -> Result<Option<Transaction>> {
        self.client.transaction_verbose(txid).await
    }
}
