use serde::{Deserialize, Serialize};

pub const SATOSHIS_PER_COIN: f64 = 100_000_000.0;

/// One entry of `blockchain.scripthash.get_history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub tx_hash: String,
    #[serde(default)]
    pub height: i64,
}

impl HistoryEntry {
    /// Confirmed height, or None for mempool entries (height 0 or -1).
    pub fn block_height(&self) -> Option<i64> {
        (self.height > 0).then_some(self.height)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptPubKey {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl ScriptPubKey {
    /// Newer nodes report a single `address`, older ones an `addresses` list.
    pub fn address(&self) -> Option<&str> {
        self.address
            .as_deref()
            .or_else(|| self.addresses.first().map(String::as_str))
            .filter(|a| !a.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxInput {
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub vout: Option<u32>,
    #[serde(default)]
    pub coinbase: Option<String>,
}

impl TxInput {
    /// The previous output this input spends. None for coinbase inputs.
    pub fn outpoint(&self) -> Option<(&str, u32)> {
        if self.coinbase.is_some() {
            return None;
        }
        match (self.txid.as_deref(), self.vout) {
            (Some(txid), Some(vout)) if !txid.is_empty() => Some((txid, vout)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub n: u32,
    #[serde(default, rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

impl TxOutput {
    pub fn amount(&self) -> f64 {
        self.value / SATOSHIS_PER_COIN
    }

    pub fn address(&self) -> Option<&str> {
        self.script_pub_key.address()
    }
}

/// Verbose transaction as returned by `blockchain.transaction.get`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub txid: String,
    #[serde(default)]
    pub time: Option<i64>,
    #[serde(default)]
    pub fee: Option<f64>,
    #[serde(default)]
    pub vin: Vec<TxInput>,
    #[serde(default)]
    pub vout: Vec<TxOutput>,
    /// Attached from the history entry, not part of the node's response.
    #[serde(default)]
    pub block_height: Option<i64>,
}

impl Transaction {
    pub fn timestamp(&self) -> i64 {
        self.time.unwrap_or(0)
    }

    pub fn fee_coins(&self) -> f64 {
        self.fee.unwrap_or(0.0) / SATOSHIS_PER_COIN
    }

    pub fn output_sum(&self) -> f64 {
        self.vout.iter().map(TxOutput::amount).sum()
    }

    pub fn pays_to(&self, address: &str) -> bool {
        self.vout.iter().any(|o| o.address() == Some(address))
    }
}

/// Everything fetched for one address in a single pass.
#[derive(Debug, Clone, Default)]
pub struct AddressData {
    pub address: String,
    pub txs: Vec<Transaction>,
}
