use chaintrail_scanner::Transaction;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AddressLabel {
    Seed,
    Service,
    Unknown,
}

impl AddressLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressLabel::Seed => "seed",
            AddressLabel::Service => "service",
            AddressLabel::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AddressLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddressLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "seed" => Ok(AddressLabel::Seed),
            "service" => Ok(AddressLabel::Service),
            "unknown" => Ok(AddressLabel::Unknown),
            other => Err(format!("unknown address label '{}'", other)),
        }
    }
}

/// Transaction node attributes as written to the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub txid: String,
    pub timestamp: i64,
    pub block_height: Option<i64>,
    /// Whole coins.
    pub fee: f64,
}

impl From<&Transaction> for TransactionRecord {
    fn from(tx: &Transaction) -> Self {
        Self {
            txid: tx.txid.clone(),
            timestamp: tx.timestamp(),
            block_height: tx.block_height,
            fee: tx.fee_coins(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphStats {
    pub addresses: usize,
    pub transactions: usize,
    pub input_links: usize,
    pub output_links: usize,
    pub service_addresses: usize,
    pub seed_addresses: usize,
    pub tagged_addresses: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_round_trip() {
        for label in [AddressLabel::Seed, AddressLabel::Service, AddressLabel::Unknown] {
            assert_eq!(label.as_str().parse::<AddressLabel>().unwrap(), label);
        }
        assert!("exchange".parse::<AddressLabel>().is_err());
    }

    #[test]
    fn test_record_from_transaction() {
        let tx = Transaction {
            txid: "t1".into(),
            time: Some(1_600_000_000),
            fee: Some(2_000.0),
            block_height: Some(650_000),
            ..Default::default()
        };
        let record = TransactionRecord::from(&tx);
        assert_eq!(record.txid, "t1");
        assert_eq!(record.timestamp, 1_600_000_000);
        assert_eq!(record.block_height, Some(650_000));
        assert!((record.fee - 0.00002).abs() < 1e-12);
    }
}
