use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Protocol error from server: {0}")]
    Protocol(String),

    #[error("History unavailable for {0}")]
    HistoryUnavailable(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    pub fn invalid_address(address: &str, reason: impl Into<String>) -> Self {
        ScanError::InvalidAddress {
            address: address.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
