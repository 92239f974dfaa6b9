//! Line-delimited JSON-RPC client for ElectrumX servers.
//!
//! Every call opens a fresh TCP connection, writes one request line and reads
//! until the first newline or EOF. Transport and parse failures are retried
//! through [`RetryPolicy`]; an `error` member in the response is reported as
//! [`ScanError::Protocol`] without retrying.

use crate::error::{Result, ScanError};
use crate::retry::{Attempt, RetryPolicy};
use crate::tx::{HistoryEntry, Transaction};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

pub const DEFAULT_PORT: u16 = 50001;
const READ_CHUNK: usize = 4096;
const MIN_RESPONSE_LEN: usize = 10;

#[derive(Debug, Clone)]
pub struct ElectrumClient {
    host: String,
    port: u16,
    timeout: Duration,
    retry: RetryPolicy,
}

impl ElectrumClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Perform one JSON-RPC call.
    ///
    /// Returns `Ok(None)` when the server could not be reached or kept sending
    /// garbage for every attempt, or when the result is JSON null.
    pub async fn call(&self, method: &str, params: Vec<Value>) -> Result<Option<Value>> {
        let request = json!({"id": 1, "method": method, "params": params});
        let mut line = serde_json::to_string(&request)?;
        line.push('\n');

        let label = format!("{} {}", method, Value::Array(params));
        let response = self
            .retry
            .run(&label, |_| self.attempt(&line))
            .await?;

        Ok(response.filter(|v| !v.is_null()))
    }

    async fn attempt(&self, line: &str) -> std::result::Result<Value, Attempt<ScanError>> {
        let raw = match tokio::time::timeout(self.timeout, self.exchange(line)).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => return Err(Attempt::Transient(ScanError::Transport(e))),
            Err(_) => return Err(Attempt::Transient(ScanError::Timeout(self.timeout.as_secs()))),
        };

        let text = String::from_utf8_lossy(&raw);
        let text = text.trim();
        if text.len() < MIN_RESPONSE_LEN {
            return Err(Attempt::Transient(ScanError::MalformedResponse(format!(
                "response too short ({} bytes)",
                text.len()
            ))));
        }

        let mut response: Value = serde_json::from_str(text)
            .map_err(|e| Attempt::Transient(ScanError::MalformedResponse(e.to_string())))?;

        if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
            return Err(Attempt::Fatal(ScanError::Protocol(error.to_string())));
        }

        Ok(response
            .get_mut("result")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    async fn exchange(&self, line: &str) -> std::io::Result<Vec<u8>> {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.write_all(line.as_bytes()).await?;

        let mut buffer = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
            if chunk[..n].contains(&b'\n') {
                break;
            }
        }
        Ok(buffer)
    }

    /// `blockchain.scripthash.get_history`
    pub async fn scripthash_history(&self, scripthash: &str) -> Result<Option<Vec<HistoryEntry>>> {
        let Some(result) = self
            .call("blockchain.scripthash.get_history", vec![json!(scripthash)])
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(result)?))
    }

    /// `blockchain.transaction.get`
    pub async fn transaction(&self, txid: &str, verbose: bool) -> Result<Option<Value>> {
        self.call("blockchain.transaction.get", vec![json!(txid), json!(verbose)])
            .await
    }

    /// Verbose transaction lookup decoded into [`Transaction`].
    pub async fn transaction_verbose(&self, txid: &str) -> Result<Option<Transaction>> {
        let Some(raw) = self.transaction(txid, true).await? else {
            return Ok(None);
        };
        match serde_json::from_value(raw) {
            Ok(tx) => Ok(Some(tx)),
            Err(e) => {
                debug!("Undecodable transaction {}: {}", txid, e);
                Err(ScanError::MalformedResponse(format!("transaction {}: {}", txid, e)))
            }
        }
    }

    /// `server.version`, used as a connectivity probe.
    pub async fn server_version(&self) -> Result<Option<Value>> {
        self.call("server.version", vec![json!("chaintrail"), json!("1.4")])
            .await
    }
}
