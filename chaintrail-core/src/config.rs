//! Environment-sourced settings.
//!
//! Values come from the process environment after a `.env` file in the
//! working directory (if any) has been applied.

use crate::error::ConfigError;
use chaintrail_scanner::ElectrumClient;
use chaintrail_scanner::electrum::DEFAULT_PORT;
use url::Url;

pub const ELECTRUMX_HOST: &str = "ELECTRUMX_HOST";
pub const ELECTRUMX_PORT: &str = "ELECTRUMX_PORT";
pub const GRAPH_STORE_URI: &str = "GRAPH_STORE_URI";
pub const ENRICH_ENDPOINT: &str = "ENRICH_ENDPOINT";
pub const ENRICH_TOKEN: &str = "ENRICH_TOKEN";

const DEFAULT_HOST: &str = "localhost";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub electrum_host: String,
    pub electrum_port: u16,
    graph_store_uri: Option<String>,
    enrich_endpoint: Option<Url>,
    enrich_token: Option<String>,
}

impl Config {
    /// Load `.env`, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let electrum_port = match get(ELECTRUMX_PORT) {
            Some(port) => port.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: ELECTRUMX_PORT,
                reason: format!("{:?}: {}", port, e),
            })?,
            None => DEFAULT_PORT,
        };

        let enrich_endpoint = match get(ENRICH_ENDPOINT) {
            Some(endpoint) => Some(Url::parse(&endpoint).map_err(|e| ConfigError::Invalid {
                name: ENRICH_ENDPOINT,
                reason: format!("{:?}: {}", endpoint, e),
            })?),
            None => None,
        };

        Ok(Self {
            electrum_host: get(ELECTRUMX_HOST).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            electrum_port,
            graph_store_uri: get(GRAPH_STORE_URI),
            enrich_endpoint,
            enrich_token: get(ENRICH_TOKEN),
        })
    }

    pub fn electrum_client(&self) -> ElectrumClient {
        ElectrumClient::new(self.electrum_host.clone(), self.electrum_port)
    }

    /// Location of the graph store with `~` expanded. `file:` URIs are
    /// passed through untouched.
    pub fn graph_store_location(&self) -> Result<String, ConfigError> {
        let uri = self
            .graph_store_uri
            .as_deref()
            .ok_or(ConfigError::Missing(GRAPH_STORE_URI))?;
        if uri.starts_with("file:") {
            return Ok(uri.to_string());
        }
        Ok(shellexpand::tilde(uri).into_owned())
    }

    /// Endpoint and token for the entity attribution service.
    pub fn enrichment(&self) -> Result<(Url, String), ConfigError> {
        let endpoint = self
            .enrich_endpoint
            .clone()
            .ok_or(ConfigError::Missing(ENRICH_ENDPOINT))?;
        let token = self
            .enrich_token
            .clone()
            .ok_or(ConfigError::Missing(ENRICH_TOKEN))?;
        Ok((endpoint, token))
    }
}
