//! Entity enrichment: attach external attribution tags to crawled addresses.

use crate::error::{EnrichError, StoreResult};
use crate::store::GraphStore;
use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_BATCH_SIZE: usize = 5000;

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AddressTag {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct EntityEntry {
    #[serde(rename = "_request_address", default)]
    pub address: Option<String>,
    #[serde(default)]
    pub best_address_tag: Option<AddressTag>,
}

impl EntityEntry {
    /// (address, label, category) when the entry carries a usable label.
    pub fn tag(&self) -> Option<(&str, &str, Option<&str>)> {
        let address = self.address.as_deref().filter(|a| !a.is_empty())?;
        let tag = self.best_address_tag.as_ref()?;
        let label = tag.label.as_deref().filter(|l| !l.is_empty())?;
        Some((address, label, tag.category.as_deref()))
    }
}

/// The service answers either with a bare list or wrapped in `data`.
#[derive(Deserialize)]
#[serde(untagged)]
enum EntityResponse {
    List(Vec<EntityEntry>),
    Wrapped {
        #[serde(default)]
        data: Vec<EntityEntry>,
    },
}

pub struct EnrichmentClient {
    endpoint: Url,
    token: String,
    http: Client,
}

impl EnrichmentClient {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

    pub fn new(endpoint: Url, token: impl Into<String>) -> Result<Self, EnrichError> {
        Self::with_timeout(endpoint, token, Self::DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(
        endpoint: Url,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EnrichError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint,
            token: token.into(),
            http,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Look up the best known tag for each address in one request.
    pub async fn fetch_entities(&self, addresses: &[String]) -> Result<Vec<EntityEntry>, EnrichError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .header(AUTHORIZATION, self.token.as_str())
            .json(&json!({ "address": addresses }))
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        match serde_json::from_str::<Option<EntityResponse>>(&body) {
            Ok(Some(EntityResponse::List(entries))) => Ok(entries),
            Ok(Some(EntityResponse::Wrapped { data })) => Ok(data),
            Ok(None) => Ok(Vec::new()),
            Err(e) => Err(EnrichError::Decode(e.to_string())),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentSummary {
    pub addresses: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub tagged: usize,
}

/// Tag every address in the store, `batch_size` addresses per request.
/// A batch that fails is logged and skipped; only reading the address list
/// can fail the whole job.
pub async fn run_enrichment(
    store: &dyn GraphStore,
    client: &EnrichmentClient,
    batch_size: usize,
) -> StoreResult<EnrichmentSummary> {
    let addresses = store.addresses()?;
    let batch_size = batch_size.max(1);
    let total_batches = addresses.len().div_ceil(batch_size);
    info!("Loaded {} addresses from the graph store.", addresses.len());

    let mut summary = EnrichmentSummary {
        addresses: addresses.len(),
        ..Default::default()
    };

    for (i, batch) in addresses.chunks(batch_size).enumerate() {
        info!("Processing batch {}/{}...", i + 1, total_batches);
        summary.batches += 1;

        let entries = match client.fetch_entities(batch).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Enrichment batch {} failed: {}", i + 1, e);
                summary.failed_batches += 1;
                continue;
            }
        };

        for entry in &entries {
            let Some((address, label, category)) = entry.tag() else {
                continue;
            };
            match store.tag_address(address, label, category) {
                Ok(true) => {
                    info!(
                        "Tagging {} as '{}' ({})",
                        address,
                        label,
                        category.unwrap_or("-")
                    );
                    summary.tagged += 1;
                }
                Ok(false) => debug!("No update for {}: not in the graph", address),
                Err(e) => warn!("Failed to tag {}: {}", address, e),
            }
        }
    }

    info!(
        "Done tagging: {} tagged, {}/{} batches failed.",
        summary.tagged, summary.failed_batches, summary.batches
    );
    Ok(summary)
}
