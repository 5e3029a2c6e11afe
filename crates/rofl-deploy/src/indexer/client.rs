//! HTTP client for the Nexus indexer API.

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{DeployConfig, NetworksConfig};
use crate::error::DeployResult;
use crate::http::{self, Classified};
use crate::types::{AuthToken, Network};

use super::{EventIndexer, EventPage};

/// Indexer client for both networks.
#[derive(Debug, Clone)]
pub struct NexusClient {
    client: Client,
    networks: NetworksConfig,
    page_limit: u32,
}

impl NexusClient {
    /// Create a new indexer client from configuration.
    pub fn new(config: &DeployConfig) -> DeployResult<Self> {
        Ok(Self {
            client: http::client(config.http.request_timeout())?,
            networks: config.networks.clone(),
            page_limit: config.indexer.page_limit,
        })
    }

    fn events_url(&self, network: Network) -> String {
        let endpoints = self.networks.get(network);
        format!(
            "{}/{}/events",
            http::base_url(endpoints.nexus_url.as_str()),
            endpoints.runtime
        )
    }
}

#[async_trait]
impl EventIndexer for NexusClient {
    async fn events_by_tx(
        &self,
        network: Network,
        event_type: &str,
        tx_hash: &str,
        token: &AuthToken,
    ) -> DeployResult<EventPage> {
        let limit = self.page_limit.to_string();
        let request = self.client.get(self.events_url(network)).query(&[
            ("tx_hash", tx_hash),
            ("type", event_type),
            ("limit", limit.as_str()),
            ("offset", "0"),
        ]);
        let response = http::authorize(request, token).send().await?;

        match http::classify("indexer", response).await? {
            Classified::Ok(response) => Ok(response.json().await?),
            Classified::NotFound => Ok(EventPage::default()),
        }
    }
}
