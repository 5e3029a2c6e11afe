//! HTTP clients for the signing provider and the ledger gateway.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::config::{DeployConfig, NetworksConfig};
use crate::error::{DeployError, DeployResult};
use crate::http::{self, Classified};
use crate::types::{AppId, AuthToken, Network, TxHash};

use super::{AppRecord, LedgerReader, ReceiptStatus, ReceiptWatcher, RuntimeCall, TransactionSigner};

#[derive(Deserialize)]
struct Submitted {
    hash: String,
}

/// Client for a signing provider that holds the user's wallet.
#[derive(Debug, Clone)]
pub struct SignerClient {
    client: Client,
    networks: NetworksConfig,
}

impl SignerClient {
    /// Create a new signer client from configuration.
    pub fn new(config: &DeployConfig) -> DeployResult<Self> {
        Ok(Self {
            client: http::client(config.http.request_timeout())?,
            networks: config.networks.clone(),
        })
    }
}

#[async_trait]
impl TransactionSigner for SignerClient {
    async fn sign_and_submit(
        &self,
        network: Network,
        call: &RuntimeCall,
        token: &AuthToken,
    ) -> DeployResult<TxHash> {
        let url = format!(
            "{}/transactions",
            http::base_url(self.networks.get(network).signer_url.as_str())
        );
        let response = http::authorize(self.client.post(&url).json(call), token)
            .send()
            .await?;

        if response.status() == StatusCode::FORBIDDEN {
            return Err(DeployError::SignatureDeclined);
        }
        let submitted: Submitted = http::expect_success("signer", response)
            .await?
            .json()
            .await?;

        if submitted.hash.is_empty() {
            return Err(DeployError::MissingField("hash"));
        }
        Ok(TxHash::new(submitted.hash))
    }
}

/// Client for the ledger gateway: receipts and app records.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    networks: NetworksConfig,
}

impl GatewayClient {
    /// Create a new gateway client from configuration.
    pub fn new(config: &DeployConfig) -> DeployResult<Self> {
        Ok(Self {
            client: http::client(config.http.request_timeout())?,
            networks: config.networks.clone(),
        })
    }

    fn url(&self, network: Network, path: &str) -> String {
        let endpoints = self.networks.get(network);
        format!(
            "{}/{}/{}",
            http::base_url(endpoints.gateway_url.as_str()),
            endpoints.runtime,
            path
        )
    }
}

#[async_trait]
impl ReceiptWatcher for GatewayClient {
    async fn receipt_status(
        &self,
        network: Network,
        hash: &TxHash,
        token: &AuthToken,
    ) -> DeployResult<ReceiptStatus> {
        let url = self.url(network, &format!("transactions/{hash}"));
        let response = http::authorize(self.client.get(&url), token).send().await?;

        match http::classify("gateway", response).await? {
            Classified::Ok(response) => Ok(response.json().await?),
            Classified::NotFound => Ok(ReceiptStatus::Pending),
        }
    }
}

#[async_trait]
impl LedgerReader for GatewayClient {
    async fn app(&self, network: Network, id: &AppId, token: &AuthToken) -> DeployResult<AppRecord> {
        let url = self.url(network, &format!("rofl/apps/{id}"));
        let response = http::authorize(self.client.get(&url), token).send().await?;
        Ok(http::expect_success("gateway", response)
            .await?
            .json()
            .await?)
    }
}
