//! HTTP client for the artifact store.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use crate::config::DeployConfig;
use crate::error::DeployResult;
use crate::http::{self, Classified};
use crate::types::AuthToken;

use super::ArtifactStore;

/// HTTP client for the artifact store.
#[derive(Debug, Clone)]
pub struct ArtifactClient {
    client: Client,
    base_url: String,
}

impl ArtifactClient {
    /// Create a new artifact client from configuration.
    pub fn new(config: &DeployConfig) -> DeployResult<Self> {
        Ok(Self {
            client: http::client(config.http.request_timeout())?,
            base_url: http::base_url(config.artifacts.url.as_str()),
        })
    }

    /// Create a new artifact client with a custom base URL.
    pub fn with_url(url: impl Into<String>) -> DeployResult<Self> {
        let config = DeployConfig::default();
        Ok(Self {
            client: http::client(config.http.request_timeout())?,
            base_url: http::base_url(url),
        })
    }

    fn url(&self, id: &str) -> String {
        format!("{}/artifacts/{}", self.base_url, id)
    }
}

#[async_trait]
impl ArtifactStore for ArtifactClient {
    async fn upload(&self, id: &str, bytes: Vec<u8>, token: &AuthToken) -> DeployResult<()> {
        let request = self
            .client
            .put(self.url(id))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes);
        let response = http::authorize(request, token).send().await?;
        http::expect_success("artifact store", response).await?;
        Ok(())
    }

    async fn download(&self, id: &str, token: &AuthToken) -> DeployResult<Option<Vec<u8>>> {
        let response = http::authorize(self.client.get(self.url(id)), token)
            .send()
            .await?;

        match http::classify("artifact store", response).await? {
            Classified::Ok(response) => Ok(Some(response.bytes().await?.to_vec())),
            Classified::NotFound => Ok(None),
        }
    }
}
