//! HTTP client for the build backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::DeployConfig;
use crate::error::{DeployError, DeployResult};
use crate::http::{self, Classified};
use crate::manifest::BuildInputs;
use crate::types::{AuthToken, TaskId};

use super::{BuildBackend, BuildResults};

#[derive(Serialize)]
struct BuildRequest<'a> {
    manifest: &'a str,
    compose: &'a str,
}

#[derive(Deserialize)]
struct BuildAccepted {
    task_id: String,
}

/// HTTP client for the build backend.
#[derive(Debug, Clone)]
pub struct BuildClient {
    client: Client,
    base_url: String,
}

impl BuildClient {
    /// Create a new build client from configuration.
    pub fn new(config: &DeployConfig) -> DeployResult<Self> {
        Ok(Self {
            client: http::client(config.http.request_timeout())?,
            base_url: http::base_url(config.build.url.as_str()),
        })
    }

    /// Create a new build client with a custom base URL.
    pub fn with_url(url: impl Into<String>) -> DeployResult<Self> {
        let config = DeployConfig::default();
        Ok(Self {
            client: http::client(config.http.request_timeout())?,
            base_url: http::base_url(url),
        })
    }
}

#[async_trait]
impl BuildBackend for BuildClient {
    async fn submit(&self, inputs: &BuildInputs, token: &AuthToken) -> DeployResult<TaskId> {
        let url = format!("{}/rofl/build", self.base_url);
        let request = self.client.post(&url).json(&BuildRequest {
            manifest: &inputs.manifest,
            compose: &inputs.compose,
        });
        let response = http::authorize(request, token).send().await?;
        let accepted: BuildAccepted = http::expect_success("build backend", response)
            .await?
            .json()
            .await?;

        if accepted.task_id.is_empty() {
            return Err(DeployError::MissingField("task_id"));
        }
        Ok(TaskId::new(accepted.task_id))
    }

    async fn results(&self, task_id: &TaskId, token: &AuthToken) -> DeployResult<BuildResults> {
        let url = format!("{}/rofl/build/{}/results", self.base_url, task_id);
        let response = http::authorize(self.client.get(&url), token)
            .send()
            .await?;

        match http::classify("build backend", response).await? {
            Classified::Ok(response) => Ok(response.json().await?),
            Classified::NotFound => Err(DeployError::BuildNotFound(task_id.to_string())),
        }
    }
}
