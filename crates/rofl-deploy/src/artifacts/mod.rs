//! Artifact store access.
//!
//! The rendered build inputs are kept next to the app under ids derived from
//! the app id, so a deployment can be inspected or rebuilt later.

mod client;

pub use client::ArtifactClient;

use async_trait::async_trait;

use crate::error::DeployResult;
use crate::types::{AppId, AuthToken};

/// Blob storage for build inputs and outputs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `id`, replacing any previous blob.
    async fn upload(&self, id: &str, bytes: Vec<u8>, token: &AuthToken) -> DeployResult<()>;

    /// Fetch the blob stored under `id`, or `None` if there is none.
    async fn download(&self, id: &str, token: &AuthToken) -> DeployResult<Option<Vec<u8>>>;
}

/// Artifact id of an app's rendered `rofl.yaml`.
#[must_use]
pub fn manifest_artifact_id(app_id: &AppId) -> String {
    format!("{app_id}-roflyaml")
}

/// Artifact id of an app's rendered `compose.yaml`.
#[must_use]
pub fn compose_artifact_id(app_id: &AppId) -> String {
    format!("{app_id}-composeyaml")
}
