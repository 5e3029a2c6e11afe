//! Build backend access and the build-result waiter.

mod client;

pub use client::BuildClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{DeployError, DeployResult};
use crate::manifest::BuildInputs;
use crate::poll::{poll_until, PollPolicy};
use crate::types::{AuthToken, BuildResult, TaskId};

/// Build results as reported by the backend.
///
/// A non-empty `err` is a terminal failure of the job; a present
/// `oci_reference` means the build completed; anything else is still running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResults {
    /// Base64 `rofl.yaml` with enclave identities.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<String>,
    /// OCI reference of the bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oci_reference: Option<String>,
    /// Manifest hash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_hash: Option<String>,
    /// Build log lines.
    #[serde(default)]
    pub logs: Vec<String>,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl BuildResults {
    /// Check if the job has failed.
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.err.as_deref().filter(|e| !e.is_empty())
    }

    /// Check if the backend has stopped working on the job.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.failure().is_some() || self.oci_reference.is_some()
    }

    /// Convert settled results into a completed build.
    pub fn into_result(self) -> DeployResult<BuildResult> {
        if let Some(reason) = self.failure() {
            return Err(DeployError::BuildFailed(reason.to_owned()));
        }
        let oci_reference = self
            .oci_reference
            .ok_or(DeployError::MissingField("oci_reference"))?;
        let manifest_hash = self
            .manifest_hash
            .ok_or(DeployError::MissingField("manifest_hash"))?;
        Ok(BuildResult {
            manifest: self.manifest,
            oci_reference,
            manifest_hash,
            logs: self.logs,
        })
    }
}

/// Access to the build backend.
#[async_trait]
pub trait BuildBackend: Send + Sync {
    /// Submit rendered inputs for a build.
    async fn submit(&self, inputs: &BuildInputs, token: &AuthToken) -> DeployResult<TaskId>;

    /// Fetch the current results of a build.
    ///
    /// An unknown task is [`DeployError::BuildNotFound`].
    async fn results(&self, task_id: &TaskId, token: &AuthToken) -> DeployResult<BuildResults>;
}

/// Wait for a submitted build to finish.
///
/// A reported failure ends the wait immediately with
/// [`DeployError::BuildFailed`]; the results are not fetched again.
#[instrument(skip_all, fields(task_id = %task_id))]
pub async fn wait_for_build_result(
    builds: &dyn BuildBackend,
    task_id: &TaskId,
    token: &AuthToken,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> DeployResult<BuildResult> {
    let results = poll_until(
        policy,
        cancel,
        || builds.results(task_id, token),
        |results| {
            let settled = results.is_settled();
            if !settled {
                debug!(log_lines = results.logs.len(), "build still running");
            }
            settled
        },
    )
    .await
    .map_err(|e| {
        e.into_deploy_error(|elapsed, attempts| DeployError::BuildTimeout { elapsed, attempts })
    })?;

    if let Some(reason) = results.failure() {
        warn!(reason, "build failed");
    }
    let result = results.into_result()?;
    info!(
        oci_reference = %result.oci_reference,
        manifest_hash = %result.manifest_hash,
        "build finished"
    );
    Ok(result)
}
