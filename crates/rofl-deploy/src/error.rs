//! Error types for rofl-deploy.

use std::time::Duration;

use crate::stage::DeploymentStage;
use crate::types::{AppId, TxHash};

/// Result type alias using [`DeployError`].
pub type DeployResult<T> = Result<T, DeployError>;

/// Errors that can occur while creating and deploying an app.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The indexer did not publish the app-created event in time.
    #[error("app id not indexed after {attempts} attempts ({elapsed:?})")]
    AppIdTimeout {
        /// Time spent polling.
        elapsed: Duration,
        /// Number of indexer queries made.
        attempts: u32,
    },

    /// The build did not finish in time.
    #[error("build not finished after {attempts} attempts ({elapsed:?})")]
    BuildTimeout {
        /// Time spent polling.
        elapsed: Duration,
        /// Number of result fetches made.
        attempts: u32,
    },

    /// The transaction was not confirmed in time.
    #[error("transaction {hash} not confirmed after {elapsed:?}")]
    ConfirmationTimeout {
        /// Transaction hash.
        hash: TxHash,
        /// Time spent waiting.
        elapsed: Duration,
    },

    /// The build backend reported a failed build.
    #[error("build failed: {0}")]
    BuildFailed(String),

    /// The build backend does not know the task.
    #[error("build task not found: {0}")]
    BuildNotFound(String),

    /// The user declined to sign the transaction.
    #[error("signature declined")]
    SignatureDeclined,

    /// The ledger rejected the transaction.
    #[error("transaction {hash} reverted: {reason}")]
    TransactionReverted {
        /// Transaction hash.
        hash: TxHash,
        /// Chain-reported reason.
        reason: String,
    },

    /// The build manifest could not be decoded.
    #[error("malformed manifest: {0}")]
    Manifest(String),

    /// A response was missing a required field.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// Secret handling error.
    #[error("secrets error: {0}")]
    Secrets(#[from] rofl_secrets::SecretsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A collaborator answered with an unexpected status code.
    #[error("{service} returned {status}: {body}")]
    UnexpectedStatus {
        /// Which collaborator answered.
        service: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Serialisation error.
    #[error("serialisation error: {0}")]
    Serialisation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The pipeline was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Create a manifest error.
    #[must_use]
    pub fn manifest(msg: impl Into<String>) -> Self {
        Self::Manifest(msg.into())
    }

    /// Create a serialisation error.
    #[must_use]
    pub fn serialisation(msg: impl ToString) -> Self {
        Self::Serialisation(msg.to_string())
    }

    /// Create an internal error.
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true for the named per-stage timeouts.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::AppIdTimeout { .. } | Self::BuildTimeout { .. } | Self::ConfirmationTimeout { .. }
        )
    }
}

impl From<figment::Error> for DeployError {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}

/// Terminal failure of a deployment pipeline.
///
/// Carries the stage that was running when the error occurred. If the create
/// transaction had already been confirmed, `app_id` names the application that
/// is now registered on-chain but not (fully) deployed.
#[derive(Debug, thiserror::Error)]
#[error("deployment failed while {stage}: {cause}")]
pub struct DeploymentFailure {
    /// Stage in which the pipeline failed.
    pub stage: DeploymentStage,
    /// Underlying error.
    #[source]
    pub cause: DeployError,
    /// Application left behind on-chain, if any.
    pub app_id: Option<AppId>,
}

impl DeploymentFailure {
    /// Create a failure for the given stage.
    #[must_use]
    pub const fn new(stage: DeploymentStage, cause: DeployError, app_id: Option<AppId>) -> Self {
        Self {
            stage,
            cause,
            app_id,
        }
    }
}
