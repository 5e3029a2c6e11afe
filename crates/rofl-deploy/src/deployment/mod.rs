//! Deployment orchestration.
//!
//! [`DeploymentOrchestrator`] drives one app through the pipeline:
//!
//! 1. submit `rofl.Create` with a permissive policy
//! 2. wait for the indexer to publish the app id
//! 3. read back the app record, render and submit the build
//! 4. wait for the build result
//! 5. decode the enclave policy, seal secrets, submit `rofl.Update`
//! 6. submit `roflmarket.InstanceCreate`
//!
//! Each step only starts once the previous one produced its data. Any failure
//! ends the run in [`DeploymentStatus::Failed`](crate::DeploymentStatus) with
//! the stage it happened in; nothing confirmed on-chain is rolled back.

mod handle;
mod orchestrator;
mod request;

pub use handle::DeploymentHandle;
pub use orchestrator::{DeploymentOrchestrator, DeploymentOutcome};
pub use request::{
    AppMetadata, DeploymentRequest, OfferSelection, TemplateDescriptor, Term, UserAppData,
    METADATA_PREFIX,
};

use std::fmt;
use std::sync::Arc;

use rofl_secrets::{SecretSealer, X25519Sealer};

use crate::artifacts::{ArtifactClient, ArtifactStore};
use crate::build::{BuildBackend, BuildClient};
use crate::chain::{GatewayClient, LedgerReader, ReceiptWatcher, SignerClient, TransactionSigner};
use crate::config::DeployConfig;
use crate::error::DeployResult;
use crate::indexer::{EventIndexer, NexusClient};
use crate::poll::PollPolicy;

/// External systems the pipeline talks to.
#[derive(Clone)]
pub struct Collaborators {
    /// Wallet or signing provider.
    pub signer: Arc<dyn TransactionSigner>,
    /// Receipt source.
    pub receipts: Arc<dyn ReceiptWatcher>,
    /// App record reader.
    pub ledger: Arc<dyn LedgerReader>,
    /// Event indexer.
    pub indexer: Arc<dyn EventIndexer>,
    /// Build backend.
    pub builds: Arc<dyn BuildBackend>,
    /// Artifact store.
    pub artifacts: Arc<dyn ArtifactStore>,
    /// Secret sealer.
    pub sealer: Arc<dyn SecretSealer>,
}

impl Collaborators {
    /// HTTP implementations of every collaborator.
    pub fn http(config: &DeployConfig) -> DeployResult<Self> {
        let gateway = Arc::new(GatewayClient::new(config)?);
        Ok(Self {
            signer: Arc::new(SignerClient::new(config)?),
            receipts: gateway.clone(),
            ledger: gateway,
            indexer: Arc::new(NexusClient::new(config)?),
            builds: Arc::new(BuildClient::new(config)?),
            artifacts: Arc::new(ArtifactClient::new(config)?),
            sealer: Arc::new(X25519Sealer),
        })
    }
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

/// Timing and behaviour of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Indexer polling for the app id.
    pub app_id: PollPolicy,
    /// Build result polling.
    pub build: PollPolicy,
    /// Receipt polling for each transaction.
    pub confirmation: PollPolicy,
    /// Upload the rendered build inputs to the artifact store.
    pub persist_inputs: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        DeployConfig::default().pipeline_settings()
    }
}
