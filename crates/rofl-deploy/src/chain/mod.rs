//! On-chain calls and the ledger collaborators.
//!
//! Three call shapes are used: [`RuntimeCall::Create`] registers the app,
//! [`RuntimeCall::Update`] attaches the enclave policy and sealed secrets, and
//! [`RuntimeCall::Deploy`] leases compute from a provider and binds the built
//! bundle to the instance.

mod client;
mod submit;

pub use client::{GatewayClient, SignerClient};
pub use submit::TransactionSubmitter;

use std::collections::BTreeMap;

use async_trait::async_trait;
use rofl_secrets::SecretEncryptionKey;
use serde::{Deserialize, Serialize};

use crate::deployment::Term;
use crate::error::DeployResult;
use crate::manifest::AppAuthPolicy;
use crate::types::{AppId, AuthToken, CallKind, Network, TxHash};

/// Deployment metadata key carrying the OCI reference of the bundle.
pub const ORC_REF_KEY: &str = "net.oasis.deployment.orc.ref";

/// A runtime method call, serialised as `{"method": ..., "body": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "body")]
pub enum RuntimeCall {
    /// Register a new app.
    #[serde(rename = "rofl.Create")]
    Create(CreateBody),
    /// Replace an app's policy, metadata and secrets.
    #[serde(rename = "rofl.Update")]
    Update(UpdateBody),
    /// Lease an offer and deploy to it.
    #[serde(rename = "roflmarket.InstanceCreate")]
    Deploy(InstanceCreateBody),
}

impl RuntimeCall {
    /// Which pipeline call this is.
    #[must_use]
    pub const fn kind(&self) -> CallKind {
        match self {
            Self::Create(_) => CallKind::Create,
            Self::Update(_) => CallKind::Update,
            Self::Deploy(_) => CallKind::Deploy,
        }
    }

    /// Runtime method name.
    #[must_use]
    pub const fn method(&self) -> &'static str {
        match self {
            Self::Create(_) => "rofl.Create",
            Self::Update(_) => "rofl.Update",
            Self::Deploy(_) => "roflmarket.InstanceCreate",
        }
    }
}

/// How the app id is derived from the create transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierScheme {
    /// From the creator address and round index.
    CreatorRoundIndex,
    /// From the creator address and account nonce.
    #[default]
    CreatorNonce,
}

/// Body of `rofl.Create`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateBody {
    /// Identifier derivation scheme.
    pub scheme: IdentifierScheme,
    /// Initial policy.
    pub policy: AppAuthPolicy,
    /// On-chain metadata.
    pub metadata: BTreeMap<String, String>,
}

/// Body of `rofl.Update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateBody {
    /// App to update.
    pub id: AppId,
    /// Admin account.
    pub admin: Option<String>,
    /// New policy.
    pub policy: AppAuthPolicy,
    /// New metadata.
    pub metadata: BTreeMap<String, String>,
    /// Sealed secrets, name to base64 envelope.
    pub secrets: BTreeMap<String, String>,
}

/// Body of `roflmarket.InstanceCreate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceCreateBody {
    /// Provider address.
    pub provider: String,
    /// Offer identifier.
    pub offer: String,
    /// What to run on the instance.
    pub deployment: DeploymentDescriptor,
    /// Billing term.
    pub term: Term,
    /// Number of terms.
    pub term_count: u64,
}

/// Deployment bound to a leased instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentDescriptor {
    /// App to run.
    pub app_id: AppId,
    /// Hash of the built manifest.
    pub manifest_hash: String,
    /// Deployment metadata; carries [`ORC_REF_KEY`].
    pub metadata: BTreeMap<String, String>,
}

/// On-chain app record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppRecord {
    /// App id.
    pub id: AppId,
    /// Admin account.
    #[serde(default)]
    pub admin: Option<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    /// Secret-encryption key.
    pub sek: SecretEncryptionKey,
    /// Current policy.
    #[serde(default)]
    pub policy: AppAuthPolicy,
    /// Sealed secrets already stored on the app.
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
}

/// Ledger state of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ReceiptStatus {
    /// Not yet in a block.
    Pending,
    /// Executed successfully.
    Confirmed,
    /// Executed and failed.
    Reverted {
        /// Chain-reported reason.
        #[serde(default)]
        reason: String,
    },
}

impl ReceiptStatus {
    /// Check if the ledger has decided on the transaction.
    #[must_use]
    pub const fn is_final(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Wallet or signing provider.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Sign and broadcast a call, returning its hash.
    ///
    /// A user refusing to sign is [`crate::DeployError::SignatureDeclined`].
    async fn sign_and_submit(
        &self,
        network: Network,
        call: &RuntimeCall,
        token: &AuthToken,
    ) -> DeployResult<TxHash>;
}

/// Source of transaction receipts.
#[async_trait]
pub trait ReceiptWatcher: Send + Sync {
    /// Current state of a transaction; unknown hashes are pending.
    async fn receipt_status(
        &self,
        network: Network,
        hash: &TxHash,
        token: &AuthToken,
    ) -> DeployResult<ReceiptStatus>;
}

/// Read access to on-chain app state.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Fetch an app record.
    async fn app(&self, network: Network, id: &AppId, token: &AuthToken) -> DeployResult<AppRecord>;
}
