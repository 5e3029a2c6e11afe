//! Input to a deployment run.

use std::collections::BTreeMap;
use std::fmt;

use rofl_secrets::SecretValue;
use serde::{Deserialize, Serialize};

use crate::manifest::{ComposeFile, Resources, RoflManifest};
use crate::types::{AuthToken, Network};

/// On-chain metadata key prefix.
pub const METADATA_PREFIX: &str = "net.oasis.rofl.";

/// Everything needed to create and deploy one app.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    /// Bearer token for the build backend and artifact store.
    pub auth_token: AuthToken,
    /// Template to build from.
    pub template: TemplateDescriptor,
    /// User-supplied app data.
    pub app: UserAppData,
    /// Target network.
    pub network: Network,
}

/// A deployable template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDescriptor {
    /// Template identifier.
    pub id: String,
    /// Template `rofl.yaml`.
    pub manifest: RoflManifest,
    /// Template `compose.yaml`.
    pub compose: ComposeFile,
}

/// App data entered by the user.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAppData {
    /// Metadata published on-chain.
    pub metadata: AppMetadata,

    /// Secrets sealed into the app record.
    #[serde(default, skip_serializing)]
    pub secrets: BTreeMap<String, SecretValue>,

    /// Resource override for the template.
    #[serde(default)]
    pub resources: Option<Resources>,

    /// Compute offer to lease.
    pub offer: OfferSelection,
}

impl fmt::Debug for UserAppData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAppData")
            .field("metadata", &self.metadata)
            .field("secrets", &self.secrets.keys().collect::<Vec<_>>())
            .field("resources", &self.resources)
            .field("offer", &self.offer)
            .finish()
    }
}

/// App metadata.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Display name.
    pub name: String,
    /// Author.
    #[serde(default)]
    pub author: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Version.
    #[serde(default)]
    pub version: String,
    /// Homepage URL.
    #[serde(default)]
    pub homepage: String,
}

impl AppMetadata {
    /// On-chain metadata map (`net.oasis.rofl.*`); empty values are omitted.
    #[must_use]
    pub fn to_chain_metadata(&self) -> BTreeMap<String, String> {
        [
            ("name", &self.name),
            ("author", &self.author),
            ("description", &self.description),
            ("version", &self.version),
            ("homepage", &self.homepage),
        ]
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| (format!("{METADATA_PREFIX}{key}"), value.clone()))
        .collect()
    }
}

/// Compute offer chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferSelection {
    /// Provider address.
    pub provider: String,
    /// Offer identifier.
    pub offer: String,
    /// Billing term.
    #[serde(default)]
    pub term: Term,
    /// Number of terms to lease.
    #[serde(default = "default_term_count")]
    pub term_count: u64,
}

const fn default_term_count() -> u64 {
    1
}

/// Billing term of a lease.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Term {
    /// Hourly.
    #[default]
    Hour,
    /// Monthly.
    Month,
    /// Yearly.
    Year,
}

impl Term {
    /// Numeric term code used by the marketplace.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Hour => 1,
            Self::Month => 2,
            Self::Year => 3,
        }
    }
}
