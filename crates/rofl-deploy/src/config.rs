//! Configuration for rofl-deploy.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::deployment::PipelineSettings;
use crate::error::{DeployError, DeployResult};
use crate::poll::PollPolicy;
use crate::types::Network;

const ENV_PREFIX: &str = "ROFL_";

/// Top-level configuration for the deployment pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployConfig {
    /// HTTP client settings shared by every collaborator.
    #[serde(default)]
    pub http: HttpConfig,

    /// Per-network endpoints.
    #[serde(default)]
    pub networks: NetworksConfig,

    /// Build backend.
    #[serde(default)]
    pub build: BuildConfig,

    /// Event indexer polling.
    #[serde(default)]
    pub indexer: IndexerConfig,

    /// Ledger confirmation polling.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Artifact store.
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
}

impl DeployConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `rofl.toml` in the current directory (if present)
    /// 3. Environment variables with `ROFL_` prefix
    pub fn load() -> DeployResult<Self> {
        Self::figment(Toml::file("rofl.toml"))
    }

    /// Load configuration from a specific TOML file, which must exist.
    pub fn from_file(path: impl AsRef<Path>) -> DeployResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(DeployError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::figment(Toml::file(path))
    }

    fn figment(file: figment::providers::Data<Toml>) -> DeployResult<Self> {
        Ok(Figment::from(Serialized::defaults(Self::default()))
            .merge(file)
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?)
    }

    /// Endpoints for the given network.
    #[must_use]
    pub const fn network(&self, network: Network) -> &NetworkEndpoints {
        self.networks.get(network)
    }

    /// Timing policies for the orchestrator.
    #[must_use]
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            app_id: PollPolicy::from_millis(
                self.indexer.poll_interval_ms,
                self.indexer.timeout_ms,
            ),
            build: PollPolicy::from_millis(self.build.poll_interval_ms, self.build.timeout_ms),
            confirmation: PollPolicy::from_millis(
                self.ledger.poll_interval_ms,
                self.ledger.confirmation_timeout_ms,
            ),
            persist_inputs: self.artifacts.persist_inputs,
        }
    }
}

impl From<&DeployConfig> for PipelineSettings {
    fn from(config: &DeployConfig) -> Self {
        config.pipeline_settings()
    }
}

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl HttpConfig {
    /// Request timeout as a duration.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Endpoints for both networks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworksConfig {
    /// Mainnet endpoints.
    #[serde(default = "NetworkEndpoints::mainnet")]
    pub mainnet: NetworkEndpoints,

    /// Testnet endpoints.
    #[serde(default = "NetworkEndpoints::testnet")]
    pub testnet: NetworkEndpoints,
}

impl NetworksConfig {
    /// Endpoints for the given network.
    #[must_use]
    pub const fn get(&self, network: Network) -> &NetworkEndpoints {
        match network {
            Network::Mainnet => &self.mainnet,
            Network::Testnet => &self.testnet,
        }
    }
}

impl Default for NetworksConfig {
    fn default() -> Self {
        Self {
            mainnet: NetworkEndpoints::mainnet(),
            testnet: NetworkEndpoints::testnet(),
        }
    }
}

/// Collaborator endpoints on one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkEndpoints {
    /// Event indexer base URL.
    pub nexus_url: String,
    /// Ledger read gateway base URL.
    pub gateway_url: String,
    /// Signing provider base URL.
    pub signer_url: String,
    /// Runtime (paratime) name used in indexer and gateway paths.
    pub runtime: String,
}

impl NetworkEndpoints {
    fn mainnet() -> Self {
        Self {
            nexus_url: "https://nexus.oasis.io/v1".to_owned(),
            gateway_url: "https://sapphire.oasis.io/api".to_owned(),
            signer_url: "http://127.0.0.1:8544".to_owned(),
            runtime: "sapphire".to_owned(),
        }
    }

    fn testnet() -> Self {
        Self {
            nexus_url: "https://testnet.nexus.oasis.io/v1".to_owned(),
            gateway_url: "https://testnet.sapphire.oasis.io/api".to_owned(),
            signer_url: "http://127.0.0.1:8544".to_owned(),
            runtime: "sapphire".to_owned(),
        }
    }
}

/// Build backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Base URL for the build API.
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Delay between result fetches in milliseconds.
    #[serde(default = "default_build_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for a build in milliseconds.
    #[serde(default = "default_build_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_backend_url() -> String {
    "https://api.rofl.app".to_owned()
}

const fn default_build_poll_interval_ms() -> u64 {
    3_000
}

const fn default_build_timeout_ms() -> u64 {
    300_000
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            poll_interval_ms: default_build_poll_interval_ms(),
            timeout_ms: default_build_timeout_ms(),
        }
    }
}

/// Event indexer polling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Delay between queries in milliseconds.
    #[serde(default = "default_indexer_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for the app id in milliseconds.
    #[serde(default = "default_indexer_timeout_ms")]
    pub timeout_ms: u64,

    /// Page size requested from the indexer.
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

const fn default_indexer_poll_interval_ms() -> u64 {
    1_000
}

const fn default_indexer_timeout_ms() -> u64 {
    60_000
}

const fn default_page_limit() -> u32 {
    1
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_indexer_poll_interval_ms(),
            timeout_ms: default_indexer_timeout_ms(),
            page_limit: default_page_limit(),
        }
    }
}

/// Ledger confirmation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Delay between receipt queries in milliseconds.
    #[serde(default = "default_ledger_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound on waiting for a confirmation in milliseconds.
    #[serde(default = "default_confirmation_timeout_ms")]
    pub confirmation_timeout_ms: u64,
}

const fn default_ledger_poll_interval_ms() -> u64 {
    1_000
}

const fn default_confirmation_timeout_ms() -> u64 {
    120_000
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_ledger_poll_interval_ms(),
            confirmation_timeout_ms: default_confirmation_timeout_ms(),
        }
    }
}

/// Artifact store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// Base URL for the artifact API.
    #[serde(default = "default_backend_url")]
    pub url: String,

    /// Upload the rendered build inputs next to the app.
    #[serde(default = "default_persist_inputs")]
    pub persist_inputs: bool,
}

const fn default_persist_inputs() -> bool {
    true
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            persist_inputs: default_persist_inputs(),
        }
    }
}
