//! Common fixtures for pipeline integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rofl_deploy::build::BuildResults;
use rofl_deploy::chain::RuntimeCall;
use rofl_deploy::deployment::{AppMetadata, OfferSelection, TemplateDescriptor, Term, UserAppData};
use rofl_deploy::manifest::{ComposeFile, EnclaveIdentity, RoflManifest, DEFAULT_DEPLOYMENT};
use rofl_deploy::testing::{
    app_created, MockArtifactStore, MockBuildBackend, MockIndexer, MockLedger, MockReceipts,
    MockSet, MockSigner,
};
use rofl_deploy::{
    AuthToken, CallKind, DeploymentOrchestrator, DeploymentRequest, Network, PipelineSettings,
};
use rofl_secrets::{SecretEncryptionKey, SecretValue};
use x25519_dalek::{PublicKey, StaticSecret};

pub const APP_ID: &str = "rofl1qqq";
pub const OCI_REFERENCE: &str = "img@sha256:5e6f0c1d";
pub const MANIFEST_HASH: &str = "0xdead";

/// Private half of the SEK used by [`MockLedger`] records.
pub const SEK_SECRET: [u8; 32] = [7u8; 32];

pub const TEMPLATE_YAML: &str = r"
name: template
version: 0.1.0
tee: tdx
kind: container
resources:
  memory: 512
  cpus: 1
deployments:
  default:
    network: testnet
    paratime: sapphire
    policy:
      quotes:
        pcs:
          tcb_validity_period: 30
      endorsements:
        - any: {}
      fees: endorsing_node
      max_expiration: 3
";

pub const COMPOSE_YAML: &str = "services:\n  app:\n    image: ghcr.io/example/app:latest\n";

pub fn sek() -> SecretEncryptionKey {
    SecretEncryptionKey::from_bytes(PublicKey::from(&StaticSecret::from(SEK_SECRET)).to_bytes())
}

pub fn identity(seed: u8) -> EnclaveIdentity {
    EnclaveIdentity {
        mr_enclave: [seed; 32],
        mr_signer: vec![seed ^ 0xff; 32],
    }
}

/// Base64 `rofl.yaml` as returned by a finished build.
pub fn built_manifest(enclaves: &[EnclaveIdentity]) -> String {
    let mut manifest = RoflManifest::from_yaml(TEMPLATE_YAML).unwrap();
    let deployment = manifest.deployments.get_mut(DEFAULT_DEPLOYMENT).unwrap();
    deployment.app_id = Some(APP_ID.to_owned());
    deployment.policy.enclaves = enclaves.to_vec();
    STANDARD.encode(manifest.to_yaml().unwrap())
}

pub fn finished_build(enclaves: &[EnclaveIdentity]) -> BuildResults {
    BuildResults {
        manifest: Some(built_manifest(enclaves)),
        oci_reference: Some(OCI_REFERENCE.to_owned()),
        manifest_hash: Some(MANIFEST_HASH.to_owned()),
        logs: vec!["bundle written".to_owned()],
        err: None,
    }
}

pub fn template() -> TemplateDescriptor {
    TemplateDescriptor {
        id: "hello-world".to_owned(),
        manifest: RoflManifest::from_yaml(TEMPLATE_YAML).unwrap(),
        compose: ComposeFile::from_yaml(COMPOSE_YAML).unwrap(),
    }
}

pub fn app_data() -> UserAppData {
    UserAppData {
        metadata: AppMetadata {
            name: "my-app".to_owned(),
            author: "dev@example.com".to_owned(),
            description: "test app".to_owned(),
            version: "1.0.0".to_owned(),
            homepage: String::new(),
        },
        secrets: BTreeMap::from([("API_KEY".to_owned(), SecretValue::new("sk_live_123"))]),
        resources: None,
        offer: OfferSelection {
            provider: "oasis1qprovider".to_owned(),
            offer: "0000000000000001".to_owned(),
            term: Term::Month,
            term_count: 1,
        },
    }
}

pub fn request() -> DeploymentRequest {
    DeploymentRequest {
        auth_token: AuthToken::new("test-token"),
        template: template(),
        app: app_data(),
        network: Network::Testnet,
    }
}

/// Mocks for a run that succeeds; tests replace the ones they need.
pub struct Mocks {
    pub signer: MockSigner,
    pub receipts: MockReceipts,
    pub ledger: MockLedger,
    pub indexer: MockIndexer,
    pub builds: MockBuildBackend,
    pub artifacts: MockArtifactStore,
    pub settings: PipelineSettings,
}

impl Default for Mocks {
    fn default() -> Self {
        Self {
            signer: MockSigner::new(),
            receipts: MockReceipts::new(),
            ledger: MockLedger::new(sek()),
            indexer: MockIndexer::new().otherwise(app_created(APP_ID)),
            builds: MockBuildBackend::new().otherwise(finished_build(&[identity(1)])),
            artifacts: MockArtifactStore::new(),
            settings: PipelineSettings::default(),
        }
    }
}

impl Mocks {
    pub fn build(self) -> (MockSet, DeploymentOrchestrator) {
        let set = MockSet::new(
            self.signer,
            self.receipts,
            self.ledger,
            self.indexer,
            self.builds,
            self.artifacts,
        );
        let orchestrator = DeploymentOrchestrator::new(set.collaborators(), self.settings);
        (set, orchestrator)
    }
}

/// The single call of `kind` presented to the signer.
pub fn only_call(signer: &MockSigner, kind: CallKind) -> RuntimeCall {
    let mut calls = signer.submitted_of(kind);
    assert_eq!(calls.len(), 1, "expected exactly one {kind} call");
    calls.remove(0)
}
