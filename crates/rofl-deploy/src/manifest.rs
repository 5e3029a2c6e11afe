//! Typed `rofl.yaml` and `compose.yaml` documents.
//!
//! Templates are held as typed values and only rendered to YAML text when the
//! build inputs are handed to the build backend. The built manifest comes back
//! base64-encoded; [`decode_built_policy`] is the only way to obtain the
//! enclave measurement policy that the update transaction attaches.

use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::{DeployError, DeployResult};
use crate::types::{AppId, Network};

/// Name of the deployment entry the pipeline manages.
pub const DEFAULT_DEPLOYMENT: &str = "default";

/// Length of an `MRENCLAVE` measurement.
pub const MR_ENCLAVE_LEN: usize = 32;

/// `rofl.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoflManifest {
    /// App name.
    pub name: String,

    /// App version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// TEE kind (`tdx`, `sgx`).
    #[serde(default = "default_tee")]
    pub tee: String,

    /// App kind (`container`, `raw`).
    #[serde(default = "default_kind")]
    pub kind: String,

    /// Requested resources.
    pub resources: Resources,

    /// Deployments by name.
    #[serde(default)]
    pub deployments: BTreeMap<String, ManifestDeployment>,

    /// Fields the pipeline does not interpret (artifacts, scripts, ...).
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_tee() -> String {
    "tdx".to_owned()
}

fn default_kind() -> String {
    "container".to_owned()
}

impl RoflManifest {
    /// The `default` deployment.
    pub fn default_deployment(&self) -> DeployResult<&ManifestDeployment> {
        self.deployments
            .get(DEFAULT_DEPLOYMENT)
            .ok_or(DeployError::MissingField("deployments.default"))
    }

    fn default_deployment_mut(&mut self) -> DeployResult<&mut ManifestDeployment> {
        self.deployments
            .get_mut(DEFAULT_DEPLOYMENT)
            .ok_or(DeployError::MissingField("deployments.default"))
    }

    /// Parse from YAML text.
    pub fn from_yaml(text: &str) -> DeployResult<Self> {
        serde_yaml::from_str(text).map_err(|e| DeployError::manifest(e.to_string()))
    }

    /// Render to YAML text.
    pub fn to_yaml(&self) -> DeployResult<String> {
        serde_yaml::to_string(self).map_err(DeployError::serialisation)
    }
}

/// One entry under `deployments`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestDeployment {
    /// App the deployment belongs to; filled in once the app exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,

    /// Target network.
    #[serde(default)]
    pub network: Network,

    /// Runtime the app is registered on.
    #[serde(default = "default_paratime")]
    pub paratime: String,

    /// Admin account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,

    /// Authorisation policy.
    #[serde(default)]
    pub policy: AppAuthPolicy,

    /// Fields the pipeline does not interpret.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

fn default_paratime() -> String {
    "sapphire".to_owned()
}

/// Resources requested by the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resources {
    /// Memory in MiB.
    pub memory: u64,
    /// Virtual CPUs.
    pub cpus: u16,
    /// Persistent storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<Storage>,
}

/// Storage request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Storage {
    /// Storage kind (`disk-persistent`, `ram`, ...).
    pub kind: String,
    /// Size in MiB.
    pub size: u64,
}

/// Who may endorse an app instance.
///
/// Written as a single-key mapping (`{any: {}}`, `{provider: ...}`), never as
/// a YAML tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EndorsementWire", into = "EndorsementWire")]
pub enum Endorsement {
    /// Any node.
    Any {},
    /// Nodes of the given provider.
    Provider(String),
    /// Instances administered by the given provider.
    ProviderInstanceAdmin(String),
    /// A specific node.
    Node(String),
}

#[derive(Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct EndorsementWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    any: Option<BTreeMap<String, serde_yaml::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    provider_instance_admin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    node: Option<String>,
}

impl TryFrom<EndorsementWire> for Endorsement {
    type Error = DeployError;

    fn try_from(wire: EndorsementWire) -> Result<Self, Self::Error> {
        match wire {
            EndorsementWire {
                any: Some(_),
                provider: None,
                provider_instance_admin: None,
                node: None,
            } => Ok(Self::Any {}),
            EndorsementWire {
                any: None,
                provider: Some(address),
                provider_instance_admin: None,
                node: None,
            } => Ok(Self::Provider(address)),
            EndorsementWire {
                any: None,
                provider: None,
                provider_instance_admin: Some(address),
                node: None,
            } => Ok(Self::ProviderInstanceAdmin(address)),
            EndorsementWire {
                any: None,
                provider: None,
                provider_instance_admin: None,
                node: Some(key),
            } => Ok(Self::Node(key)),
            _ => Err(DeployError::manifest(
                "endorsement must have exactly one of any, provider, provider_instance_admin or node",
            )),
        }
    }
}

impl From<Endorsement> for EndorsementWire {
    fn from(endorsement: Endorsement) -> Self {
        match endorsement {
            Endorsement::Any {} => Self {
                any: Some(BTreeMap::new()),
                ..Self::default()
            },
            Endorsement::Provider(address) => Self {
                provider: Some(address),
                ..Self::default()
            },
            Endorsement::ProviderInstanceAdmin(address) => Self {
                provider_instance_admin: Some(address),
                ..Self::default()
            },
            Endorsement::Node(key) => Self {
                node: Some(key),
                ..Self::default()
            },
        }
    }
}

/// Who pays the instance registration fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeePolicy {
    /// The instance pays.
    Instance,
    /// The endorsing node pays.
    #[default]
    EndorsingNode,
}

/// Application authorisation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppAuthPolicy {
    /// Attestation quote policy; passed through untouched.
    #[serde(default)]
    pub quotes: serde_json::Value,

    /// Accepted enclave identities.
    #[serde(default)]
    pub enclaves: Vec<EnclaveIdentity>,

    /// Accepted endorsements.
    #[serde(default)]
    pub endorsements: Vec<Endorsement>,

    /// Fee policy.
    #[serde(default)]
    pub fees: FeePolicy,

    /// Maximum registration lifetime in epochs.
    #[serde(default = "default_max_expiration")]
    pub max_expiration: u64,
}

const fn default_max_expiration() -> u64 {
    3
}

impl Default for AppAuthPolicy {
    fn default() -> Self {
        Self {
            quotes: serde_json::Value::Null,
            enclaves: Vec::new(),
            endorsements: Vec::new(),
            fees: FeePolicy::default(),
            max_expiration: default_max_expiration(),
        }
    }
}

impl AppAuthPolicy {
    /// Policy used for app registration: no enclaves, any endorsement.
    ///
    /// Real measurements are unknown until the build completes; the update
    /// transaction replaces this policy.
    #[must_use]
    pub fn permissive(template: &Self) -> Self {
        Self {
            quotes: template.quotes.clone(),
            enclaves: Vec::new(),
            endorsements: vec![Endorsement::Any {}],
            fees: template.fees,
            max_expiration: template.max_expiration,
        }
    }

    /// Check if the policy admits any enclave.
    #[must_use]
    pub fn is_permissive(&self) -> bool {
        self.enclaves.is_empty() && self.endorsements.contains(&Endorsement::Any {})
    }
}

/// Enclave identity: `MRENCLAVE` followed by `MRSIGNER`.
///
/// Serialised as `{id: base64(mr_enclave || mr_signer)}`, the form used by
/// `rofl.yaml` and by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EnclaveIdWire", into = "EnclaveIdWire")]
pub struct EnclaveIdentity {
    /// Enclave measurement.
    pub mr_enclave: [u8; MR_ENCLAVE_LEN],
    /// Signer measurement.
    pub mr_signer: Vec<u8>,
}

impl EnclaveIdentity {
    /// Split a concatenated identity.
    pub fn from_bytes(bytes: &[u8]) -> DeployResult<Self> {
        if bytes.len() <= MR_ENCLAVE_LEN {
            return Err(DeployError::manifest(format!(
                "enclave identity must be longer than {MR_ENCLAVE_LEN} bytes, got {}",
                bytes.len()
            )));
        }
        let (enclave, signer) = bytes.split_at(MR_ENCLAVE_LEN);
        let mut mr_enclave = [0u8; MR_ENCLAVE_LEN];
        mr_enclave.copy_from_slice(enclave);
        Ok(Self {
            mr_enclave,
            mr_signer: signer.to_vec(),
        })
    }

    /// Concatenated identity.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(MR_ENCLAVE_LEN + self.mr_signer.len());
        bytes.extend_from_slice(&self.mr_enclave);
        bytes.extend_from_slice(&self.mr_signer);
        bytes
    }
}

#[derive(Serialize, Deserialize)]
struct EnclaveIdWire {
    id: String,
}

impl TryFrom<EnclaveIdWire> for EnclaveIdentity {
    type Error = DeployError;

    fn try_from(wire: EnclaveIdWire) -> Result<Self, Self::Error> {
        let bytes = STANDARD
            .decode(wire.id.trim())
            .map_err(|e| DeployError::manifest(format!("enclave id is not base64: {e}")))?;
        Self::from_bytes(&bytes)
    }
}

impl From<EnclaveIdentity> for EnclaveIdWire {
    fn from(identity: EnclaveIdentity) -> Self {
        Self {
            id: STANDARD.encode(identity.to_bytes()),
        }
    }
}

/// `compose.yaml`, kept as a YAML mapping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComposeFile(serde_yaml::Mapping);

impl ComposeFile {
    /// Wrap a parsed mapping.
    #[must_use]
    pub const fn new(doc: serde_yaml::Mapping) -> Self {
        Self(doc)
    }

    /// Parse from YAML text.
    pub fn from_yaml(text: &str) -> DeployResult<Self> {
        serde_yaml::from_str(text).map_err(|e| DeployError::manifest(e.to_string()))
    }

    /// Render to YAML text.
    pub fn to_yaml(&self) -> DeployResult<String> {
        serde_yaml::to_string(&self.0).map_err(DeployError::serialisation)
    }

    /// Names of the declared services.
    #[must_use]
    pub fn service_names(&self) -> Vec<String> {
        self.0
            .get("services")
            .and_then(serde_yaml::Value::as_mapping)
            .map(|services| {
                services
                    .keys()
                    .filter_map(|k| k.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Rendered build inputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInputs {
    /// `rofl.yaml` text.
    pub manifest: String,
    /// `compose.yaml` text.
    pub compose: String,
}

/// Values substituted into a template manifest.
#[derive(Debug, Clone, Copy)]
pub struct RenderParams<'a> {
    /// The registered app.
    pub app_id: &'a AppId,
    /// Target network.
    pub network: Network,
    /// App name.
    pub name: &'a str,
    /// App version, if set.
    pub version: Option<&'a str>,
    /// Resource override.
    pub resources: Option<&'a Resources>,
    /// Admin account from the app record.
    pub admin: Option<&'a str>,
}

/// Render the template into build inputs for the given app.
pub fn render(
    manifest: &RoflManifest,
    compose: &ComposeFile,
    params: &RenderParams<'_>,
) -> DeployResult<BuildInputs> {
    let mut manifest = manifest.clone();
    manifest.name = params.name.to_owned();
    if let Some(version) = params.version.filter(|v| !v.is_empty()) {
        manifest.version = Some(version.to_owned());
    }
    if let Some(resources) = params.resources {
        manifest.resources = resources.clone();
    }

    let deployment = manifest.default_deployment_mut()?;
    deployment.app_id = Some(params.app_id.to_string());
    deployment.network = params.network;
    if let Some(admin) = params.admin {
        deployment.admin = Some(admin.to_owned());
    }

    Ok(BuildInputs {
        manifest: manifest.to_yaml()?,
        compose: compose.to_yaml()?,
    })
}

/// Decode a base64 `rofl.yaml` returned by the build backend and extract the
/// policy of its `default` deployment.
///
/// Fails if the build did not record any enclave identity.
pub fn decode_built_policy(encoded: &str) -> DeployResult<AppAuthPolicy> {
    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| DeployError::manifest(format!("build manifest is not base64: {e}")))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| DeployError::manifest(format!("build manifest is not UTF-8: {e}")))?;
    let manifest = RoflManifest::from_yaml(&text)?;
    let policy = manifest.default_deployment()?.policy.clone();

    if policy.enclaves.is_empty() {
        return Err(DeployError::manifest(
            "build manifest lists no enclave identities",
        ));
    }
    Ok(policy)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEMPLATE: &str = r#"
name: template
version: 0.1.0
tee: tdx
kind: container
resources:
  memory: 512
  cpus: 1
  storage:
    kind: disk-persistent
    size: 512
artifacts:
  firmware: https://example.invalid/ovmf.fd
deployments:
  default:
    network: testnet
    paratime: sapphire
    policy:
      quotes:
        pcs:
          tcb_validity_period: 30
          min_tcb_evaluation_data_number: 18
      enclaves: []
      endorsements:
        - any: {}
      fees: endorsing_node
      max_expiration: 3
"#;

    pub(crate) fn identity(seed: u8) -> EnclaveIdentity {
        EnclaveIdentity {
            mr_enclave: [seed; MR_ENCLAVE_LEN],
            mr_signer: vec![seed.wrapping_add(1); 32],
        }
    }

    pub(crate) fn built_manifest(enclaves: &[EnclaveIdentity]) -> String {
        let mut manifest = RoflManifest::from_yaml(TEMPLATE).unwrap();
        manifest
            .deployments
            .get_mut(DEFAULT_DEPLOYMENT)
            .unwrap()
            .policy
            .enclaves = enclaves.to_vec();
        STANDARD.encode(manifest.to_yaml().unwrap())
    }

    #[test]
    fn template_parses_and_keeps_unknown_fields() {
        let manifest = RoflManifest::from_yaml(TEMPLATE).unwrap();
        assert_eq!(manifest.resources.memory, 512);
        assert!(manifest.extra.contains_key("artifacts"));

        let policy = &manifest.default_deployment().unwrap().policy;
        assert!(policy.is_permissive());
        assert_eq!(policy.fees, FeePolicy::EndorsingNode);

        let rendered = manifest.to_yaml().unwrap();
        assert!(rendered.contains("firmware"));
    }

    #[test]
    fn enclave_identity_splits_measurements() {
        let mut bytes = vec![7u8; MR_ENCLAVE_LEN];
        bytes.extend_from_slice(&[9u8; 16]);

        let identity = EnclaveIdentity::from_bytes(&bytes).unwrap();
        assert_eq!(identity.mr_enclave, [7u8; MR_ENCLAVE_LEN]);
        assert_eq!(identity.mr_signer, vec![9u8; 16]);
        assert_eq!(identity.to_bytes(), bytes);

        assert!(EnclaveIdentity::from_bytes(&[0u8; MR_ENCLAVE_LEN]).is_err());
    }

    #[test]
    fn enclave_identity_wire_form() {
        let json = serde_json::to_value(identity(1)).unwrap();
        let id = json["id"].as_str().unwrap();
        assert_eq!(STANDARD.decode(id).unwrap(), identity(1).to_bytes());

        let back: EnclaveIdentity = serde_json::from_value(json).unwrap();
        assert_eq!(back, identity(1));
    }

    #[test]
    fn endorsement_wire_form() {
        assert_eq!(
            serde_json::to_value(Endorsement::Any {}).unwrap(),
            serde_json::json!({"any": {}})
        );
        assert_eq!(
            serde_json::to_value(Endorsement::Provider("oasis1p".into())).unwrap(),
            serde_json::json!({"provider": "oasis1p"})
        );
    }

    #[test]
    fn policy_survives_yaml_round_trip() {
        let manifest = RoflManifest::from_yaml(TEMPLATE).unwrap();
        let mut policy = AppAuthPolicy::permissive(&manifest.default_deployment().unwrap().policy);
        policy.endorsements.extend([
            Endorsement::Provider("oasis1p".into()),
            Endorsement::ProviderInstanceAdmin("oasis1a".into()),
            Endorsement::Node("node".into()),
        ]);

        let yaml = serde_yaml::to_string(&policy).unwrap();
        assert!(yaml.contains("- any: {}"));
        assert!(!yaml.contains('!'));

        let back: AppAuthPolicy = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, policy);
    }

    #[test]
    fn endorsement_rejects_ambiguous_entries() {
        assert!(serde_yaml::from_str::<Endorsement>("{}").is_err());
        assert!(serde_yaml::from_str::<Endorsement>("any: {}\nnode: n1\n").is_err());
        assert!(serde_yaml::from_str::<Endorsement>("anyone: {}\n").is_err());
        assert_eq!(
            serde_yaml::from_str::<Endorsement>("node: n1\n").unwrap(),
            Endorsement::Node("n1".into())
        );
    }

    #[test]
    fn permissive_policy_keeps_quote_policy() {
        let manifest = RoflManifest::from_yaml(TEMPLATE).unwrap();
        let template = &manifest.default_deployment().unwrap().policy;
        let mut tightened = template.clone();
        tightened.enclaves = vec![identity(3)];
        tightened.endorsements = vec![Endorsement::Node("node".into())];

        let permissive = AppAuthPolicy::permissive(&tightened);
        assert!(permissive.is_permissive());
        assert_eq!(permissive.quotes, template.quotes);
        assert_eq!(permissive.max_expiration, 3);
    }

    #[test]
    fn render_sets_app_identity_and_overrides() {
        let manifest = RoflManifest::from_yaml(TEMPLATE).unwrap();
        let compose = ComposeFile::from_yaml("services:\n  web:\n    image: nginx\n").unwrap();
        let app_id = AppId::new("rofl1qqq");
        let resources = Resources {
            memory: 2048,
            cpus: 2,
            storage: None,
        };

        let inputs = render(
            &manifest,
            &compose,
            &RenderParams {
                app_id: &app_id,
                network: Network::Mainnet,
                name: "my-app",
                version: Some("1.2.0"),
                resources: Some(&resources),
                admin: Some("oasis1admin"),
            },
        )
        .unwrap();

        let rendered = RoflManifest::from_yaml(&inputs.manifest).unwrap();
        assert_eq!(rendered.name, "my-app");
        assert_eq!(rendered.version.as_deref(), Some("1.2.0"));
        assert_eq!(rendered.resources, resources);
        let deployment = rendered.default_deployment().unwrap();
        assert_eq!(deployment.app_id.as_deref(), Some("rofl1qqq"));
        assert_eq!(deployment.network, Network::Mainnet);
        assert_eq!(deployment.admin.as_deref(), Some("oasis1admin"));

        assert_eq!(
            ComposeFile::from_yaml(&inputs.compose)
                .unwrap()
                .service_names(),
            vec!["web".to_owned()]
        );
    }

    #[test]
    fn render_requires_default_deployment() {
        let mut manifest = RoflManifest::from_yaml(TEMPLATE).unwrap();
        manifest.deployments.clear();
        let app_id = AppId::new("rofl1qqq");

        let err = render(
            &manifest,
            &ComposeFile::default(),
            &RenderParams {
                app_id: &app_id,
                network: Network::Testnet,
                name: "x",
                version: None,
                resources: None,
                admin: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, DeployError::MissingField("deployments.default")));
    }

    #[test]
    fn built_policy_decodes_enclaves() {
        let encoded = built_manifest(&[identity(1), identity(2)]);
        let policy = decode_built_policy(&encoded).unwrap();
        assert_eq!(policy.enclaves, vec![identity(1), identity(2)]);
    }

    #[test]
    fn built_policy_rejects_malformed_input() {
        assert!(matches!(
            decode_built_policy("%%%").unwrap_err(),
            DeployError::Manifest(_)
        ));
        assert!(matches!(
            decode_built_policy(&STANDARD.encode(": [")).unwrap_err(),
            DeployError::Manifest(_)
        ));
        assert!(matches!(
            decode_built_policy(&built_manifest(&[])).unwrap_err(),
            DeployError::Manifest(_)
        ));
    }
}
