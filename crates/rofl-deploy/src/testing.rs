//! In-memory collaborators for tests.
//!
//! Every mock is cheaply cloneable and shares its state between clones, so a
//! test can hand one clone to the orchestrator and inspect another. Mocks
//! created through [`MockSet`] also append to a shared [`CallLog`], which
//! records the order in which collaborators were invoked.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rofl_secrets::{SecretEncryptionKey, X25519Sealer};

use crate::artifacts::ArtifactStore;
use crate::build::{BuildBackend, BuildResults};
use crate::chain::{AppRecord, LedgerReader, ReceiptStatus, ReceiptWatcher, RuntimeCall, TransactionSigner};
use crate::deployment::Collaborators;
use crate::error::{DeployError, DeployResult};
use crate::indexer::{EventBody, EventIndexer, EventPage, IndexedEvent, APP_CREATED_EVENT};
use crate::manifest::{AppAuthPolicy, BuildInputs};
use crate::types::{AppId, AuthToken, CallKind, Network, TaskId, TxHash};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn pause(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// A recorded collaborator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    /// A call was sent for signing.
    Sign(CallKind),
    /// A receipt was polled.
    Receipt(TxHash),
    /// The indexer was queried for a transaction hash.
    Events(String),
    /// An app record was read.
    ReadApp(AppId),
    /// A build was submitted.
    SubmitBuild,
    /// Build results were fetched.
    FetchBuild(TaskId),
    /// An artifact was uploaded.
    Upload(String),
    /// An artifact was downloaded.
    Download(String),
}

/// Ordered log of collaborator invocations.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, call: Call) {
        lock(&self.0).push(call);
    }

    /// All recorded calls in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        lock(&self.0).clone()
    }

    /// Index of the first call matching `predicate`.
    pub fn position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        lock(&self.0).iter().position(predicate)
    }

    /// Index of the last call matching `predicate`.
    pub fn last_position(&self, predicate: impl Fn(&Call) -> bool) -> Option<usize> {
        lock(&self.0).iter().rposition(predicate)
    }
}

/// Page with a single app-created event carrying `id`.
#[must_use]
pub fn app_created(id: &str) -> EventPage {
    EventPage {
        events: vec![IndexedEvent {
            kind: Some(APP_CREATED_EVENT.to_owned()),
            body: EventBody {
                id: Some(id.to_owned()),
            },
        }],
    }
}

#[derive(Default)]
struct IndexerState {
    script: Mutex<VecDeque<DeployResult<EventPage>>>,
    fallback: Mutex<EventPage>,
    hashes: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
}

/// Scripted event indexer.
///
/// Answers with queued responses in order, then with the fallback page
/// (empty unless set with [`MockIndexer::otherwise`]).
#[derive(Clone, Default)]
pub struct MockIndexer {
    state: Arc<IndexerState>,
    log: CallLog,
}

impl MockIndexer {
    /// Create an indexer that never finds anything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response.
    #[must_use]
    pub fn respond(self, response: DeployResult<EventPage>) -> Self {
        lock(&self.state.script).push_back(response);
        self
    }

    /// Page returned once the queue is drained.
    #[must_use]
    pub fn otherwise(self, page: EventPage) -> Self {
        *lock(&self.state.fallback) = page;
        self
    }

    /// Delay every response.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.state.latency) = latency;
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Number of queries made.
    #[must_use]
    pub fn calls(&self) -> usize {
        lock(&self.state.hashes).len()
    }

    /// Transaction hashes queried, in order.
    #[must_use]
    pub fn queried_hashes(&self) -> Vec<String> {
        lock(&self.state.hashes).clone()
    }
}

#[async_trait]
impl EventIndexer for MockIndexer {
    async fn events_by_tx(
        &self,
        _network: Network,
        _event_type: &str,
        tx_hash: &str,
        _token: &AuthToken,
    ) -> DeployResult<EventPage> {
        let latency = *lock(&self.state.latency);
        pause(latency).await;
        lock(&self.state.hashes).push(tx_hash.to_owned());
        self.log.push(Call::Events(tx_hash.to_owned()));

        let next = lock(&self.state.script).pop_front();
        next.unwrap_or_else(|| Ok(lock(&self.state.fallback).clone()))
    }
}

#[derive(Default)]
struct BuildState {
    task_id: Mutex<Option<TaskId>>,
    submit_error: Mutex<Option<DeployError>>,
    submissions: Mutex<Vec<BuildInputs>>,
    script: Mutex<VecDeque<DeployResult<BuildResults>>>,
    fallback: Mutex<BuildResults>,
    fetches: Mutex<usize>,
    latency: Mutex<Duration>,
}

/// Scripted build backend.
///
/// Accepts every submission as task `t1` (see [`MockBuildBackend::task_id`]),
/// answers result fetches with queued responses, then with the fallback
/// (still running unless set with [`MockBuildBackend::otherwise`]).
#[derive(Clone, Default)]
pub struct MockBuildBackend {
    state: Arc<BuildState>,
    log: CallLog,
}

impl MockBuildBackend {
    /// Create a backend whose builds never finish.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Task id returned for submissions.
    #[must_use]
    pub fn task_id(self, task_id: &str) -> Self {
        *lock(&self.state.task_id) = Some(TaskId::new(task_id));
        self
    }

    /// Fail the next submission.
    #[must_use]
    pub fn fail_submit(self, error: DeployError) -> Self {
        *lock(&self.state.submit_error) = Some(error);
        self
    }

    /// Queue a result response.
    #[must_use]
    pub fn respond(self, response: DeployResult<BuildResults>) -> Self {
        lock(&self.state.script).push_back(response);
        self
    }

    /// Results returned once the queue is drained.
    #[must_use]
    pub fn otherwise(self, results: BuildResults) -> Self {
        *lock(&self.state.fallback) = results;
        self
    }

    /// Delay every response.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.state.latency) = latency;
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Inputs submitted so far.
    #[must_use]
    pub fn submissions(&self) -> Vec<BuildInputs> {
        lock(&self.state.submissions).clone()
    }

    /// Number of result fetches made.
    #[must_use]
    pub fn result_fetches(&self) -> usize {
        *lock(&self.state.fetches)
    }
}

#[async_trait]
impl BuildBackend for MockBuildBackend {
    async fn submit(&self, inputs: &BuildInputs, _token: &AuthToken) -> DeployResult<TaskId> {
        let latency = *lock(&self.state.latency);
        pause(latency).await;
        self.log.push(Call::SubmitBuild);
        lock(&self.state.submissions).push(inputs.clone());

        if let Some(error) = lock(&self.state.submit_error).take() {
            return Err(error);
        }
        Ok(lock(&self.state.task_id)
            .clone()
            .unwrap_or_else(|| TaskId::new("t1")))
    }

    async fn results(&self, task_id: &TaskId, _token: &AuthToken) -> DeployResult<BuildResults> {
        let latency = *lock(&self.state.latency);
        pause(latency).await;
        self.log.push(Call::FetchBuild(task_id.clone()));
        *lock(&self.state.fetches) += 1;

        let next = lock(&self.state.script).pop_front();
        next.unwrap_or_else(|| Ok(lock(&self.state.fallback).clone()))
    }
}

#[derive(Default)]
struct ArtifactState {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    fail_uploads: Mutex<bool>,
}

/// In-memory artifact store.
#[derive(Clone, Default)]
pub struct MockArtifactStore {
    state: Arc<ArtifactState>,
    log: CallLog,
}

impl MockArtifactStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every upload with a server error.
    #[must_use]
    pub fn fail_uploads(self) -> Self {
        *lock(&self.state.fail_uploads) = true;
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Stored blob, if any.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Vec<u8>> {
        lock(&self.state.blobs).get(id).cloned()
    }

    /// Stored ids, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = lock(&self.state.blobs).keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl ArtifactStore for MockArtifactStore {
    async fn upload(&self, id: &str, bytes: Vec<u8>, _token: &AuthToken) -> DeployResult<()> {
        self.log.push(Call::Upload(id.to_owned()));
        if *lock(&self.state.fail_uploads) {
            return Err(DeployError::UnexpectedStatus {
                service: "artifact store",
                status: 500,
                body: "upload rejected".to_owned(),
            });
        }
        lock(&self.state.blobs).insert(id.to_owned(), bytes);
        Ok(())
    }

    async fn download(&self, id: &str, _token: &AuthToken) -> DeployResult<Option<Vec<u8>>> {
        self.log.push(Call::Download(id.to_owned()));
        Ok(self.get(id))
    }
}

#[derive(Default)]
struct SignerState {
    declined: Mutex<HashSet<CallKind>>,
    submitted: Mutex<Vec<RuntimeCall>>,
    latency: Mutex<Duration>,
}

/// Signing provider that signs everything unless told to decline.
///
/// The n-th submitted call gets hash [`MockSigner::hash_for`]`(n)`, counting
/// from one.
#[derive(Clone, Default)]
pub struct MockSigner {
    state: Arc<SignerState>,
    log: CallLog,
}

impl MockSigner {
    /// Create a signer that accepts every call.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash given to the n-th submitted call.
    #[must_use]
    pub fn hash_for(n: usize) -> String {
        format!("0xabc{n:061x}")
    }

    /// Decline calls of the given kind.
    #[must_use]
    pub fn decline(self, kind: CallKind) -> Self {
        lock(&self.state.declined).insert(kind);
        self
    }

    /// Delay every signature.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.state.latency) = latency;
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Calls presented for signing, in order.
    #[must_use]
    pub fn submitted(&self) -> Vec<RuntimeCall> {
        lock(&self.state.submitted).clone()
    }

    /// Calls of one kind presented for signing.
    #[must_use]
    pub fn submitted_of(&self, kind: CallKind) -> Vec<RuntimeCall> {
        self.submitted()
            .into_iter()
            .filter(|call| call.kind() == kind)
            .collect()
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    async fn sign_and_submit(
        &self,
        _network: Network,
        call: &RuntimeCall,
        _token: &AuthToken,
    ) -> DeployResult<TxHash> {
        let latency = *lock(&self.state.latency);
        pause(latency).await;
        self.log.push(Call::Sign(call.kind()));

        let n = {
            let mut submitted = lock(&self.state.submitted);
            submitted.push(call.clone());
            submitted.len()
        };
        if lock(&self.state.declined).contains(&call.kind()) {
            return Err(DeployError::SignatureDeclined);
        }
        Ok(TxHash::new(Self::hash_for(n)))
    }
}

#[derive(Default)]
struct ReceiptState {
    pending_for: Mutex<u32>,
    reverted: Mutex<HashMap<String, String>>,
    polls: Mutex<HashMap<String, u32>>,
    latency: Mutex<Duration>,
}

/// Receipt source that confirms every transaction.
#[derive(Clone, Default)]
pub struct MockReceipts {
    state: Arc<ReceiptState>,
    log: CallLog,
}

impl MockReceipts {
    /// Create a receipt source that confirms on the first poll.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Report every transaction as pending for this many polls.
    #[must_use]
    pub fn pending_for(self, polls: u32) -> Self {
        *lock(&self.state.pending_for) = polls;
        self
    }

    /// Revert the transaction with the given hash.
    #[must_use]
    pub fn revert(self, hash: impl Into<String>, reason: &str) -> Self {
        lock(&self.state.reverted).insert(hash.into(), reason.to_owned());
        self
    }

    /// Delay every poll.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.state.latency) = latency;
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// Number of polls for a hash.
    #[must_use]
    pub fn polls(&self, hash: &TxHash) -> u32 {
        lock(&self.state.polls)
            .get(hash.as_str())
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ReceiptWatcher for MockReceipts {
    async fn receipt_status(
        &self,
        _network: Network,
        hash: &TxHash,
        _token: &AuthToken,
    ) -> DeployResult<ReceiptStatus> {
        let latency = *lock(&self.state.latency);
        pause(latency).await;
        self.log.push(Call::Receipt(hash.clone()));

        let polls = {
            let mut polls = lock(&self.state.polls);
            let count = polls.entry(hash.as_str().to_owned()).or_default();
            *count += 1;
            *count
        };
        if polls <= *lock(&self.state.pending_for) {
            return Ok(ReceiptStatus::Pending);
        }
        Ok(match lock(&self.state.reverted).get(hash.as_str()) {
            Some(reason) => ReceiptStatus::Reverted {
                reason: reason.clone(),
            },
            None => ReceiptStatus::Confirmed,
        })
    }
}

struct LedgerState {
    sek: SecretEncryptionKey,
    admin: Option<String>,
    metadata: BTreeMap<String, String>,
    secrets: Mutex<BTreeMap<String, String>>,
    reads: Mutex<Vec<AppId>>,
    latency: Mutex<Duration>,
}

/// Ledger that knows every app and reports the same record for each.
#[derive(Clone)]
pub struct MockLedger {
    state: Arc<LedgerState>,
    log: CallLog,
}

impl MockLedger {
    /// Default admin reported on records.
    pub const ADMIN: &'static str = "oasis1qzadmin";

    /// Create a ledger whose apps use `sek`.
    #[must_use]
    pub fn new(sek: SecretEncryptionKey) -> Self {
        Self {
            state: Arc::new(LedgerState {
                sek,
                admin: Some(Self::ADMIN.to_owned()),
                metadata: BTreeMap::from([(
                    "net.oasis.rofl.name".to_owned(),
                    "on-chain-name".to_owned(),
                )]),
                secrets: Mutex::new(BTreeMap::new()),
                reads: Mutex::new(Vec::new()),
                latency: Mutex::new(Duration::ZERO),
            }),
            log: CallLog::default(),
        }
    }

    /// Report an already sealed secret on every record.
    #[must_use]
    pub fn with_secret(self, name: &str, sealed: &str) -> Self {
        lock(&self.state.secrets).insert(name.to_owned(), sealed.to_owned());
        self
    }

    /// Delay every read.
    #[must_use]
    pub fn with_latency(self, latency: Duration) -> Self {
        *lock(&self.state.latency) = latency;
        self
    }

    fn with_log(mut self, log: CallLog) -> Self {
        self.log = log;
        self
    }

    /// App ids read so far.
    #[must_use]
    pub fn reads(&self) -> Vec<AppId> {
        lock(&self.state.reads).clone()
    }
}

#[async_trait]
impl LedgerReader for MockLedger {
    async fn app(
        &self,
        _network: Network,
        id: &AppId,
        _token: &AuthToken,
    ) -> DeployResult<AppRecord> {
        self.log.push(Call::ReadApp(id.clone()));
        lock(&self.state.reads).push(id.clone());
        let latency = *lock(&self.state.latency);
        pause(latency).await;

        Ok(AppRecord {
            id: id.clone(),
            admin: self.state.admin.clone(),
            metadata: self.state.metadata.clone(),
            sek: self.state.sek,
            policy: AppAuthPolicy::permissive(&AppAuthPolicy::default()),
            secrets: lock(&self.state.secrets).clone(),
        })
    }
}

/// A full set of mocks sharing one [`CallLog`].
#[derive(Clone)]
pub struct MockSet {
    /// Shared invocation log.
    pub log: CallLog,
    /// Signing provider.
    pub signer: MockSigner,
    /// Receipt source.
    pub receipts: MockReceipts,
    /// Ledger reader.
    pub ledger: MockLedger,
    /// Event indexer.
    pub indexer: MockIndexer,
    /// Build backend.
    pub builds: MockBuildBackend,
    /// Artifact store.
    pub artifacts: MockArtifactStore,
}

impl MockSet {
    /// Wire the given mocks to a shared log.
    #[must_use]
    pub fn new(
        signer: MockSigner,
        receipts: MockReceipts,
        ledger: MockLedger,
        indexer: MockIndexer,
        builds: MockBuildBackend,
        artifacts: MockArtifactStore,
    ) -> Self {
        let log = CallLog::new();
        Self {
            signer: signer.with_log(log.clone()),
            receipts: receipts.with_log(log.clone()),
            ledger: ledger.with_log(log.clone()),
            indexer: indexer.with_log(log.clone()),
            builds: builds.with_log(log.clone()),
            artifacts: artifacts.with_log(log.clone()),
            log,
        }
    }

    /// Collaborators backed by these mocks and the real sealer.
    #[must_use]
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            signer: Arc::new(self.signer.clone()),
            receipts: Arc::new(self.receipts.clone()),
            ledger: Arc::new(self.ledger.clone()),
            indexer: Arc::new(self.indexer.clone()),
            builds: Arc::new(self.builds.clone()),
            artifacts: Arc::new(self.artifacts.clone()),
            sealer: Arc::new(X25519Sealer),
        }
    }
}
