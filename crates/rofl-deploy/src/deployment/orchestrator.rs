//! The deployment state machine.

use std::collections::BTreeMap;

use rofl_secrets::seal_all;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::artifacts::{compose_artifact_id, manifest_artifact_id};
use crate::build::wait_for_build_result;
use crate::chain::{
    AppRecord, CreateBody, DeploymentDescriptor, IdentifierScheme, InstanceCreateBody,
    RuntimeCall, TransactionSubmitter, UpdateBody, ORC_REF_KEY,
};
use crate::error::{DeployError, DeployResult, DeploymentFailure};
use crate::indexer::wait_for_app_id;
use crate::manifest::{self, AppAuthPolicy, RenderParams};
use crate::stage::{DeploymentStage, DeploymentStatus, Milestone, Timeline};
use crate::types::{AppId, BuildJob, BuildResult, DeploymentId, TransactionReceipt, TxHash};

use super::handle::DeploymentHandle;
use super::{Collaborators, DeploymentRequest, PipelineSettings};

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    /// Run identifier.
    pub deployment_id: DeploymentId,
    /// The created and deployed app.
    pub app_id: AppId,
    /// The build that was deployed.
    pub build: BuildResult,
    /// Receipts of the create, update and deploy transactions, in order.
    pub receipts: Vec<TransactionReceipt>,
    /// When each milestone was reached.
    pub timeline: Timeline,
}

/// Runs deployment pipelines against a set of collaborators.
///
/// The orchestrator holds no per-run state; concurrent runs share only the
/// collaborators.
#[derive(Debug, Clone)]
pub struct DeploymentOrchestrator {
    collaborators: Collaborators,
    settings: PipelineSettings,
}

impl DeploymentOrchestrator {
    /// Create a new orchestrator.
    #[must_use]
    pub const fn new(collaborators: Collaborators, settings: PipelineSettings) -> Self {
        Self {
            collaborators,
            settings,
        }
    }

    /// Run a pipeline to completion on the current task.
    pub async fn run(
        &self,
        request: DeploymentRequest,
        cancel: CancellationToken,
    ) -> Result<DeploymentOutcome, DeploymentFailure> {
        let (status, _) = watch::channel(DeploymentStatus::default());
        self.execute(DeploymentId::generate(), request, cancel, status)
            .await
    }

    /// Run a pipeline on its own task.
    ///
    /// The returned handle publishes stage changes and cancels the run when
    /// dropped.
    #[must_use]
    pub fn spawn(&self, request: DeploymentRequest) -> DeploymentHandle {
        let id = DeploymentId::generate();
        let cancel = CancellationToken::new();
        let (status, receiver) = watch::channel(DeploymentStatus::default());

        let orchestrator = self.clone();
        let task_id = id.clone();
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            orchestrator
                .execute(task_id, request, task_cancel, status)
                .await
        });

        DeploymentHandle::new(id, receiver, cancel, task)
    }

    #[instrument(
        skip_all,
        fields(
            deployment_id = %id,
            network = %request.network,
            template = %request.template.id,
        )
    )]
    async fn execute(
        &self,
        id: DeploymentId,
        request: DeploymentRequest,
        cancel: CancellationToken,
        status: watch::Sender<DeploymentStatus>,
    ) -> Result<DeploymentOutcome, DeploymentFailure> {
        info!("deployment started");
        let mut run = Run {
            id,
            request: &request,
            collaborators: &self.collaborators,
            settings: &self.settings,
            submitter: TransactionSubmitter::new(
                self.collaborators.signer.clone(),
                self.collaborators.receipts.clone(),
                request.network,
                request.auth_token.clone(),
                self.settings.confirmation,
            ),
            cancel: &cancel,
            status: &status,
            stage: DeploymentStage::Idle,
            app_id: None,
            timeline: Timeline::new(),
            receipts: Vec::new(),
        };

        match run.drive().await {
            Ok(outcome) => {
                info!(app_id = %outcome.app_id, "deployment finished");
                Ok(outcome)
            }
            Err(cause) => {
                let failure = DeploymentFailure::new(run.stage, cause, run.app_id.clone());
                status.send_replace(DeploymentStatus::Failed {
                    stage: failure.stage,
                    reason: failure.cause.to_string(),
                });
                match &failure.app_id {
                    Some(app_id) => error!(
                        stage = %failure.stage,
                        app_id = %app_id,
                        error = %failure.cause,
                        "deployment failed; app remains registered"
                    ),
                    None => error!(
                        stage = %failure.stage,
                        error = %failure.cause,
                        "deployment failed"
                    ),
                }
                Err(failure)
            }
        }
    }
}

/// Data available once the create transaction is confirmed.
struct Registered {
    create_hash: TxHash,
}

/// Data available once the app id is known.
struct Identified {
    app_id: AppId,
}

/// Data available once the build is submitted.
struct Submitted {
    app_id: AppId,
    record: AppRecord,
    job: BuildJob,
}

/// Data available once the build has finished.
struct Built {
    app_id: AppId,
    record: AppRecord,
    job: BuildJob,
    result: BuildResult,
}

/// Data available once the update transaction is confirmed.
struct Updated {
    app_id: AppId,
    result: BuildResult,
}

/// State of one pipeline run.
struct Run<'a> {
    id: DeploymentId,
    request: &'a DeploymentRequest,
    collaborators: &'a Collaborators,
    settings: &'a PipelineSettings,
    submitter: TransactionSubmitter,
    cancel: &'a CancellationToken,
    status: &'a watch::Sender<DeploymentStatus>,
    stage: DeploymentStage,
    app_id: Option<AppId>,
    timeline: Timeline,
    receipts: Vec<TransactionReceipt>,
}

impl Run<'_> {
    async fn drive(&mut self) -> DeployResult<DeploymentOutcome> {
        self.enter(DeploymentStage::Creating);
        let registered = self.create().await?;

        self.enter(DeploymentStage::AwaitingAppId);
        let identified = self.identify(registered).await?;

        self.enter(DeploymentStage::Building);
        let submitted = self.submit_build(identified).await?;

        self.enter(DeploymentStage::AwaitingBuild);
        let built = self.await_build(submitted).await?;

        self.enter(DeploymentStage::Updating);
        let updated = self.update(built).await?;

        self.enter(DeploymentStage::Deploying);
        let (app_id, build) = self.deploy(updated).await?;

        self.enter(DeploymentStage::Done);
        Ok(DeploymentOutcome {
            deployment_id: self.id.clone(),
            app_id,
            build,
            receipts: std::mem::take(&mut self.receipts),
            timeline: std::mem::take(&mut self.timeline),
        })
    }

    fn enter(&mut self, stage: DeploymentStage) {
        self.stage = stage;
        self.status.send_replace(DeploymentStatus::Running { stage });
        info!(stage = %stage, "entering stage");
    }

    fn ensure_live(&self) -> DeployResult<()> {
        if self.cancel.is_cancelled() {
            Err(DeployError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn submit(&mut self, call: RuntimeCall, milestone: Milestone) -> DeployResult<()> {
        let receipt = self.submitter.submit_and_confirm(&call, self.cancel).await?;
        self.timeline.record(milestone);
        self.receipts.push(receipt);
        Ok(())
    }

    async fn create(&mut self) -> DeployResult<Registered> {
        let template = self.request.template.manifest.default_deployment()?;
        let policy = AppAuthPolicy::permissive(&template.policy);
        warn!(
            "registering app with a permissive enclave policy until the update transaction \
             is confirmed"
        );

        let call = RuntimeCall::Create(CreateBody {
            scheme: IdentifierScheme::CreatorNonce,
            policy,
            metadata: self.request.app.metadata.to_chain_metadata(),
        });
        self.submit(call, Milestone::CreateConfirmed).await?;

        let create_hash = self
            .receipts
            .last()
            .map(|receipt| receipt.hash.clone())
            .ok_or_else(|| DeployError::internal("create receipt missing"))?;
        Ok(Registered { create_hash })
    }

    async fn identify(&mut self, registered: Registered) -> DeployResult<Identified> {
        let app_id = wait_for_app_id(
            self.collaborators.indexer.as_ref(),
            &registered.create_hash,
            self.request.network,
            &self.request.auth_token,
            &self.settings.app_id,
            self.cancel,
        )
        .await?;

        self.app_id = Some(app_id.clone());
        self.timeline.record(Milestone::AppIdResolved);
        Ok(Identified { app_id })
    }

    async fn submit_build(&mut self, identified: Identified) -> DeployResult<Submitted> {
        let Identified { app_id } = identified;

        let record = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(DeployError::Cancelled),
            record = self
                .collaborators
                .ledger
                .app(self.request.network, &app_id, &self.request.auth_token) => record?,
        };

        let metadata = &self.request.app.metadata;
        let template = &self.request.template;
        let name = if metadata.name.is_empty() {
            template.manifest.name.as_str()
        } else {
            metadata.name.as_str()
        };
        let inputs = manifest::render(
            &template.manifest,
            &template.compose,
            &RenderParams {
                app_id: &app_id,
                network: self.request.network,
                name,
                version: Some(metadata.version.as_str()),
                resources: self.request.app.resources.as_ref(),
                admin: record.admin.as_deref(),
            },
        )?;

        let task_id = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(DeployError::Cancelled),
            task_id = self.collaborators.builds.submit(&inputs, &self.request.auth_token) => task_id?,
        };
        info!(task_id = %task_id, "build submitted");
        self.timeline.record(Milestone::BuildSubmitted);

        Ok(Submitted {
            app_id,
            record,
            job: BuildJob {
                task_id,
                manifest: inputs.manifest,
                compose: inputs.compose,
            },
        })
    }

    async fn await_build(&mut self, submitted: Submitted) -> DeployResult<Built> {
        let Submitted {
            app_id,
            record,
            job,
        } = submitted;

        let result = wait_for_build_result(
            self.collaborators.builds.as_ref(),
            &job.task_id,
            &self.request.auth_token,
            &self.settings.build,
            self.cancel,
        )
        .await?;
        self.timeline.record(Milestone::BuildResolved);

        Ok(Built {
            app_id,
            record,
            job,
            result,
        })
    }

    async fn update(&mut self, built: Built) -> DeployResult<Updated> {
        let Built {
            app_id,
            record,
            job,
            result,
        } = built;
        let encoded = result
            .manifest
            .as_deref()
            .ok_or(DeployError::MissingField("manifest"))?;

        let (policy, secrets, ()) = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(DeployError::Cancelled),
            prepared = async {
                tokio::try_join!(
                    async { manifest::decode_built_policy(encoded) },
                    async { self.seal_secrets(&record) },
                    self.persist_inputs(&app_id, &job),
                )
            } => prepared?,
        };
        info!(
            enclaves = policy.enclaves.len(),
            secrets = secrets.len(),
            "enclave policy decoded"
        );

        self.ensure_live()?;
        let call = RuntimeCall::Update(UpdateBody {
            id: app_id.clone(),
            admin: record.admin,
            policy,
            metadata: record.metadata,
            secrets,
        });
        self.submit(call, Milestone::UpdateConfirmed).await?;

        Ok(Updated { app_id, result })
    }

    async fn deploy(&mut self, updated: Updated) -> DeployResult<(AppId, BuildResult)> {
        let Updated { app_id, result } = updated;
        let offer = &self.request.app.offer;

        self.ensure_live()?;
        let call = RuntimeCall::Deploy(InstanceCreateBody {
            provider: offer.provider.clone(),
            offer: offer.offer.clone(),
            deployment: DeploymentDescriptor {
                app_id: app_id.clone(),
                manifest_hash: result.manifest_hash.clone(),
                metadata: BTreeMap::from([(
                    ORC_REF_KEY.to_owned(),
                    result.oci_reference.clone(),
                )]),
            },
            term: offer.term,
            term_count: offer.term_count,
        });
        self.submit(call, Milestone::DeployConfirmed).await?;

        Ok((app_id, result))
    }

    /// Seal the requested secrets over the ones already on the record.
    fn seal_secrets(&self, record: &AppRecord) -> DeployResult<BTreeMap<String, String>> {
        let mut secrets = record.secrets.clone();
        secrets.extend(seal_all(
            self.collaborators.sealer.as_ref(),
            &self.request.app.secrets,
            &record.sek,
        )?);
        Ok(secrets)
    }

    async fn persist_inputs(&self, app_id: &AppId, job: &BuildJob) -> DeployResult<()> {
        if !self.settings.persist_inputs {
            return Ok(());
        }

        let artifacts = self.collaborators.artifacts.as_ref();
        let token = &self.request.auth_token;
        let manifest_id = manifest_artifact_id(app_id);
        let compose_id = compose_artifact_id(app_id);
        tokio::try_join!(
            artifacts.upload(&manifest_id, job.manifest.clone().into_bytes(), token),
            artifacts.upload(&compose_id, job.compose.clone().into_bytes(), token),
        )?;
        info!(app_id = %app_id, "build inputs stored");
        Ok(())
    }
}
