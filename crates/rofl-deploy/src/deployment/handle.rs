//! Handle to a spawned deployment.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::error::{DeployError, DeploymentFailure};
use crate::stage::DeploymentStatus;
use crate::types::DeploymentId;

use super::DeploymentOutcome;

/// Handle to a deployment running on its own task.
///
/// Dropping the handle cancels the deployment.
#[derive(Debug)]
pub struct DeploymentHandle {
    id: DeploymentId,
    status: watch::Receiver<DeploymentStatus>,
    cancel: CancellationToken,
    task: JoinHandle<Result<DeploymentOutcome, DeploymentFailure>>,
    guard: DropGuard,
}

impl DeploymentHandle {
    pub(super) fn new(
        id: DeploymentId,
        status: watch::Receiver<DeploymentStatus>,
        cancel: CancellationToken,
        task: JoinHandle<Result<DeploymentOutcome, DeploymentFailure>>,
    ) -> Self {
        let guard = cancel.clone().drop_guard();
        Self {
            id,
            status,
            cancel,
            task,
            guard,
        }
    }

    /// Run identifier.
    #[must_use]
    pub const fn id(&self) -> &DeploymentId {
        &self.id
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> DeploymentStatus {
        self.status.borrow().clone()
    }

    /// Subscribe to status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DeploymentStatus> {
        self.status.clone()
    }

    /// Request cancellation; the run stops at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token that cancels this run, for use after the handle is consumed by
    /// [`wait`](Self::wait).
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the run to finish.
    pub async fn wait(self) -> Result<DeploymentOutcome, DeploymentFailure> {
        let Self {
            status,
            task,
            guard,
            ..
        } = self;

        let joined = task.await;
        guard.disarm();

        joined.unwrap_or_else(|e| {
            let stage = status.borrow().stage();
            Err(DeploymentFailure::new(
                stage,
                DeployError::internal(format!("deployment task failed: {e}")),
                None,
            ))
        })
    }
}
