//! Sign, broadcast, and wait for the ledger.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::error::{DeployError, DeployResult};
use crate::poll::{poll_until, PollPolicy};
use crate::types::{AuthToken, Network, TransactionReceipt};

use super::{ReceiptStatus, ReceiptWatcher, RuntimeCall, TransactionSigner};

/// Submits calls on one network and waits for their confirmation.
///
/// Nothing is retried: a declined signature, a reverted transaction and a
/// confirmation timeout all end the submission.
#[derive(Clone)]
pub struct TransactionSubmitter {
    signer: Arc<dyn TransactionSigner>,
    receipts: Arc<dyn ReceiptWatcher>,
    network: Network,
    token: AuthToken,
    policy: PollPolicy,
}

impl TransactionSubmitter {
    /// Create a new submitter.
    #[must_use]
    pub fn new(
        signer: Arc<dyn TransactionSigner>,
        receipts: Arc<dyn ReceiptWatcher>,
        network: Network,
        token: AuthToken,
        policy: PollPolicy,
    ) -> Self {
        Self {
            signer,
            receipts,
            network,
            token,
            policy,
        }
    }

    /// Request a signature for `call`, then wait until the ledger confirms or
    /// reverts it.
    #[instrument(skip_all, fields(call = %call.kind(), network = %self.network))]
    pub async fn submit_and_confirm(
        &self,
        call: &RuntimeCall,
        cancel: &CancellationToken,
    ) -> DeployResult<TransactionReceipt> {
        if cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        let hash = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DeployError::Cancelled),
            hash = self.signer.sign_and_submit(self.network, call, &self.token) => hash?,
        };
        info!(hash = %hash, method = call.method(), "transaction submitted");

        let status = poll_until(
            &self.policy,
            cancel,
            || self.receipts.receipt_status(self.network, &hash, &self.token),
            ReceiptStatus::is_final,
        )
        .await
        .map_err(|e| {
            e.into_deploy_error(|elapsed, _| DeployError::ConfirmationTimeout {
                hash: hash.clone(),
                elapsed,
            })
        })?;

        match status {
            ReceiptStatus::Confirmed => {
                info!(hash = %hash, "transaction confirmed");
                Ok(TransactionReceipt {
                    call: call.kind(),
                    hash,
                    confirmed: true,
                })
            }
            ReceiptStatus::Reverted { reason } => {
                warn!(hash = %hash, reason = %reason, "transaction reverted");
                Err(DeployError::TransactionReverted { hash, reason })
            }
            ReceiptStatus::Pending => Err(DeployError::internal(
                "receipt poll returned a pending status",
            )),
        }
    }
}

impl std::fmt::Debug for TransactionSubmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionSubmitter")
            .field("network", &self.network)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
