//! ROFL app creation and deployment.
//!
//! This crate drives a confidential app from nothing to a running deployment
//! on the compute marketplace. It coordinates systems that share no
//! transactions: the ledger, an indexer that lags behind it, a build service
//! with long-running jobs, and the marketplace.
//!
//! # Pipeline
//!
//! ```text
//! create tx ──▶ indexer waiter ──▶ build submit ──▶ build waiter ──▶ update tx ──▶ deploy tx ──▶ AppId
//!  (permissive)   (60 s / 1 s)                      (300 s / 3 s)   (enclaves +     (lease offer)
//!                                                                    sealed secrets)
//! ```
//!
//! Every arrow is a suspension point. Polling goes through [`poll_until`],
//! which is bounded by an attempt budget and bound to a
//! [`CancellationToken`](tokio_util::sync::CancellationToken). Failures end the
//! run with a [`DeploymentFailure`] naming the stage; nothing confirmed
//! on-chain is rolled back, so a failure after the create transaction leaves
//! a registered but undeployed app.
//!
//! # Example
//!
//! ```ignore
//! use rofl_deploy::{Collaborators, DeployConfig, DeploymentOrchestrator};
//!
//! let config = DeployConfig::load()?;
//! let orchestrator = DeploymentOrchestrator::new(
//!     Collaborators::http(&config)?,
//!     config.pipeline_settings(),
//! );
//!
//! let handle = orchestrator.spawn(request);
//! let outcome = handle.wait().await?;
//! println!("deployed {}", outcome.app_id);
//! ```

#![forbid(unsafe_code)]

pub mod artifacts;
pub mod build;
pub mod chain;
pub mod config;
pub mod deployment;
pub mod error;
pub mod indexer;
pub mod manifest;
pub mod poll;
pub mod stage;
pub mod types;

mod http;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types at the crate root
pub use config::DeployConfig;
pub use deployment::{
    Collaborators, DeploymentHandle, DeploymentOrchestrator, DeploymentOutcome, DeploymentRequest,
    PipelineSettings,
};
pub use error::{DeployError, DeployResult, DeploymentFailure};
pub use poll::{poll_until, PollError, PollPolicy};
pub use stage::{DeploymentStage, DeploymentStatus, Milestone, Timeline};
pub use types::{AppId, AuthToken, BuildJob, BuildResult, CallKind, Network, TransactionReceipt, TxHash};
