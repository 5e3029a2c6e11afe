//! Explicit pipeline states.
//!
//! ```text
//! Idle ──▶ Creating ──▶ AwaitingAppId ──▶ Building ──▶ AwaitingBuild ──▶ Updating ──▶ Deploying ──▶ Done
//!             │              │               │              │               │            │
//!             └──────────────┴───────────────┴──────┬───────┴───────────────┴────────────┘
//!                                                   ▼
//!                                          Failed(stage, cause)
//! ```
//!
//! The stage enum is published over a watch channel while a pipeline runs,
//! and failures carry the stage they happened in.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// A pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStage {
    /// Not started.
    Idle,
    /// Submitting the create transaction.
    Creating,
    /// Waiting for the indexer to publish the app id.
    AwaitingAppId,
    /// Reading the app record and submitting the build.
    Building,
    /// Waiting for the build backend.
    AwaitingBuild,
    /// Attaching the enclave policy and secrets.
    Updating,
    /// Leasing compute and deploying.
    Deploying,
    /// Finished successfully.
    Done,
}

impl DeploymentStage {
    /// All stages in pipeline order.
    pub const ALL: [Self; 8] = [
        Self::Idle,
        Self::Creating,
        Self::AwaitingAppId,
        Self::Building,
        Self::AwaitingBuild,
        Self::Updating,
        Self::Deploying,
        Self::Done,
    ];

    /// Get the stage name as a static string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Creating => "creating",
            Self::AwaitingAppId => "awaiting_app_id",
            Self::Building => "building",
            Self::AwaitingBuild => "awaiting_build",
            Self::Updating => "updating",
            Self::Deploying => "deploying",
            Self::Done => "done",
        }
    }

    /// Position of this stage in [`ALL`](Self::ALL).
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Check if this is the successful terminal stage.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

impl fmt::Display for DeploymentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observable state of a running pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// The pipeline is in (or has completed) the given stage.
    Running {
        /// Current stage.
        stage: DeploymentStage,
    },
    /// The pipeline failed.
    Failed {
        /// Stage that failed.
        stage: DeploymentStage,
        /// Rendered cause.
        reason: String,
    },
}

impl DeploymentStatus {
    /// The stage the pipeline is in, or failed in.
    #[must_use]
    pub const fn stage(&self) -> DeploymentStage {
        match self {
            Self::Running { stage } | Self::Failed { stage, .. } => *stage,
        }
    }

    /// Check if the pipeline has finished, successfully or not.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        match self {
            Self::Running { stage } => stage.is_done(),
            Self::Failed { .. } => true,
        }
    }
}

impl Default for DeploymentStatus {
    fn default() -> Self {
        Self::Running {
            stage: DeploymentStage::Idle,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running { stage } => write!(f, "{stage}"),
            Self::Failed { stage, reason } => write!(f, "failed while {stage}: {reason}"),
        }
    }
}

/// Externally observable points reached by a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    /// Create transaction confirmed.
    CreateConfirmed,
    /// App id resolved from the indexer.
    AppIdResolved,
    /// Build accepted by the backend.
    BuildSubmitted,
    /// Build result available.
    BuildResolved,
    /// Update transaction confirmed.
    UpdateConfirmed,
    /// Deploy transaction confirmed.
    DeployConfirmed,
}

/// Ordered record of milestones and when they were reached.
#[derive(Debug, Clone, Default)]
pub struct Timeline {
    entries: Vec<(Milestone, Instant)>,
}

impl Timeline {
    /// Create an empty timeline.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Record a milestone at the current instant.
    pub fn record(&mut self, milestone: Milestone) {
        self.entries.push((milestone, Instant::now()));
    }

    /// When the milestone was reached, if it was.
    #[must_use]
    pub fn at(&self, milestone: Milestone) -> Option<Instant> {
        self.entries
            .iter()
            .find(|(m, _)| *m == milestone)
            .map(|(_, at)| *at)
    }

    /// Milestones in the order they were reached.
    #[must_use]
    pub fn milestones(&self) -> Vec<Milestone> {
        self.entries.iter().map(|(m, _)| *m).collect()
    }

    /// All entries in order.
    #[must_use]
    pub fn entries(&self) -> &[(Milestone, Instant)] {
        &self.entries
    }
}
