//! Bounded, cancellable polling.
//!
//! [`poll_until`] is the single retry loop used by every wait-for-X step of
//! the pipeline. It fetches immediately, then once per interval, until the
//! caller's predicate accepts a value or the attempt budget runs out.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::DeployError;

/// Interval and overall budget for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between attempts.
    pub interval: Duration,
    /// Upper bound on time spent polling.
    pub timeout: Duration,
}

impl PollPolicy {
    /// Create a new policy.
    #[must_use]
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Create a policy from millisecond values.
    #[must_use]
    pub const fn from_millis(interval_ms: u64, timeout_ms: u64) -> Self {
        Self::new(
            Duration::from_millis(interval_ms),
            Duration::from_millis(timeout_ms),
        )
    }

    /// Number of attempts allowed: `ceil(timeout / interval)`, at least one.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        let interval = self.interval.as_millis().max(1);
        let attempts = self.timeout.as_millis().div_ceil(interval).max(1);
        u32::try_from(attempts).unwrap_or(u32::MAX)
    }
}

/// Why a polling loop stopped without an accepted value.
#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    /// The attempt budget was exhausted.
    #[error("polling timed out after {attempts} attempts ({elapsed:?})")]
    Timeout {
        /// Time spent polling.
        elapsed: Duration,
        /// Attempts made.
        attempts: u32,
    },

    /// The cancellation token fired.
    #[error("polling cancelled after {attempts} attempts")]
    Cancelled {
        /// Attempts made before cancellation.
        attempts: u32,
    },

    /// A fetch failed.
    #[error(transparent)]
    Fetch(E),
}

impl PollError<DeployError> {
    /// Collapse into a [`DeployError`], naming the stage timeout.
    pub(crate) fn into_deploy_error(
        self,
        timeout: impl FnOnce(Duration, u32) -> DeployError,
    ) -> DeployError {
        match self {
            Self::Timeout { elapsed, attempts } => timeout(elapsed, attempts),
            Self::Cancelled { .. } => DeployError::Cancelled,
            Self::Fetch(e) => e,
        }
    }
}

/// Poll `fetch_once` until `is_done` accepts its output.
///
/// Errors from `fetch_once` are returned immediately; callers that tolerate
/// "not found yet" must map that case to an `Ok` value themselves. A value
/// that carries a business-level failure should be accepted by `is_done` and
/// inspected by the caller afterwards.
pub async fn poll_until<T, E, F, Fut, D>(
    policy: &PollPolicy,
    cancel: &CancellationToken,
    mut fetch_once: F,
    mut is_done: D,
) -> Result<T, PollError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    D: FnMut(&T) -> bool,
{
    let started = Instant::now();
    let max_attempts = policy.max_attempts();
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled { attempts });
        }

        attempts += 1;
        let value = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PollError::Cancelled { attempts }),
            result = fetch_once() => result.map_err(PollError::Fetch)?,
        };

        if is_done(&value) {
            trace!(attempts, "poll satisfied");
            return Ok(value);
        }

        if attempts >= max_attempts {
            return Err(PollError::Timeout {
                elapsed: started.elapsed(),
                attempts,
            });
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PollError::Cancelled { attempts }),
            () = tokio::time::sleep(policy.interval) => {}
        }
    }
}
