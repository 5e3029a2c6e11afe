//! Event indexer access and the app-id waiter.
//!
//! The indexer republishes ledger events with some lag. After the create
//! transaction is confirmed, [`wait_for_app_id`] polls it for the
//! `rofl.app_created` event correlated to the transaction hash and extracts the
//! derived app id. Empty pages are expected while the indexer catches up.

mod client;

pub use client::NexusClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::{DeployError, DeployResult};
use crate::poll::{poll_until, PollPolicy};
use crate::types::{AppId, AuthToken, Network, TxHash};

/// Event emitted when an app is registered.
pub const APP_CREATED_EVENT: &str = "rofl.app_created";

/// A page of indexed events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPage {
    /// Events, oldest first.
    #[serde(default)]
    pub events: Vec<IndexedEvent>,
}

impl EventPage {
    /// The id carried by the first event, if present and non-empty.
    #[must_use]
    pub fn first_app_id(&self) -> Option<AppId> {
        self.events
            .first()
            .and_then(|event| event.body.id.as_deref())
            .filter(|id| !id.is_empty())
            .map(AppId::new)
    }
}

/// One indexed event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedEvent {
    /// Event type, if reported.
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Event body.
    #[serde(default)]
    pub body: EventBody,
}

/// Body of an app event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBody {
    /// App id.
    #[serde(default)]
    pub id: Option<String>,
}

/// Read access to the chain indexer.
#[async_trait]
pub trait EventIndexer: Send + Sync {
    /// Fetch the first page of events of `event_type` emitted by `tx_hash`.
    ///
    /// `tx_hash` is already normalised (no `0x` prefix). An unknown hash is an
    /// empty page, not an error.
    async fn events_by_tx(
        &self,
        network: Network,
        event_type: &str,
        tx_hash: &str,
        token: &AuthToken,
    ) -> DeployResult<EventPage>;
}

/// Wait for the indexer to publish the app id created by `tx_hash`.
///
/// Returns as soon as the first event carries a non-empty id. Fails with
/// [`DeployError::AppIdTimeout`] once the policy's attempt budget is spent.
#[instrument(skip_all, fields(tx_hash = %tx_hash, network = %network))]
pub async fn wait_for_app_id(
    indexer: &dyn EventIndexer,
    tx_hash: &TxHash,
    network: Network,
    token: &AuthToken,
    policy: &PollPolicy,
    cancel: &CancellationToken,
) -> DeployResult<AppId> {
    let hash = tx_hash.normalized();

    let page = poll_until(
        policy,
        cancel,
        || indexer.events_by_tx(network, APP_CREATED_EVENT, hash, token),
        |page| {
            let found = page.first_app_id().is_some();
            if !found {
                debug!("app id not indexed yet");
            }
            found
        },
    )
    .await
    .map_err(|e| {
        e.into_deploy_error(|elapsed, attempts| DeployError::AppIdTimeout { elapsed, attempts })
    })?;

    let app_id = page
        .first_app_id()
        .ok_or(DeployError::MissingField("events[0].body.id"))?;
    info!(app_id = %app_id, "app id indexed");
    Ok(app_id)
}
