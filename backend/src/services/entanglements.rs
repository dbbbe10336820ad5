use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{ConnectionStore, StoreError};
use crate::models::{Connection, ConnectionStatus, ViewerStatus};
use super::in_flight::{InFlight, InFlightTicket};
use super::projector::ConnectionIndex;

/// What `decline` does to the stored record and to the local index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclinePolicy {
    /// Mark the record declined and keep it in the index.
    #[default]
    Retain,
    /// Mark the record declined (deleting it if that fails) and forget the pair.
    Forget,
}

impl FromStr for DeclinePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(DeclinePolicy::Retain),
            "forget" => Ok(DeclinePolicy::Forget),
            other => Err(anyhow::anyhow!("unknown decline policy: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    Unauthenticated,
    SelfTarget,
    InFlight,
}

#[derive(Debug)]
pub enum ActionOutcome {
    Requested(Connection),
    Accepted(Connection),
    Declined,
    Removed,
    /// Nothing to do from the current status.
    Unchanged(ViewerStatus),
    /// Precondition failed before touching the store.
    Rejected(Rejection),
    /// Store write failed; the pair is re-read or marked stale.
    Failed(StoreError),
}

impl ActionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ActionOutcome::Requested(_) => "requested",
            ActionOutcome::Accepted(_) => "accepted",
            ActionOutcome::Declined => "declined",
            ActionOutcome::Removed => "removed",
            ActionOutcome::Unchanged(_) => "unchanged",
            ActionOutcome::Rejected(_) => "rejected",
            ActionOutcome::Failed(_) => "failed",
        }
    }

    pub fn wrote(&self) -> bool {
        matches!(
            self,
            ActionOutcome::Requested(_)
                | ActionOutcome::Accepted(_)
                | ActionOutcome::Declined
                | ActionOutcome::Removed
        )
    }
}

/// One viewer's view of their entanglements: a local index over the store
/// plus the request, accept, decline and remove actions.
pub struct Entanglements {
    store: Arc<dyn ConnectionStore>,
    index: Option<ConnectionIndex>,
    stale: HashSet<Uuid>,
    needs_reload: bool,
    policy: DeclinePolicy,
    in_flight: InFlight,
}

impl Entanglements {
    pub fn new(store: Arc<dyn ConnectionStore>, viewer: Option<Uuid>) -> Self {
        Self {
            store,
            index: viewer.map(ConnectionIndex::new),
            stale: HashSet::new(),
            needs_reload: false,
            policy: DeclinePolicy::default(),
            in_flight: InFlight::new(),
        }
    }

    pub fn with_policy(mut self, policy: DeclinePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Share the in-flight marker with other sessions.
    pub fn with_in_flight(mut self, in_flight: InFlight) -> Self {
        self.in_flight = in_flight;
        self
    }

    pub fn viewer(&self) -> Option<Uuid> {
        self.index.as_ref().map(ConnectionIndex::viewer)
    }

    pub fn policy(&self) -> DeclinePolicy {
        self.policy
    }

    /// Switch viewers (login/logout). Drops everything known about the old one.
    pub fn set_viewer(&mut self, viewer: Option<Uuid>) {
        if self.viewer() != viewer {
            self.index = viewer.map(ConnectionIndex::new);
            self.stale.clear();
            self.needs_reload = false;
        }
    }

    pub fn clear(&mut self) {
        if let Some(viewer) = self.viewer() {
            self.index = Some(ConnectionIndex::new(viewer));
        }
        self.stale.clear();
        self.needs_reload = false;
    }

    /// Populate the index from the store. A read failure leaves the index
    /// empty so every status reads as `none`.
    pub async fn load(&mut self) {
        let Some(viewer) = self.viewer() else {
            self.clear();
            return;
        };

        match self.store.list_for_user(viewer).await {
            Ok(records) => {
                let index = ConnectionIndex::build(viewer, &records);
                debug!("Loaded {} connections for {}", index.len(), viewer);
                self.index = Some(index);
                self.stale.clear();
                self.needs_reload = false;
            }
            Err(e) => {
                warn!("Failed to load connections for {}: {}", viewer, e);
                self.index = Some(ConnectionIndex::new(viewer));
                self.stale.clear();
                self.needs_reload = true;
            }
        }
    }

    /// Reload if a previous load or write left the index untrustworthy.
    pub async fn refresh(&mut self) -> bool {
        if !self.has_stale() {
            return false;
        }
        self.load().await;
        true
    }

    pub fn is_stale(&self, other: Uuid) -> bool {
        self.needs_reload || self.stale.contains(&other)
    }

    /// True when anything in the index is known to disagree with the store.
    pub fn has_stale(&self) -> bool {
        self.needs_reload || !self.stale.is_empty()
    }

    pub fn status_for(&self, other: Uuid) -> ViewerStatus {
        self.index
            .as_ref()
            .map(|index| index.status_for(other))
            .unwrap_or_default()
    }

    pub fn statuses_for(&self, others: &[Uuid]) -> Vec<(Uuid, ViewerStatus)> {
        others.iter().map(|&other| (other, self.status_for(other))).collect()
    }

    pub fn connection_with(&self, other: Uuid) -> Option<&Connection> {
        self.index.as_ref().and_then(|index| index.get(other))
    }

    /// Every indexed connection with its projected status.
    pub fn connections(&self) -> Vec<(Uuid, Connection, ViewerStatus)> {
        let Some(index) = self.index.as_ref() else {
            return Vec::new();
        };
        let mut out: Vec<_> = index
            .iter()
            .map(|(&other, conn)| (other, conn.clone(), index.status_for(other)))
            .collect();
        out.sort_by_key(|(_, conn, _)| conn.created_at);
        out
    }

    /// Send a request, or accept one that is waiting on the viewer.
    pub async fn request_or_accept(&mut self, other: Uuid) -> ActionOutcome {
        let (viewer, _ticket) = match self.begin(other) {
            Ok(started) => started,
            Err(rejection) => return ActionOutcome::Rejected(rejection),
        };

        match self.status_for(other) {
            status @ (ViewerStatus::Accepted | ViewerStatus::PendingOutgoing) => {
                debug!("{} -> {}: already {}, nothing to do", viewer, other, status);
                ActionOutcome::Unchanged(status)
            }
            ViewerStatus::PendingIncoming => {
                let Some(existing) = self.connection_with(other).cloned() else {
                    return ActionOutcome::Unchanged(ViewerStatus::None);
                };
                match self.store.transition(existing.id, viewer, ConnectionStatus::Accepted).await {
                    Ok(conn) => {
                        info!("{} accepted entanglement from {}", viewer, other);
                        self.adopt(other, conn.clone());
                        ActionOutcome::Accepted(conn)
                    }
                    Err(e) => self.write_failed(viewer, other, "accept", e).await,
                }
            }
            ViewerStatus::None | ViewerStatus::Declined => {
                match self.store.insert_pending(viewer, other).await {
                    Ok(conn) => {
                        info!("{} requested entanglement with {}", viewer, other);
                        self.adopt(other, conn.clone());
                        ActionOutcome::Requested(conn)
                    }
                    Err(e) => self.write_failed(viewer, other, "request", e).await,
                }
            }
        }
    }

    /// Decline a request waiting on the viewer.
    pub async fn decline(&mut self, other: Uuid) -> ActionOutcome {
        let (viewer, _ticket) = match self.begin(other) {
            Ok(started) => started,
            Err(rejection) => return ActionOutcome::Rejected(rejection),
        };

        let status = self.status_for(other);
        let existing = match (status, self.connection_with(other).cloned()) {
            (ViewerStatus::PendingIncoming, Some(existing)) => existing,
            _ => return ActionOutcome::Unchanged(status),
        };

        match self.store.transition(existing.id, viewer, ConnectionStatus::Declined).await {
            Ok(conn) => {
                info!("{} declined entanglement from {}", viewer, other);
                match self.policy {
                    DeclinePolicy::Retain => self.adopt(other, conn),
                    DeclinePolicy::Forget => self.forget(other),
                }
                ActionOutcome::Declined
            }
            // NotFound/Conflict mean the record moved on (e.g. accepted elsewhere);
            // only a failed write to a still-pending record falls back to delete.
            Err(e)
                if self.policy == DeclinePolicy::Forget
                    && !matches!(e, StoreError::NotFound(_) | StoreError::Conflict { .. }) =>
            {
                warn!("Declining {} failed ({}), deleting the request instead", existing.id, e);
                match self.store.delete(existing.id, viewer).await {
                    Ok(()) => {
                        self.forget(other);
                        ActionOutcome::Declined
                    }
                    Err(e) => self.write_failed(viewer, other, "decline", e).await,
                }
            }
            Err(e) => self.write_failed(viewer, other, "decline", e).await,
        }
    }

    /// Withdraw an outgoing request or dissolve an entanglement.
    pub async fn remove(&mut self, other: Uuid) -> ActionOutcome {
        let (viewer, _ticket) = match self.begin(other) {
            Ok(started) => started,
            Err(rejection) => return ActionOutcome::Rejected(rejection),
        };

        let Some(existing) = self.connection_with(other).cloned() else {
            return ActionOutcome::Unchanged(ViewerStatus::None);
        };

        match self.store.delete(existing.id, viewer).await {
            Ok(()) => {
                info!("{} removed connection {} with {}", viewer, existing.id, other);
                self.forget(other);
                ActionOutcome::Removed
            }
            Err(e) => self.write_failed(viewer, other, "remove", e).await,
        }
    }

    fn begin(&self, other: Uuid) -> Result<(Uuid, InFlightTicket), Rejection> {
        let viewer = self.viewer().ok_or(Rejection::Unauthenticated)?;
        if viewer == other {
            return Err(Rejection::SelfTarget);
        }
        let ticket = self
            .in_flight
            .try_acquire(viewer, other)
            .ok_or(Rejection::InFlight)?;
        Ok((viewer, ticket))
    }

    fn adopt(&mut self, other: Uuid, conn: Connection) {
        if let Some(index) = self.index.as_mut() {
            index.insert(conn);
        }
        self.stale.remove(&other);
    }

    fn forget(&mut self, other: Uuid) {
        if let Some(index) = self.index.as_mut() {
            index.forget(other);
        }
        self.stale.remove(&other);
    }

    async fn write_failed(
        &mut self,
        viewer: Uuid,
        other: Uuid,
        action: &str,
        err: StoreError,
    ) -> ActionOutcome {
        error!("Failed to {} entanglement {} -> {}: {}", action, viewer, other, err);

        match err {
            // The store disagrees with the index; take its word for the pair.
            StoreError::Conflict { .. } | StoreError::NotFound(_) => {
                self.resync_pair(viewer, other).await
            }
            _ => {
                self.stale.insert(other);
            }
        }
        ActionOutcome::Failed(err)
    }

    async fn resync_pair(&mut self, viewer: Uuid, other: Uuid) {
        match self.store.find_between(viewer, other).await {
            Ok(Some(conn)) => self.adopt(other, conn),
            Ok(None) => self.forget(other),
            Err(e) => {
                warn!("Failed to re-read connection {} <-> {}: {}", viewer, other, e);
                self.stale.insert(other);
            }
        }
    }
}
