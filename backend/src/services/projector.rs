use std::collections::HashMap;
use uuid::Uuid;

use crate::models::{Connection, ConnectionStatus, ViewerStatus};

/// Classify one record from `viewer`'s side.
pub fn classify(connection: &Connection, viewer: Uuid) -> ViewerStatus {
    match connection.status {
        ConnectionStatus::Accepted => ViewerStatus::Accepted,
        ConnectionStatus::Declined => ViewerStatus::Declined,
        ConnectionStatus::Pending if connection.requester_id == viewer => {
            ViewerStatus::PendingOutgoing
        }
        ConnectionStatus::Pending if connection.target_id == viewer => {
            ViewerStatus::PendingIncoming
        }
        ConnectionStatus::Pending => ViewerStatus::None,
    }
}

/// Viewer-relative status of `other` given every record touching the viewer.
pub fn project(records: &[Connection], viewer: Option<Uuid>, other: Uuid) -> ViewerStatus {
    match viewer {
        Some(viewer) => ConnectionIndex::build(viewer, records).status_for(other),
        None => ViewerStatus::None,
    }
}

/// Other participant -> connection, from one viewer's perspective.
///
/// Records for the same pair overwrite each other in scan order.
#[derive(Debug, Clone)]
pub struct ConnectionIndex {
    viewer: Uuid,
    by_other: HashMap<Uuid, Connection>,
}

impl ConnectionIndex {
    pub fn new(viewer: Uuid) -> Self {
        Self {
            viewer,
            by_other: HashMap::new(),
        }
    }

    pub fn build<'a>(viewer: Uuid, records: impl IntoIterator<Item = &'a Connection>) -> Self {
        let mut index = Self::new(viewer);
        for record in records {
            index.insert(record.clone());
        }
        index
    }

    pub fn viewer(&self) -> Uuid {
        self.viewer
    }

    /// Returns false for records the viewer is not part of, and for self-pairs.
    pub fn insert(&mut self, connection: Connection) -> bool {
        match connection.other_participant(self.viewer) {
            Some(other) if other != self.viewer => {
                self.by_other.insert(other, connection);
                true
            }
            _ => false,
        }
    }

    pub fn forget(&mut self, other: Uuid) -> Option<Connection> {
        self.by_other.remove(&other)
    }

    pub fn get(&self, other: Uuid) -> Option<&Connection> {
        self.by_other.get(&other)
    }

    pub fn status_for(&self, other: Uuid) -> ViewerStatus {
        if other == self.viewer {
            return ViewerStatus::None;
        }
        self.by_other
            .get(&other)
            .map(|c| classify(c, self.viewer))
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Uuid, &Connection)> {
        self.by_other.iter()
    }

    pub fn len(&self) -> usize {
        self.by_other.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_other.is_empty()
    }
}
