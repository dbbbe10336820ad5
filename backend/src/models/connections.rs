use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("unknown connection status: {0}")]
    UnknownStatus(String),
}

/// Stored state of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Accepted,
    Declined,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Pending => "pending",
            ConnectionStatus::Accepted => "accepted",
            ConnectionStatus::Declined => "declined",
        }
    }

    /// Ordering used when choosing a survivor among duplicate records.
    pub fn rank(&self) -> u8 {
        match self {
            ConnectionStatus::Accepted => 2,
            ConnectionStatus::Pending => 1,
            ConnectionStatus::Declined => 0,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConnectionStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ConnectionStatus::Pending),
            "accepted" => Ok(ConnectionStatus::Accepted),
            "declined" => Ok(ConnectionStatus::Declined),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

/// A directed entanglement request between two users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub target_id: Uuid,
    pub status: ConnectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    pub fn new_pending(requester_id: Uuid, target_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            requester_id,
            target_id,
            status: ConnectionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.requester_id == user_id || self.target_id == user_id
    }

    /// The participant on the other side from `viewer`, if `viewer` is one of them.
    pub fn other_participant(&self, viewer: Uuid) -> Option<Uuid> {
        if self.requester_id == viewer {
            Some(self.target_id)
        } else if self.target_id == viewer {
            Some(self.requester_id)
        } else {
            None
        }
    }

    /// Unordered pair key, smaller id first.
    pub fn pair(&self) -> (Uuid, Uuid) {
        ordered_pair(self.requester_id, self.target_id)
    }
}

pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a < b { (a, b) } else { (b, a) }
}

#[derive(Debug, Clone, FromRow)]
pub struct ConnectionRow {
    pub id: Uuid,
    pub requester_id: Uuid,
    pub target_id: Uuid,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ConnectionRow> for Connection {
    type Error = ModelError;

    fn try_from(row: ConnectionRow) -> Result<Self, Self::Error> {
        Ok(Connection {
            id: row.id,
            requester_id: row.requester_id,
            target_id: row.target_id,
            status: row.status.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Status of a connection as seen by one of its participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ViewerStatus {
    #[default]
    None,
    PendingOutgoing,
    PendingIncoming,
    Accepted,
    Declined,
}

impl ViewerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewerStatus::None => "none",
            ViewerStatus::PendingOutgoing => "pending_outgoing",
            ViewerStatus::PendingIncoming => "pending_incoming",
            ViewerStatus::Accepted => "accepted",
            ViewerStatus::Declined => "declined",
        }
    }
}

impl fmt::Display for ViewerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
