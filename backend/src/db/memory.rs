use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::connections::{ensure_terminal, ConnectionStore, StoreError, StoreResult};
use crate::models::{ordered_pair, Connection, ConnectionStatus};

/// In-process store with the same pair-uniqueness rules as the Postgres one.
#[derive(Debug, Default)]
pub struct MemoryConnectionStore {
    records: Mutex<Vec<Connection>>,
}

impl MemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed records as-is, bypassing the pair check. Lets callers reproduce
    /// data written before the unique key existed.
    pub fn with_records(records: Vec<Connection>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    pub fn snapshot(&self) -> Vec<Connection> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl ConnectionStore for MemoryConnectionStore {
    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Connection>> {
        let records = self.records.lock();
        Ok(records.iter().filter(|c| c.involves(user_id)).cloned().collect())
    }

    async fn find_between(&self, a: Uuid, b: Uuid) -> StoreResult<Option<Connection>> {
        let pair = ordered_pair(a, b);
        let records = self.records.lock();
        Ok(records.iter().find(|c| c.pair() == pair).cloned())
    }

    async fn insert_pending(&self, requester_id: Uuid, target_id: Uuid) -> StoreResult<Connection> {
        if requester_id == target_id {
            return Err(StoreError::SelfConnection);
        }

        let pair = ordered_pair(requester_id, target_id);
        let mut records = self.records.lock();

        if let Some(pos) = records.iter().position(|c| c.pair() == pair) {
            if records[pos].status != ConnectionStatus::Declined {
                return Err(StoreError::Conflict { requester: requester_id, target: target_id });
            }
            records.remove(pos);
        }

        let connection = Connection::new_pending(requester_id, target_id);
        records.push(connection.clone());
        Ok(connection)
    }

    async fn transition(
        &self,
        id: Uuid,
        actor: Uuid,
        to: ConnectionStatus,
    ) -> StoreResult<Connection> {
        ensure_terminal(to)?;

        let mut records = self.records.lock();
        let record = records
            .iter_mut()
            .find(|c| c.id == id && c.target_id == actor && c.status == ConnectionStatus::Pending)
            .ok_or(StoreError::NotFound(id))?;

        record.status = to;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn delete(&self, id: Uuid, actor: Uuid) -> StoreResult<()> {
        let mut records = self.records.lock();
        let pos = records
            .iter()
            .position(|c| c.id == id && c.involves(actor))
            .ok_or(StoreError::NotFound(id))?;
        records.remove(pos);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_rejects_second_record_for_pair() {
        let store = MemoryConnectionStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        store.insert_pending(a, b).await.unwrap();
        let err = store.insert_pending(b, a).await.unwrap_err();

        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_replaces_declined_record() {
        let store = MemoryConnectionStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let first = store.insert_pending(a, b).await.unwrap();
        store.transition(first.id, b, ConnectionStatus::Declined).await.unwrap();

        let second = store.insert_pending(b, a).await.unwrap();
        assert_ne!(first.id, second.id);
        assert_eq!(second.requester_id, b);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_self_connection_rejected() {
        let store = MemoryConnectionStore::new();
        let a = Uuid::new_v4();

        assert!(matches!(
            store.insert_pending(a, a).await,
            Err(StoreError::SelfConnection)
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_only_target_can_transition() {
        let store = MemoryConnectionStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conn = store.insert_pending(a, b).await.unwrap();

        assert!(matches!(
            store.transition(conn.id, a, ConnectionStatus::Accepted).await,
            Err(StoreError::NotFound(_))
        ));
        let accepted = store.transition(conn.id, b, ConnectionStatus::Accepted).await.unwrap();
        assert_eq!(accepted.status, ConnectionStatus::Accepted);

        // no longer pending
        assert!(store.transition(conn.id, b, ConnectionStatus::Declined).await.is_err());
    }

    #[tokio::test]
    async fn test_transition_to_pending_is_invalid() {
        let store = MemoryConnectionStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conn = store.insert_pending(a, b).await.unwrap();

        assert!(matches!(
            store.transition(conn.id, b, ConnectionStatus::Pending).await,
            Err(StoreError::InvalidTransition(ConnectionStatus::Pending))
        ));
    }

    #[tokio::test]
    async fn test_delete_by_either_participant_only() {
        let store = MemoryConnectionStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conn = store.insert_pending(a, b).await.unwrap();

        assert!(store.delete(conn.id, Uuid::new_v4()).await.is_err());
        store.delete(conn.id, b).await.unwrap();
        assert!(store.find_between(a, b).await.unwrap().is_none());
    }
}
