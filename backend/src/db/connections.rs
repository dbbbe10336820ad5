use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Connection, ConnectionRow, ConnectionStatus, ModelError};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a user cannot be entangled with themselves")]
    SelfConnection,

    #[error("a connection between {requester} and {target} already exists")]
    Conflict { requester: Uuid, target: Uuid },

    #[error("connection {0} not found or not in a transitionable state")]
    NotFound(Uuid),

    #[error("invalid transition to {0}")]
    InvalidTransition(ConnectionStatus),

    #[error("malformed connection record: {0}")]
    Malformed(#[from] ModelError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Persistence for connection records.
///
/// Implementations own the at-most-one-record-per-pair rule: `insert_pending`
/// is an atomic check-then-insert and `transition` is a compare-and-swap from
/// `pending`, so racing clients cannot produce duplicates.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// All records where `user_id` is the requester or the target.
    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Connection>>;

    /// The record for the unordered pair `(a, b)`, if any.
    async fn find_between(&self, a: Uuid, b: Uuid) -> StoreResult<Option<Connection>>;

    /// Create a pending request. A declined record for the same pair is
    /// replaced; a pending or accepted one is a `Conflict`.
    async fn insert_pending(&self, requester_id: Uuid, target_id: Uuid) -> StoreResult<Connection>;

    /// Move a pending record to `to`. Only the target may do this.
    async fn transition(
        &self,
        id: Uuid,
        actor: Uuid,
        to: ConnectionStatus,
    ) -> StoreResult<Connection>;

    /// Remove a record. Either participant may do this.
    async fn delete(&self, id: Uuid, actor: Uuid) -> StoreResult<()>;
}

pub(crate) fn ensure_terminal(to: ConnectionStatus) -> StoreResult<()> {
    match to {
        ConnectionStatus::Accepted | ConnectionStatus::Declined => Ok(()),
        ConnectionStatus::Pending => Err(StoreError::InvalidTransition(to)),
    }
}

const CONNECTION_COLUMNS: &str = "id, requester_id, target_id, status, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgConnectionStore {
    pool: PgPool,
}

impl PgConnectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Every record in the table, oldest first. Used by the audit tool.
    pub async fn list_all(&self) -> StoreResult<Vec<Connection>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections ORDER BY created_at ASC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_connection).collect()
    }

    pub async fn delete_ids(&self, ids: &[Uuid]) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM connections WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

fn into_connection(row: ConnectionRow) -> StoreResult<Connection> {
    Ok(Connection::try_from(row)?)
}

fn map_unique_violation(err: sqlx::Error, requester: Uuid, target: Uuid) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            StoreError::Conflict { requester, target }
        }
        sqlx::Error::Database(db_err) if db_err.is_check_violation() => StoreError::SelfConnection,
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl ConnectionStore for PgConnectionStore {
    async fn list_for_user(&self, user_id: Uuid) -> StoreResult<Vec<Connection>> {
        let rows = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            SELECT {CONNECTION_COLUMNS}
            FROM connections
            WHERE requester_id = $1 OR target_id = $1
            ORDER BY created_at ASC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(into_connection).collect()
    }

    async fn find_between(&self, a: Uuid, b: Uuid) -> StoreResult<Option<Connection>> {
        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            SELECT {CONNECTION_COLUMNS}
            FROM connections
            WHERE LEAST(requester_id, target_id) = LEAST($1::uuid, $2::uuid)
            AND GREATEST(requester_id, target_id) = GREATEST($1::uuid, $2::uuid)
            "#
        ))
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;

        row.map(into_connection).transpose()
    }

    async fn insert_pending(&self, requester_id: Uuid, target_id: Uuid) -> StoreResult<Connection> {
        if requester_id == target_id {
            return Err(StoreError::SelfConnection);
        }

        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            SELECT {CONNECTION_COLUMNS}
            FROM connections
            WHERE LEAST(requester_id, target_id) = LEAST($1::uuid, $2::uuid)
            AND GREATEST(requester_id, target_id) = GREATEST($1::uuid, $2::uuid)
            FOR UPDATE
            "#
        ))
        .bind(requester_id)
        .bind(target_id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(row) = existing {
            let existing = into_connection(row)?;
            if existing.status != ConnectionStatus::Declined {
                return Err(StoreError::Conflict { requester: requester_id, target: target_id });
            }
            sqlx::query("DELETE FROM connections WHERE id = $1")
                .bind(existing.id)
                .execute(&mut *tx)
                .await?;
            tracing::debug!("Replacing declined connection {} with a new request", existing.id);
        }

        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            INSERT INTO connections (id, requester_id, target_id, status)
            VALUES ($1, $2, $3, 'pending')
            RETURNING {CONNECTION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(requester_id)
        .bind(target_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique_violation(e, requester_id, target_id))?;

        tx.commit()
            .await
            .map_err(|e| map_unique_violation(e, requester_id, target_id))?;

        into_connection(row)
    }

    async fn transition(
        &self,
        id: Uuid,
        actor: Uuid,
        to: ConnectionStatus,
    ) -> StoreResult<Connection> {
        ensure_terminal(to)?;

        let row = sqlx::query_as::<_, ConnectionRow>(&format!(
            r#"
            UPDATE connections
            SET status = $3, updated_at = NOW()
            WHERE id = $1 AND target_id = $2 AND status = 'pending'
            RETURNING {CONNECTION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(actor)
        .bind(to.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => into_connection(row),
            None => Err(StoreError::NotFound(id)),
        }
    }

    async fn delete(&self, id: Uuid, actor: Uuid) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM connections
            WHERE id = $1 AND (requester_id = $2 OR target_id = $2)
            "#,
        )
        .bind(id)
        .bind(actor)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug, Clone, Copy)]
    enum Violation {
        Unique,
        Check,
        Other,
    }

    #[derive(Debug)]
    struct FakeDbError(Violation);

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fake database error: {:?}", self.0)
        }
    }

    impl StdError for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &str {
            "fake database error"
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.0 {
                Violation::Unique => ErrorKind::UniqueViolation,
                Violation::Check => ErrorKind::CheckViolation,
                Violation::Other => ErrorKind::Other,
            }
        }
    }

    fn db_error(kind: Violation) -> sqlx::Error {
        sqlx::Error::Database(Box::new(FakeDbError(kind)))
    }

    #[test]
    fn test_unique_violation_is_conflict() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let err = map_unique_violation(db_error(Violation::Unique), a, b);
        assert!(matches!(
            err,
            StoreError::Conflict { requester, target } if requester == a && target == b
        ));
    }

    #[test]
    fn test_check_violation_is_self_connection() {
        let a = Uuid::new_v4();
        let err = map_unique_violation(db_error(Violation::Check), a, a);
        assert!(matches!(err, StoreError::SelfConnection));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(matches!(
            map_unique_violation(db_error(Violation::Other), a, b),
            StoreError::Database(_)
        ));
        assert!(matches!(
            map_unique_violation(sqlx::Error::RowNotFound, a, b),
            StoreError::Database(_)
        ));
    }

    #[test]
    fn test_pending_is_not_a_terminal_transition() {
        assert!(ensure_terminal(ConnectionStatus::Accepted).is_ok());
        assert!(ensure_terminal(ConnectionStatus::Declined).is_ok());
        assert!(matches!(
            ensure_terminal(ConnectionStatus::Pending),
            Err(StoreError::InvalidTransition(ConnectionStatus::Pending))
        ));
    }
}
