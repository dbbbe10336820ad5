use quantum5ocial::db::{ConnectionStore, MemoryConnectionStore};
use quantum5ocial::models::{Connection, ConnectionStatus, ViewerStatus};
use quantum5ocial::services::{project, ActionOutcome, DeclinePolicy, Entanglements, InFlight};
use std::sync::Arc;
use uuid::Uuid;

async fn session(store: &Arc<MemoryConnectionStore>, viewer: Uuid) -> Entanglements {
    let mut s = Entanglements::new(store.clone(), Some(viewer));
    s.load().await;
    s
}

#[tokio::test]
async fn request_accept_repeat_scenario() {
    let store = Arc::new(MemoryConnectionStore::new());
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let mut sa = session(&store, a).await;
    assert_eq!(sa.status_for(b), ViewerStatus::None);

    // A requests
    assert!(matches!(sa.request_or_accept(b).await, ActionOutcome::Requested(_)));
    assert_eq!(sa.status_for(b), ViewerStatus::PendingOutgoing);

    let mut sb = session(&store, b).await;
    assert_eq!(sb.status_for(a), ViewerStatus::PendingIncoming);

    // B accepts
    assert!(matches!(sb.request_or_accept(a).await, ActionOutcome::Accepted(_)));
    sa.load().await;
    assert_eq!(sa.status_for(b), ViewerStatus::Accepted);
    assert_eq!(sb.status_for(a), ViewerStatus::Accepted);

    // A repeats: no write, no duplicate
    let before = store.snapshot();
    let outcome = sa.request_or_accept(b).await;
    assert!(matches!(outcome, ActionOutcome::Unchanged(ViewerStatus::Accepted)));
    assert_eq!(store.snapshot(), before);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn crossing_requests_leave_one_record() {
    let store = Arc::new(MemoryConnectionStore::new());
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    // Both sessions loaded before either writes
    let mut sa = session(&store, a).await;
    let mut sb = session(&store, b).await;

    assert!(matches!(sa.request_or_accept(b).await, ActionOutcome::Requested(_)));
    assert!(matches!(sb.request_or_accept(a).await, ActionOutcome::Failed(_)));
    assert_eq!(store.len(), 1);

    // B now sees the incoming request and can accept it
    assert_eq!(sb.status_for(a), ViewerStatus::PendingIncoming);
    assert!(matches!(sb.request_or_accept(a).await, ActionOutcome::Accepted(_)));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn decline_policies_diverge_only_locally() {
    for policy in [DeclinePolicy::Retain, DeclinePolicy::Forget] {
        let store = Arc::new(MemoryConnectionStore::new());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.insert_pending(a, b).await.unwrap();

        let mut sb = session(&store, b).await.with_policy(policy);
        assert!(matches!(sb.decline(a).await, ActionOutcome::Declined));

        let expected = match policy {
            DeclinePolicy::Retain => ViewerStatus::Declined,
            DeclinePolicy::Forget => ViewerStatus::None,
        };
        assert_eq!(sb.status_for(a), expected);

        let stored = store.find_between(a, b).await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Declined);
    }
}

#[tokio::test]
async fn shared_in_flight_guard_spans_sessions() {
    let store = Arc::new(MemoryConnectionStore::new());
    let guard = InFlight::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();

    let _held = guard.try_acquire(a, b).unwrap();
    let mut sa = session(&store, a).await.with_in_flight(guard.clone());
    assert!(matches!(sa.request_or_accept(b).await, ActionOutcome::Rejected(_)));
    assert!(store.is_empty());
}

#[test]
fn projection_of_store_snapshot() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let c = Uuid::new_v4();
    let mut accepted = Connection::new_pending(c, a);
    accepted.status = ConnectionStatus::Accepted;
    let records = vec![Connection::new_pending(a, b), accepted];

    assert_eq!(project(&records, Some(a), b), ViewerStatus::PendingOutgoing);
    assert_eq!(project(&records, Some(b), a), ViewerStatus::PendingIncoming);
    assert_eq!(project(&records, Some(a), c), ViewerStatus::Accepted);
    assert_eq!(project(&records, Some(c), a), ViewerStatus::Accepted);
    assert_eq!(project(&records, None, b), ViewerStatus::None);
    assert_eq!(project(&records, Some(b), c), ViewerStatus::None);
}

#[tokio::test]
async fn legacy_duplicate_records_resolve_by_scan_order() {
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let mut accepted = Connection::new_pending(a, b);
    accepted.status = ConnectionStatus::Accepted;
    let later_pending = Connection::new_pending(b, a);

    let store = Arc::new(MemoryConnectionStore::with_records(vec![accepted, later_pending]));
    let sa = session(&store, a).await;

    assert_eq!(sa.status_for(b), ViewerStatus::PendingIncoming);
    assert_eq!(sa.connections().len(), 1);
}

#[tokio::test]
async fn forget_policy_decline_after_accept_elsewhere() {
    let store = Arc::new(MemoryConnectionStore::new());
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    store.insert_pending(a, b).await.unwrap();

    let mut accepting = session(&store, b).await;
    let mut outdated = session(&store, b).await.with_policy(DeclinePolicy::Forget);

    assert!(matches!(accepting.request_or_accept(a).await, ActionOutcome::Accepted(_)));
    assert!(matches!(outdated.decline(a).await, ActionOutcome::Failed(_)));

    let stored = store.find_between(a, b).await.unwrap().unwrap();
    assert_eq!(stored.status, ConnectionStatus::Accepted);
    assert_eq!(outdated.status_for(a), ViewerStatus::Accepted);
}
