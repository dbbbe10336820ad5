use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

/// Advisory per-(viewer, other) marker that rejects a second action on the
/// same pair while one is outstanding. Not a lock on the store.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    active: Arc<Mutex<HashSet<(Uuid, Uuid)>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` if an action for this pair is already running.
    pub fn try_acquire(&self, viewer: Uuid, other: Uuid) -> Option<InFlightTicket> {
        let key = (viewer, other);
        if !self.active.lock().insert(key) {
            return None;
        }
        Some(InFlightTicket {
            active: Arc::clone(&self.active),
            key,
        })
    }

    pub fn is_active(&self, viewer: Uuid, other: Uuid) -> bool {
        self.active.lock().contains(&(viewer, other))
    }
}

/// Releases its pair when dropped.
#[derive(Debug)]
pub struct InFlightTicket {
    active: Arc<Mutex<HashSet<(Uuid, Uuid)>>>,
    key: (Uuid, Uuid),
}

impl Drop for InFlightTicket {
    fn drop(&mut self) {
        self.active.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_blocked_until_drop() {
        let guard = InFlight::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let ticket = guard.try_acquire(a, b).unwrap();
        assert!(guard.try_acquire(a, b).is_none());
        assert!(guard.is_active(a, b));

        // other targets are independent
        assert!(guard.try_acquire(a, Uuid::new_v4()).is_some());

        drop(ticket);
        assert!(!guard.is_active(a, b));
        assert!(guard.try_acquire(a, b).is_some());
    }

    #[test]
    fn test_clones_share_state() {
        let guard = InFlight::new();
        let shared = guard.clone();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let _ticket = guard.try_acquire(a, b).unwrap();
        assert!(shared.try_acquire(a, b).is_none());
    }
}
