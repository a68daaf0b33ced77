use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;

use crate::error::{RelayError, Result};
use crate::session::{ConnectionId, ConnectionSink, Session};

/// Anything that can hand out the set of live sessions.
pub trait ConnectionSource {
    /// Sessions live at call time. Later registry changes are not visible
    /// through the returned list.
    fn snapshot(&self) -> Vec<Arc<Session>>;

    fn client_count(&self) -> usize;
}

#[derive(Default)]
pub struct Registry {
    sessions: DashMap<ConnectionId, Arc<Session>>,
    next_id: AtomicU64,
    drained: Notify,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, peer: SocketAddr, sink: Arc<dyn ConnectionSink>) -> Arc<Session> {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let session = Arc::new(Session::new(id, peer, sink));
        self.sessions.insert(id, session.clone());
        session
    }

    /// Removes the session. Returns `None` when it was already gone, so only
    /// one caller ever gets to act on a given disconnect.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Session>> {
        let removed = self.sessions.remove(&id).map(|(_, session)| session);
        if removed.is_some() && self.sessions.is_empty() {
            self.drained.notify_waiters();
        }
        removed
    }

    pub fn find(&self, id: ConnectionId) -> Result<Arc<Session>> {
        self.sessions
            .get(&id)
            .map(|guard| guard.clone())
            .ok_or(RelayError::NotFound(id))
    }

    pub fn for_each<F: FnMut(&Session)>(&self, mut visit: F) {
        for session in self.snapshot() {
            visit(&session);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Resolves once the registry holds no sessions.
    pub async fn wait_empty(&self) {
        loop {
            let notified = self.drained.notified();
            if self.sessions.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

impl ConnectionSource for Registry {
    fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn client_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{RecordingSink, peer};
    use std::time::Duration;

    #[test]
    fn add_assigns_distinct_ids_and_no_username() {
        let registry = Registry::new();
        let a = registry.add(peer(1), RecordingSink::new());
        let b = registry.add(peer(2), RecordingSink::new());

        assert_ne!(a.id(), b.id());
        assert_eq!(a.username(), None);
        assert_eq!(registry.client_count(), 2);
    }

    #[test]
    fn remove_is_idempotent() {
        let registry = Registry::new();
        let id = registry.add(peer(1), RecordingSink::new()).id();

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn find_unknown_connection_is_not_found() {
        let registry = Registry::new();
        let id = registry.add(peer(1), RecordingSink::new()).id();
        registry.remove(id);

        assert!(matches!(registry.find(id), Err(RelayError::NotFound(missing)) if missing == id));
    }

    #[test]
    fn snapshot_does_not_follow_later_changes() {
        let registry = Registry::new();
        let first = registry.add(peer(1), RecordingSink::new()).id();
        registry.add(peer(2), RecordingSink::new());

        let snapshot = registry.snapshot();
        registry.remove(first);
        registry.add(peer(3), RecordingSink::new());

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().any(|s| s.id() == first));
    }

    #[test]
    fn for_each_tolerates_mutation_during_traversal() {
        let registry = Registry::new();
        for port in 1..=3 {
            registry.add(peer(port), RecordingSink::new());
        }

        let mut visited = 0;
        registry.for_each(|session| {
            registry.remove(session.id());
            registry.add(peer(99), RecordingSink::new());
            visited += 1;
        });

        assert_eq!(visited, 3);
        assert_eq!(registry.client_count(), 3);
    }

    #[tokio::test]
    async fn wait_empty_resolves_after_last_removal() {
        let registry = Arc::new(Registry::new());
        let id = registry.add(peer(1), RecordingSink::new()).id();

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.wait_empty().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        registry.remove(id);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
