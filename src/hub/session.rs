//! Per-session state and the session table. An `AtomicU32` issues
//! session ids, a `parking_lot::Mutex`-guarded table tracks who's
//! connected, and session cleanup always runs regardless of how the
//! connection ended.

use super::protocol::OutboundEnvelope;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

pub type SessionId = u64;

/// A single connected client: an outbound queue and the set of project
/// topics it currently subscribes to.
pub struct Session {
    pub id: SessionId,
    outbound: mpsc::UnboundedSender<OutboundEnvelope>,
    subscriptions: Mutex<HashSet<String>>,
}

impl Session {
    pub fn send(&self, envelope: OutboundEnvelope) -> Result<(), crate::error::HubError> {
        self.outbound.send(envelope).map_err(|e| {
            crate::error::HubError::SendFailed(self.id.to_string(), e.to_string())
        })
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().iter().cloned().collect()
    }

    pub fn is_subscribed(&self, project: &str) -> bool {
        self.subscriptions.lock().contains(project)
    }
}

/// Single-writer table of sessions plus a topic→session-id index kept in
/// sync with each subscribe/unsubscribe, behind exclusive single-writer
/// critical sections so broadcasts see consistent snapshots.
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    topic_index: Mutex<HashMap<String, HashSet<SessionId>>>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new() -> Self {
        SessionManager {
            sessions: Mutex::new(HashMap::new()),
            topic_index: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(
        &self,
        outbound: mpsc::UnboundedSender<OutboundEnvelope>,
    ) -> Arc<Session> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session {
            id,
            outbound,
            subscriptions: Mutex::new(HashSet::new()),
        });
        self.sessions.lock().insert(id, session.clone());
        session
    }

    /// Removes a session from the table and every topic it was subscribed
    /// to.
    pub fn remove(&self, id: SessionId) {
        if let Some(session) = self.sessions.lock().remove(&id) {
            let topics = session.subscriptions();
            let mut index = self.topic_index.lock();
            for topic in topics {
                if let Some(ids) = index.get_mut(&topic) {
                    ids.remove(&id);
                }
            }
        }
    }

    pub fn get(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.lock().get(&id).cloned()
    }

    pub fn subscribe(&self, id: SessionId, project: &str) -> Result<(), crate::error::HubError> {
        let session = self
            .get(id)
            .ok_or_else(|| crate::error::HubError::SessionNotFound(id.to_string()))?;
        session.subscriptions.lock().insert(project.to_string());
        self.topic_index
            .lock()
            .entry(project.to_string())
            .or_default()
            .insert(id);
        Ok(())
    }

    pub fn unsubscribe(&self, id: SessionId, project: &str) -> Result<(), crate::error::HubError> {
        let session = self
            .get(id)
            .ok_or_else(|| crate::error::HubError::SessionNotFound(id.to_string()))?;
        session.subscriptions.lock().remove(project);
        if let Some(ids) = self.topic_index.lock().get_mut(project) {
            ids.remove(&id);
        }
        Ok(())
    }

    /// Atomic unsubscribe-all + subscribe:
    /// `project_select p ≡ {unsubscribe all; subscribe p}`.
    pub fn select_project(&self, id: SessionId, project: &str) -> Result<(), crate::error::HubError> {
        let session = self
            .get(id)
            .ok_or_else(|| crate::error::HubError::SessionNotFound(id.to_string()))?;
        let mut index = self.topic_index.lock();
        let mut subs = session.subscriptions.lock();
        for topic in subs.drain() {
            if let Some(ids) = index.get_mut(&topic) {
                ids.remove(&id);
            }
        }
        subs.insert(project.to_string());
        index.entry(project.to_string()).or_default().insert(id);
        Ok(())
    }

    /// Consistent snapshot of subscriber ids for a topic, taken under the
    /// index lock so a concurrent subscribe/unsubscribe can't interleave
    /// with delivery.
    pub fn subscribers_of(&self, project: &str) -> Vec<Arc<Session>> {
        let ids: Vec<SessionId> = self
            .topic_index
            .lock()
            .get(project)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let sessions = self.sessions.lock();
        ids.iter().filter_map(|id| sessions.get(id).cloned()).collect()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn all_sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().values().cloned().collect()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager_with_session() -> (SessionManager, SessionId, mpsc::UnboundedReceiver<OutboundEnvelope>) {
        let manager = SessionManager::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let session = manager.register(tx);
        (manager, session.id, rx)
    }

    #[test]
    fn subscribe_twice_is_idempotent() {
        let (manager, id, _rx) = manager_with_session();
        manager.subscribe(id, "finger_count").unwrap();
        manager.subscribe(id, "finger_count").unwrap();
        assert_eq!(manager.subscribers_of("finger_count").len(), 1);
    }

    #[test]
    fn unsubscribe_removes_from_topic_index() {
        let (manager, id, _rx) = manager_with_session();
        manager.subscribe(id, "finger_count").unwrap();
        manager.unsubscribe(id, "finger_count").unwrap();
        assert!(manager.subscribers_of("finger_count").is_empty());
    }

    #[test]
    fn project_select_replaces_topic_set() {
        let (manager, id, _rx) = manager_with_session();
        manager.subscribe(id, "finger_count").unwrap();
        manager.select_project(id, "volume_control").unwrap();
        assert!(manager.subscribers_of("finger_count").is_empty());
        assert_eq!(manager.subscribers_of("volume_control").len(), 1);
    }

    #[test]
    fn remove_clears_topic_membership() {
        let (manager, id, _rx) = manager_with_session();
        manager.subscribe(id, "finger_count").unwrap();
        manager.remove(id);
        assert!(manager.subscribers_of("finger_count").is_empty());
        assert_eq!(manager.session_count(), 0);
    }
}
