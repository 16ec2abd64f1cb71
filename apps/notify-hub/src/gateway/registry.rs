//! Registry of live hub connections.

use std::sync::Arc;

use dashmap::DashMap;

use super::fanout::Target;
use super::session::GatewaySession;

/// Shared registry of connected sessions, keyed by connection id.
///
/// Entries exist only while the socket is open; nothing is retained for
/// resume.
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: DashMap<String, Arc<GatewaySession>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session: Arc<GatewaySession>) {
        self.sessions.insert(session.connection_id.clone(), session);
    }

    pub fn unregister(&self, connection_id: &str) {
        self.sessions.remove(connection_id);
    }

    pub fn get(&self, connection_id: &str) -> Option<Arc<GatewaySession>> {
        self.sessions.get(connection_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Live connections a payload for `target` would reach right now.
    pub fn count_matching(&self, target: &Target) -> usize {
        match target {
            Target::All => self.sessions.len(),
            _ => self.sessions.iter().filter(|e| e.value().matches(target)).count(),
        }
    }
}
