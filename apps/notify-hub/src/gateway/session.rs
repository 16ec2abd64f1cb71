//! Per-connection hub session state.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::fanout::Target;

/// State for a single WebSocket connection.
pub struct GatewaySession {
    /// Unique connection identifier (`conn_` prefixed ULID).
    pub connection_id: String,
    /// Authenticated user id.
    pub user_id: String,
    /// Groups joined on this connection. Never carried to another connection.
    groups: RwLock<HashSet<String>>,
    /// Monotonically increasing sequence number for dispatch events.
    seq: AtomicU64,
}

impl GatewaySession {
    pub fn new(connection_id: String, user_id: String) -> Self {
        Self {
            connection_id,
            user_id,
            groups: RwLock::new(HashSet::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Returns false if already a member.
    pub fn join(&self, group: &str) -> bool {
        self.groups.write().insert(group.to_string())
    }

    /// Returns false if not a member.
    pub fn leave(&self, group: &str) -> bool {
        self.groups.write().remove(group)
    }

    pub fn is_member(&self, group: &str) -> bool {
        self.groups.read().contains(group)
    }

    /// Whether a payload addressed to `target` should reach this session.
    pub fn matches(&self, target: &Target) -> bool {
        match target {
            Target::All => true,
            Target::Group(group) => self.is_member(group),
            Target::User(user_id) => &self.user_id == user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> GatewaySession {
        GatewaySession::new("conn_1".into(), "usr_1".into())
    }

    #[test]
    fn join_and_leave_are_idempotent() {
        let s = session();
        assert!(s.join("admins"));
        assert!(!s.join("admins"));
        assert!(s.is_member("admins"));
        assert!(s.leave("admins"));
        assert!(!s.leave("admins"));
        assert!(!s.is_member("admins"));
    }

    #[test]
    fn target_matching() {
        let s = session();
        s.join("warehouse");
        assert!(s.matches(&Target::All));
        assert!(s.matches(&Target::Group("warehouse".into())));
        assert!(!s.matches(&Target::Group("admins".into())));
        assert!(s.matches(&Target::User("usr_1".into())));
        assert!(!s.matches(&Target::User("usr_2".into())));
    }

    #[test]
    fn seq_starts_at_one() {
        let s = session();
        assert_eq!(s.next_seq(), 1);
        assert_eq!(s.next_seq(), 2);
    }
}
