//! Connection registry: live connections, account bindings, groups.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc;

static CONNECTION_ID: AtomicU32 = AtomicU32::new(1);

/// Opaque identity assigned at accept time; all registry maps key on it,
/// never on the socket itself.
pub fn next_connection_id() -> u32 {
    CONNECTION_ID.fetch_add(1, Ordering::SeqCst)
}

/// One live connection as the router sees it.
#[derive(Debug)]
pub struct ConnHandle {
    pub id: u32,
    pub addr: SocketAddr,
    /// Account bound by a confirmed presence, if any.
    pub account: Option<String>,
    /// Channel to the connection's writer task.
    pub tx: mpsc::UnboundedSender<Bytes>,
}

impl ConnHandle {
    pub fn send(&self, frame: Bytes) -> bool {
        self.tx.send(frame).is_ok()
    }
}

/// Live-state bookkeeping, owned exclusively by the router task.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    conns: HashMap<u32, ConnHandle>,
    names: HashMap<String, u32>,
    groups: HashMap<String, HashSet<u32>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: ConnHandle) {
        self.conns.insert(handle.id, handle);
    }

    /// Remove a connection, unbinding its account name and pruning it from
    /// every group. Groups themselves are never destroyed.
    pub fn remove(&mut self, id: u32) -> Option<ConnHandle> {
        let handle = self.conns.remove(&id)?;
        if let Some(name) = &handle.account {
            if self.names.get(name) == Some(&id) {
                self.names.remove(name);
            }
        }
        for members in self.groups.values_mut() {
            members.remove(&id);
        }
        Some(handle)
    }

    pub fn get(&self, id: u32) -> Option<&ConnHandle> {
        self.conns.get(&id)
    }

    /// Bind an account name to a connection. A later binding for the same
    /// name overwrites the mapping; the previous connection stays live but
    /// loses the name.
    pub fn bind_account(&mut self, id: u32, name: &str) {
        if let Some(old_id) = self.names.insert(name.to_string(), id) {
            if old_id != id {
                if let Some(old) = self.conns.get_mut(&old_id) {
                    if old.account.as_deref() == Some(name) {
                        old.account = None;
                    }
                }
            }
        }
        if let Some(conn) = self.conns.get_mut(&id) {
            conn.account = Some(name.to_string());
        }
    }

    /// Resolve a bound account name to its live connection.
    pub fn resolve(&self, name: &str) -> Option<&ConnHandle> {
        self.names.get(name).and_then(|id| self.conns.get(id))
    }

    /// Add a connection to a group, creating the group on first reference.
    /// Returns true when the group was newly created. A repeated join by the
    /// same connection is a no-op.
    pub fn join_group(&mut self, group: &str, id: u32) -> bool {
        match self.groups.get_mut(group) {
            Some(members) => {
                members.insert(id);
                false
            }
            None => {
                self.groups.insert(group.to_string(), HashSet::from([id]));
                true
            }
        }
    }

    /// Member ids of a group; empty when the group is unknown.
    pub fn group_members(&self, group: &str) -> impl Iterator<Item = u32> + '_ {
        self.groups.get(group).into_iter().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn conn(id: u32) -> (ConnHandle, UnboundedReceiver<Bytes>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnHandle {
            id,
            addr: "127.0.0.1:0".parse().unwrap(),
            account: None,
            tx,
        };
        (handle, rx)
    }

    #[test]
    fn test_last_binding_wins() {
        let mut registry = ConnectionRegistry::new();
        let (first, _rx1) = conn(1);
        let (second, _rx2) = conn(2);
        registry.insert(first);
        registry.insert(second);

        registry.bind_account(1, "alice");
        registry.bind_account(2, "alice");

        assert_eq!(registry.resolve("alice").map(|c| c.id), Some(2));
        assert_eq!(registry.get(1).unwrap().account, None);
        assert_eq!(registry.get(2).unwrap().account.as_deref(), Some("alice"));
    }

    #[test]
    fn test_remove_unbinds_and_prunes_groups() {
        let mut registry = ConnectionRegistry::new();
        let (handle, _rx) = conn(1);
        registry.insert(handle);
        registry.bind_account(1, "alice");
        registry.join_group("#team", 1);

        registry.remove(1);

        assert!(registry.resolve("alice").is_none());
        assert_eq!(registry.group_members("#team").count(), 0);
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_remove_keeps_newer_binding() {
        let mut registry = ConnectionRegistry::new();
        let (first, _rx1) = conn(1);
        let (second, _rx2) = conn(2);
        registry.insert(first);
        registry.insert(second);
        registry.bind_account(1, "alice");
        registry.bind_account(2, "alice");

        // Removing the stale connection must not evict the live binding.
        registry.remove(1);
        assert_eq!(registry.resolve("alice").map(|c| c.id), Some(2));
    }

    #[test]
    fn test_join_group_created_once() {
        let mut registry = ConnectionRegistry::new();
        let (first, _rx1) = conn(1);
        let (second, _rx2) = conn(2);
        registry.insert(first);
        registry.insert(second);

        assert!(registry.join_group("#team", 1));
        assert!(!registry.join_group("#team", 2));
        assert!(!registry.join_group("#team", 1));
        assert_eq!(registry.group_members("#team").count(), 2);
    }
}
