//! In-process map of live connections and the project rooms they joined.
//!
//! Two maps are kept: connection -> (identity, outbound queue, rooms) and
//! room -> connections. No method holds a guard on one map while touching
//! the other.
//!
//! Membership only spans this process. Fanning out across several server
//! processes needs a shared pub/sub keyed by project id in front of
//! [`Registry::broadcast`].

use std::collections::HashSet;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use super::events::ServerEvent;

pub type ConnectionId = Uuid;

struct Connection {
    user_id: String,
    outbox: mpsc::Sender<ServerEvent>,
    rooms: HashSet<String>,
}

#[derive(Default)]
pub struct Registry {
    connections: DashMap<ConnectionId, Connection>,
    rooms: DashMap<String, HashSet<ConnectionId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, user_id: &str, outbox: mpsc::Sender<ServerEvent>) -> ConnectionId {
        let id = Uuid::now_v7();
        self.connections.insert(
            id,
            Connection {
                user_id: user_id.to_owned(),
                outbox,
                rooms: HashSet::new(),
            },
        );
        tracing::debug!(connection = %id, user_id, "connection registered");
        id
    }

    /// Removes the connection from every room it joined. Idempotent.
    pub fn unregister(&self, id: ConnectionId) {
        let Some((_, connection)) = self.connections.remove(&id) else {
            return;
        };

        for project_id in &connection.rooms {
            self.remove_member(project_id, id);
        }
        tracing::debug!(connection = %id, rooms = connection.rooms.len(), "connection unregistered");
    }

    /// Returns `false` when the connection is not registered.
    pub fn join(&self, id: ConnectionId, project_id: &str) -> bool {
        match self.connections.get_mut(&id) {
            Some(mut connection) => {
                connection.rooms.insert(project_id.to_owned());
            }
            None => return false,
        }

        self.rooms.entry(project_id.to_owned()).or_default().insert(id);
        true
    }

    pub fn leave(&self, id: ConnectionId, project_id: &str) {
        if let Some(mut connection) = self.connections.get_mut(&id) {
            connection.rooms.remove(project_id);
        }
        self.remove_member(project_id, id);
    }

    fn remove_member(&self, project_id: &str, id: ConnectionId) {
        if let Some(mut members) = self.rooms.get_mut(project_id) {
            members.remove(&id);
        }
        self.rooms.remove_if(project_id, |_, members| members.is_empty());
    }

    pub fn members_of(&self, project_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(project_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn rooms_of(&self, id: ConnectionId) -> Vec<String> {
        self.connections
            .get(&id)
            .map(|connection| connection.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_member(&self, id: ConnectionId, project_id: &str) -> bool {
        self.rooms
            .get(project_id)
            .is_some_and(|members| members.contains(&id))
    }

    pub fn connections_of(&self, user_id: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .map(|entry| *entry.key())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queues an event for one connection. A full queue drops the event; the
    /// client recovers by re-fetching history.
    pub fn send_to(&self, id: ConnectionId, event: ServerEvent) -> bool {
        let Some(connection) = self.connections.get(&id) else {
            return false;
        };

        match connection.outbox.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(connection = %id, "outbound queue full, event dropped");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(connection = %id, "outbound queue closed");
                false
            }
        }
    }

    /// Fans an event out to every connection in the room. Returns how many
    /// connections accepted it.
    pub fn broadcast(&self, project_id: &str, event: &ServerEvent) -> usize {
        self.members_of(project_id)
            .into_iter()
            .filter(|id| self.send_to(*id, event.clone()))
            .count()
    }
}
