//! Room coordination: join/leave with participant checks, and the
//! persist-then-broadcast send path.

use std::{future::Future, sync::Arc, time::Duration};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::{
    auth::Identity,
    error::{Error, Result},
    store::{ChatMessage, NewMessage, Store},
};

use super::{
    events::{ClientEvent, Delivered, SendMessage, ServerEvent},
    registry::{ConnectionId, Registry},
};

const SEND_FAILED: &str = "Failed to send message";
const SEND_TIMED_OUT: &str = "Timed out saving message";

pub struct Coordinator {
    store: Store,
    registry: Arc<Registry>,
    persist_timeout: Duration,
    /// Held across persist + broadcast, so a room's delivery order is its
    /// commit order.
    room_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl Coordinator {
    pub fn new(store: Store, registry: Arc<Registry>, persist_timeout: Duration) -> Self {
        Self {
            store,
            registry,
            persist_timeout,
            room_locks: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Dispatches one client event. Failures have already been reported to
    /// the originating connection when this returns.
    pub async fn handle(&self, connection: ConnectionId, identity: &Identity, event: ClientEvent) {
        match event {
            ClientEvent::JoinProjectRoom(project_id) => {
                let _ = self.join(connection, identity, &project_id).await;
            }
            ClientEvent::LeaveProjectRoom(project_id) => self.leave(connection, &project_id),
            ClientEvent::SendMessage(payload) => {
                let _ = self.send_message(connection, identity, payload).await;
            }
        }
    }

    pub async fn join(&self, connection: ConnectionId, identity: &Identity, project_id: &str) -> Result<()> {
        let project_id = project_id.trim();
        let outcome = self
            .bounded(self.store.authorize_participant(&identity.user_id, project_id))
            .await
            .and_then(|_| match self.registry.join(connection, project_id) {
                true => Ok(()),
                false => Err(Error::not_found("connection is not registered")),
            });

        match &outcome {
            Ok(()) => {
                tracing::info!(%connection, user_id = %identity.user_id, project_id, "joined project room");
            }
            Err(err) => {
                tracing::warn!(%connection, user_id = %identity.user_id, project_id, error = %err, "join rejected");
                self.registry.send_to(connection, ServerEvent::room_error(project_id, join_reason(err)));
            }
        }
        outcome
    }

    pub fn leave(&self, connection: ConnectionId, project_id: &str) {
        self.registry.leave(connection, project_id.trim());
        tracing::debug!(%connection, project_id, "left project room");
    }

    /// Persists the message and then fans it out to the room, the sender
    /// included. Nothing is broadcast unless the write committed.
    pub async fn send_message(
        &self,
        connection: ConnectionId,
        identity: &Identity,
        payload: SendMessage,
    ) -> Result<ChatMessage> {
        let new = match payload.normalize(identity) {
            Ok(new) => new,
            Err(err) => {
                tracing::warn!(%connection, user_id = %identity.user_id, error = %err, "message rejected");
                self.registry.send_to(connection, ServerEvent::message_error(err.to_string(), &payload));
                return Err(err);
            }
        };
        let project_id = new.project_id.clone();

        let lock = self.room_lock(&project_id);
        let outcome = {
            let _guard = lock.lock().await;
            self.persist_and_broadcast(connection, identity, new, &payload).await
        };
        drop(lock);
        self.room_locks.remove_if(&project_id, |_, lock| Arc::strong_count(lock) == 1);
        outcome
    }

    /// Runs with the room lock held. Only the participant check and the
    /// connection acquire are cut off by the persist timeout; once the insert
    /// is issued it runs to completion, bounded by the database busy timeout.
    async fn persist_and_broadcast(
        &self,
        connection: ConnectionId,
        identity: &Identity,
        new: NewMessage,
        payload: &SendMessage,
    ) -> Result<ChatMessage> {
        let saved = async move {
            let project = self.bounded(self.store.authorize_participant(&new.sender_id, &new.project_id)).await?;
            let mut conn = self.bounded(self.store.acquire()).await?;
            Store::insert_message(&mut conn, new, &project).await.map_err(|err| {
                if err.is_busy() { Error::Timeout(self.persist_timeout) } else { err }
            })
        };

        let message = match saved.await {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(%connection, user_id = %identity.user_id, error = %err, "message save failed");
                self.registry.send_to(connection, ServerEvent::message_error(send_reason(&err), payload));
                return Err(err);
            }
        };

        let event = ServerEvent::ReceiveMessage(Delivered {
            message: message.clone(),
            client_ref: payload.client_ref.clone(),
        });
        let mut delivered = self.registry.broadcast(&message.project_id, &event);
        if !self.registry.is_member(connection, &message.project_id) && self.registry.send_to(connection, event) {
            delivered += 1;
        }

        tracing::debug!(
            %connection,
            project_id = %message.project_id,
            seq = message.seq,
            delivered,
            "message broadcast"
        );
        Ok(message)
    }

    fn room_lock(&self, project_id: &str) -> Arc<Mutex<()>> {
        self.room_locks
            .entry(project_id.to_owned())
            .or_default()
            .clone()
    }

    async fn bounded<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.persist_timeout, fut)
            .await
            .map_err(|_| Error::Timeout(self.persist_timeout))?
    }
}

fn send_reason(err: &Error) -> String {
    match err {
        Error::Timeout(_) => SEND_TIMED_OUT.to_owned(),
        Error::Forbidden(_) | Error::NotFound(_) | Error::InvalidInput(_) => err.to_string(),
        _ => SEND_FAILED.to_owned(),
    }
}

fn join_reason(err: &Error) -> String {
    match err {
        Error::Forbidden(_) | Error::NotFound(_) | Error::Timeout(_) => err.to_string(),
        _ => "Failed to join project room".to_owned(),
    }
}
