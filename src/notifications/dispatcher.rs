use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    error::Result,
    rooms::{Registry, ServerEvent},
    store::{NewNotification, Notification, Store},
};

/// Best-effort notification writer.
///
/// [`Notifier::notify`] never fails from the caller's point of view: the write
/// runs on its own task after the caller's transaction has committed, and a
/// failed write is logged there. The returned [`Dispatch`] can be awaited to
/// observe the outcome, or dropped.
#[derive(Clone)]
pub struct Notifier {
    store: Store,
    push: Option<Arc<Registry>>,
}

#[derive(Debug)]
#[must_use = "drop the Dispatch explicitly to fire and forget"]
pub struct Dispatch(JoinHandle<Result<Notification>>);

impl Dispatch {
    pub async fn settled(self) -> Result<Notification> {
        self.0.await?
    }
}

impl Notifier {
    /// With `push` set, stored notifications are also sent as
    /// `new_notification` to the recipient's live connections.
    pub fn new(store: Store, push: Option<Arc<Registry>>) -> Self {
        Self { store, push }
    }

    pub fn notify(&self, notice: NewNotification) -> Dispatch {
        let notifier = self.clone();
        Dispatch(tokio::spawn(async move { notifier.deliver(notice).await }))
    }

    async fn deliver(&self, notice: NewNotification) -> Result<Notification> {
        let notification = match self.store.insert_notification(&notice).await {
            Ok(notification) => notification,
            Err(err) => {
                tracing::error!(
                    user_id = %notice.recipient_id,
                    kind = %notice.kind,
                    error = %err,
                    "failed to create notification"
                );
                return Err(err);
            }
        };
        tracing::info!(user_id = %notification.user_id, kind = %notification.kind, "notification created");

        if let Some(registry) = &self.push {
            for connection in registry.connections_of(&notification.user_id) {
                registry.send_to(connection, ServerEvent::NewNotification(notification.clone()));
            }
        }
        Ok(notification)
    }
}
