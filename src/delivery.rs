//! Client-side send tracking.
//!
//! A client stages a message under a fresh `clientRef`, sends the returned
//! payload, and feeds every server event it receives back into the
//! [`Outbox`]. The echoed `receive_message` confirms the entry and
//! `message_error` fails it.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    rooms::{SendMessage, ServerEvent},
    store::Attachment,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    Pending,
    Confirmed { id: Uuid, seq: i64 },
    Failed { reason: String },
}

impl DeliveryState {
    pub fn is_settled(&self) -> bool {
        !matches!(self, DeliveryState::Pending)
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    entries: HashMap<String, DeliveryState>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a pending send and returns the payload to put on the wire.
    pub fn stage(&mut self, project_id: &str, content: Option<&str>, attachment: Option<&Attachment>) -> SendMessage {
        let client_ref = Uuid::now_v7().to_string();
        self.entries.insert(client_ref.clone(), DeliveryState::Pending);

        SendMessage {
            project_id: Some(project_id.to_owned()),
            sender_id: None,
            content: content.map(str::to_owned),
            attachment_url: attachment.map(|a| a.url.clone()),
            attachment_type: attachment.map(|a| a.kind.to_string()),
            client_ref: Some(client_ref),
        }
    }

    /// Applies a server event. Returns the ref it settled, if any.
    ///
    /// Events for refs this outbox never staged, and repeats for refs already
    /// settled, leave the outbox unchanged.
    pub fn observe(&mut self, event: &ServerEvent) -> Option<String> {
        let (client_ref, settled) = match event {
            ServerEvent::ReceiveMessage(delivered) => (
                delivered.client_ref.as_ref()?,
                DeliveryState::Confirmed {
                    id: delivered.message.id,
                    seq: delivered.message.seq,
                },
            ),
            ServerEvent::MessageError(error) => (
                error.client_ref.as_ref()?,
                DeliveryState::Failed {
                    reason: error.reason.clone(),
                },
            ),
            ServerEvent::RoomError(_) | ServerEvent::NewNotification(_) => return None,
        };

        let state = self.entries.get_mut(client_ref)?;
        if state.is_settled() {
            return None;
        }
        *state = settled;
        Some(client_ref.clone())
    }

    pub fn state(&self, client_ref: &str) -> Option<&DeliveryState> {
        self.entries.get(client_ref)
    }

    pub fn pending(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, state)| !state.is_settled())
            .map(|(client_ref, _)| client_ref.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use time::OffsetDateTime;

    use super::*;
    use crate::{
        rooms::events::Delivered,
        store::{AttachmentKind, ChatMessage},
    };

    fn echo(client_ref: Option<String>, seq: i64) -> ServerEvent {
        ServerEvent::ReceiveMessage(Delivered {
            message: ChatMessage {
                id: Uuid::now_v7(),
                project_id: "job-42".to_owned(),
                seq,
                sender_id: "client-c".to_owned(),
                sender_name: None,
                content: "hi".to_owned(),
                attachment_url: None,
                attachment_type: None,
                created_at: OffsetDateTime::now_utc(),
            },
            client_ref,
        })
    }

    #[test]
    fn confirm_and_fail_settle_once() {
        let mut outbox = Outbox::new();
        let first = outbox.stage("job-42", Some("hi"), None);
        let second = outbox.stage("job-42", Some("boom"), None);
        let first_ref = first.client_ref.clone().unwrap();
        let second_ref = second.client_ref.clone().unwrap();
        assert_eq!(outbox.pending().len(), 2);

        let confirmation = echo(Some(first_ref.clone()), 3);
        assert_eq!(outbox.observe(&confirmation), Some(first_ref.clone()));
        assert!(matches!(outbox.state(&first_ref), Some(DeliveryState::Confirmed { seq: 3, .. })));

        let failure = ServerEvent::message_error("Failed to send message", &second);
        assert_eq!(outbox.observe(&failure), Some(second_ref.clone()));
        assert_eq!(
            outbox.state(&second_ref),
            Some(&DeliveryState::Failed { reason: "Failed to send message".to_owned() })
        );

        // a late error for an already confirmed ref changes nothing
        let late = ServerEvent::message_error("Failed to send message", &first);
        assert_eq!(outbox.observe(&late), None);
        assert!(outbox.state(&first_ref).unwrap().is_settled());
        assert!(outbox.pending().is_empty());
    }

    #[test]
    fn ignores_other_senders_and_unknown_refs() {
        let mut outbox = Outbox::new();
        let staged = outbox.stage("job-42", None, Some(&Attachment {
            url: "https://cdn.example/x.png".to_owned(),
            kind: AttachmentKind::Image,
        }));
        assert_eq!(staged.attachment_type.as_deref(), Some("image"));

        assert_eq!(outbox.observe(&echo(None, 1)), None);
        assert_eq!(outbox.observe(&echo(Some("someone-else".to_owned()), 2)), None);
        assert_eq!(outbox.pending(), [staged.client_ref.as_deref().unwrap()]);
    }
}
