//! Realtime wire format.
//!
//! Every frame is a JSON text frame shaped `{"event": <name>, "data": <payload>}`.
//! Outgoing payloads use camelCase keys only; incoming payloads also accept the
//! snake_case spellings older clients send and are normalized here.
//!
//! Client -> Server:
//! ```json
//! {"event": "join_project_room", "data": "job-42"}
//! {"event": "send_message", "data": {"projectId": "job-42", "content": "Hello", "clientRef": "c-1"}}
//! ```
//!
//! Server -> Client:
//! ```json
//! {"event": "receive_message", "data": {"id": "...", "projectId": "job-42", "seq": 1, "content": "Hello", "createdAt": "..."}}
//! {"event": "message_error", "data": {"reason": "Failed to send message", "clientRef": "c-1"}}
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    auth::Identity,
    error::{Error, Result},
    store::{Attachment, AttachmentKind, ChatMessage, NewMessage, Notification},
};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    JoinProjectRoom(String),
    LeaveProjectRoom(String),
    SendMessage(SendMessage),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessage {
    #[serde(alias = "project_id")]
    pub project_id: Option<String>,
    #[serde(alias = "sender_id", skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<String>,
    pub content: Option<String>,
    #[serde(alias = "attachment_url", skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,
    #[serde(alias = "attachment_type", skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<String>,
    #[serde(alias = "client_ref", skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

impl SendMessage {
    /// Validates the payload against the connection's identity.
    ///
    /// The persisted sender is always the connection's identity; a payload
    /// naming someone else is refused rather than rewritten.
    pub fn normalize(&self, identity: &Identity) -> Result<NewMessage> {
        let project_id = non_blank(&self.project_id).ok_or_else(|| Error::invalid("projectId is required"))?;

        if let Some(claimed) = non_blank(&self.sender_id) {
            if claimed != identity.user_id {
                return Err(Error::forbidden("senderId does not match the signed-in user"));
            }
        }

        let attachment = match (non_blank(&self.attachment_url), non_blank(&self.attachment_type)) {
            (None, None) => None,
            (Some(url), Some(kind)) => Some(Attachment {
                url: url.to_owned(),
                kind: kind
                    .parse::<AttachmentKind>()
                    .map_err(|e| Error::invalid(e.to_string()))?,
            }),
            _ => return Err(Error::invalid("attachmentUrl and attachmentType go together")),
        };

        let new = NewMessage {
            project_id: project_id.to_owned(),
            sender_id: identity.user_id.clone(),
            content: self.content.clone(),
            attachment,
        };
        if new.effective_content().is_none() {
            return Err(Error::invalid("message needs content or an attachment"));
        }
        Ok(new)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ReceiveMessage(Delivered),
    MessageError(MessageError),
    RoomError(RoomError),
    NewNotification(Notification),
}

/// A persisted message as broadcast to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivered {
    #[serde(flatten)]
    pub message: ChatMessage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageError {
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomError {
    pub project_id: String,
    pub reason: String,
}

impl ServerEvent {
    pub fn message_error(reason: impl Into<String>, payload: &SendMessage) -> Self {
        ServerEvent::MessageError(MessageError {
            reason: reason.into(),
            project_id: payload.project_id.clone(),
            client_ref: payload.client_ref.clone(),
        })
    }

    pub fn room_error(project_id: &str, reason: impl Into<String>) -> Self {
        ServerEvent::RoomError(RoomError {
            project_id: project_id.to_owned(),
            reason: reason.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;

    fn pat() -> Identity {
        Identity { user_id: "provider-p".to_owned(), role: Role::Provider }
    }

    #[test]
    fn parses_both_key_casings() {
        let camel: ClientEvent = serde_json::from_str(
            r#"{"event":"send_message","data":{"projectId":"job-42","senderId":"provider-p","content":"Hello"}}"#,
        )
        .unwrap();
        let snake: ClientEvent = serde_json::from_str(
            r#"{"event":"send_message","data":{"project_id":"job-42","sender_id":"provider-p","content":"Hello","sender_name":"Pat"}}"#,
        )
        .unwrap();
        assert_eq!(camel, snake);

        let join: ClientEvent = serde_json::from_str(r#"{"event":"join_project_room","data":"job-42"}"#).unwrap();
        assert_eq!(join, ClientEvent::JoinProjectRoom("job-42".to_owned()));
    }

    #[test]
    fn normalize_rejects_spoofed_sender() {
        let payload = SendMessage {
            project_id: Some("job-42".to_owned()),
            sender_id: Some("client-c".to_owned()),
            content: Some("hi".to_owned()),
            ..Default::default()
        };
        assert!(matches!(payload.normalize(&pat()), Err(Error::Forbidden(_))));
    }

    #[test]
    fn normalize_requires_content_or_attachment() {
        let payload = SendMessage { project_id: Some("job-42".to_owned()), ..Default::default() };
        assert!(matches!(payload.normalize(&pat()), Err(Error::InvalidInput(_))));

        let half_attachment = SendMessage {
            project_id: Some("job-42".to_owned()),
            attachment_url: Some("https://cdn.example/a.pdf".to_owned()),
            ..Default::default()
        };
        assert!(matches!(half_attachment.normalize(&pat()), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn normalize_fills_sender_from_identity() {
        let payload = SendMessage {
            project_id: Some(" job-42 ".to_owned()),
            attachment_url: Some("https://cdn.example/a.pdf".to_owned()),
            attachment_type: Some("document".to_owned()),
            ..Default::default()
        };
        let new = payload.normalize(&pat()).unwrap();
        assert_eq!(new.project_id, "job-42");
        assert_eq!(new.sender_id, "provider-p");
        assert_eq!(new.attachment.unwrap().kind, AttachmentKind::Document);
    }

    #[test]
    fn receive_message_flattens_the_message_into_data() {
        let event = ServerEvent::ReceiveMessage(Delivered {
            message: ChatMessage {
                id: uuid::Uuid::nil(),
                project_id: "job-42".to_owned(),
                seq: 3,
                sender_id: "provider-p".to_owned(),
                sender_name: Some("Pat Provider".to_owned()),
                content: "Sent an attachment".to_owned(),
                attachment_url: Some("https://cdn.example/a.pdf".to_owned()),
                attachment_type: Some(AttachmentKind::Document),
                created_at: time::OffsetDateTime::UNIX_EPOCH,
            },
            client_ref: Some("c-9".to_owned()),
        });

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({
                "event": "receive_message",
                "data": {
                    "id": "00000000-0000-0000-0000-000000000000",
                    "projectId": "job-42",
                    "seq": 3,
                    "senderId": "provider-p",
                    "senderName": "Pat Provider",
                    "content": "Sent an attachment",
                    "attachmentUrl": "https://cdn.example/a.pdf",
                    "attachmentType": "document",
                    "createdAt": "1970-01-01T00:00:00Z",
                    "clientRef": "c-9"
                }
            })
        );
    }

    #[test]
    fn message_error_echoes_client_ref() {
        let payload = SendMessage { client_ref: Some("c-7".to_owned()), ..Default::default() };
        let json = serde_json::to_value(ServerEvent::message_error("Failed to send message", &payload)).unwrap();
        assert_eq!(json["event"], "message_error");
        assert_eq!(json["data"]["clientRef"], "c-7");
        assert!(json["data"].get("projectId").is_none());
    }
}
