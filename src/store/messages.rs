use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use time::OffsetDateTime;
use uuid::Uuid;

use super::{decode_err, Project, Store};
use crate::error::{Error, Result};

/// Stored as the content of a message that only carries an attachment.
pub const ATTACHMENT_PLACEHOLDER: &str = "Sent an attachment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Image,
    Document,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Document => "document",
        }
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown attachment type {0:?}")]
pub struct UnknownAttachmentKind(String);

impl FromStr for AttachmentKind {
    type Err = UnknownAttachmentKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "image" => Ok(AttachmentKind::Image),
            "document" => Ok(AttachmentKind::Document),
            other => Err(UnknownAttachmentKind(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub url: String,
    pub kind: AttachmentKind,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub project_id: String,
    pub sender_id: String,
    pub content: Option<String>,
    pub attachment: Option<Attachment>,
}

impl NewMessage {
    /// Text to persist: the trimmed content, or the placeholder for an
    /// attachment-only message. `None` when there is nothing to send.
    pub fn effective_content(&self) -> Option<String> {
        match self.content.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => Some(text.to_owned()),
            _ if self.attachment.is_some() => Some(ATTACHMENT_PLACEHOLDER.to_owned()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub project_id: String,
    pub seq: i64,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub content: String,
    pub attachment_url: Option<String>,
    pub attachment_type: Option<AttachmentKind>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    project_id: String,
    seq: i64,
    sender_id: String,
    sender_name: Option<String>,
    content: String,
    attachment_url: Option<String>,
    attachment_type: Option<String>,
    created_at: OffsetDateTime,
}

impl TryFrom<MessageRow> for ChatMessage {
    type Error = sqlx::Error;

    fn try_from(row: MessageRow) -> std::result::Result<Self, Self::Error> {
        Ok(ChatMessage {
            id: Uuid::parse_str(&row.id).map_err(decode_err)?,
            project_id: row.project_id,
            seq: row.seq,
            sender_id: row.sender_id,
            sender_name: row.sender_name,
            content: row.content,
            attachment_url: row.attachment_url,
            attachment_type: row
                .attachment_type
                .as_deref()
                .map(AttachmentKind::from_str)
                .transpose()
                .map_err(decode_err)?,
            created_at: row.created_at,
        })
    }
}

impl Store {
    /// Appends a message after checking the sender belongs to the project.
    pub async fn append_message(&self, new: NewMessage) -> Result<ChatMessage> {
        let project = self.authorize_participant(&new.sender_id, &new.project_id).await?;
        let mut conn = self.acquire().await?;
        Self::insert_message(&mut conn, new, &project).await
    }

    /// Inserts on a connection the caller already holds.
    ///
    /// The sequence number is computed inside the insert statement, so it is
    /// gap-free and unique per project regardless of how callers interleave.
    /// A locked database surfaces as a busy error once the connection's busy
    /// timeout runs out; the statement is never left running behind the caller.
    pub async fn insert_message(conn: &mut SqliteConnection, new: NewMessage, project: &Project) -> Result<ChatMessage> {
        let content = new
            .effective_content()
            .ok_or_else(|| Error::invalid("message needs content or an attachment"))?;
        if project.project_id != new.project_id || !project.is_participant(&new.sender_id) {
            return Err(Error::forbidden("not a participant of this project"));
        }

        let id = Uuid::now_v7();
        let created_at = OffsetDateTime::now_utc();
        let (attachment_url, attachment_type) = match &new.attachment {
            Some(Attachment { url, kind }) => (Some(url.clone()), Some(*kind)),
            None => (None, None),
        };

        let (seq,): (i64,) = sqlx::query_as(
            r#"INSERT INTO messages (id,project_id,seq,sender_id,content,attachment_url,attachment_type,created_at)
               SELECT ?, ?, COALESCE(MAX(seq), 0) + 1, ?, ?, ?, ?, ? FROM messages WHERE project_id = ?
               RETURNING seq"#,
        )
        .bind(id.to_string())
        .bind(&new.project_id)
        .bind(&new.sender_id)
        .bind(&content)
        .bind(&attachment_url)
        .bind(attachment_type.map(|kind| kind.as_str()))
        .bind(created_at)
        .bind(&new.project_id)
        .fetch_one(&mut *conn)
        .await?;

        Ok(ChatMessage {
            id,
            sender_name: project.display_name_of(&new.sender_id).map(str::to_owned),
            project_id: new.project_id,
            seq,
            sender_id: new.sender_id,
            content,
            attachment_url,
            attachment_type,
            created_at,
        })
    }

    /// Full history of a project, oldest first. Callers authorize first.
    pub async fn messages_for(&self, project_id: &str) -> Result<Vec<ChatMessage>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"SELECT m.id, m.project_id, m.seq, m.sender_id, pr.full_name AS sender_name,
                      m.content, m.attachment_url, m.attachment_type, m.created_at
               FROM messages m
               LEFT JOIN profiles pr ON pr.user_id = m.sender_id
               WHERE m.project_id = ?
               ORDER BY m.seq ASC"#,
        )
        .bind(project_id)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter()
            .map(|row| ChatMessage::try_from(row).map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures::{self, CLIENT, OUTSIDER, PROJECT, PROVIDER};

    fn text(sender: &str, content: &str) -> NewMessage {
        NewMessage {
            project_id: PROJECT.to_owned(),
            sender_id: sender.to_owned(),
            content: Some(content.to_owned()),
            attachment: None,
        }
    }

    #[tokio::test]
    async fn sequence_is_per_project_and_history_is_ordered() {
        let store = fixtures::seeded().await;
        fixtures::job(store.pool(), "job-43", CLIENT, "Tile bathroom", "in_progress").await;
        fixtures::proposal(store.pool(), "prop-9", "job-43", PROVIDER, "accepted").await;

        let first = store.append_message(text(PROVIDER, "Hello")).await.unwrap();
        let second = store.append_message(text(CLIENT, "Hi there")).await.unwrap();
        let other_room = store
            .append_message(NewMessage { project_id: "job-43".to_owned(), ..text(CLIENT, "elsewhere") })
            .await
            .unwrap();

        assert_eq!((first.seq, second.seq, other_room.seq), (1, 2, 1));
        assert_eq!(first.sender_name.as_deref(), Some("Pat Provider"));

        let history = store.messages_for(PROJECT).await.unwrap();
        let ids: Vec<_> = history.iter().map(|m| m.id).collect();
        assert_eq!(ids, [first.id, second.id]);
        assert_eq!(history[1].sender_name.as_deref(), Some("Cora Client"));
    }

    #[tokio::test]
    async fn attachment_only_message_gets_placeholder() {
        let store = fixtures::seeded().await;
        let message = store
            .append_message(NewMessage {
                content: Some("   ".to_owned()),
                attachment: Some(Attachment {
                    url: "https://cdn.example/photo.png".to_owned(),
                    kind: AttachmentKind::Image,
                }),
                ..text(PROVIDER, "")
            })
            .await
            .unwrap();

        assert_eq!(message.content, ATTACHMENT_PLACEHOLDER);
        let stored = store.messages_for(PROJECT).await.unwrap().remove(0);
        assert_eq!(stored.attachment_type, Some(AttachmentKind::Image));
        assert_eq!(stored.attachment_url.as_deref(), Some("https://cdn.example/photo.png"));
    }

    #[tokio::test]
    async fn non_participant_cannot_write() {
        let store = fixtures::seeded().await;
        let err = store.append_message(text(OUTSIDER, "let me in")).await.unwrap_err();
        assert!(matches!(err, Error::Forbidden(_)));
        assert!(store.messages_for(PROJECT).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_message_is_invalid() {
        let store = fixtures::seeded().await;
        let err = store.append_message(text(CLIENT, "")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let message = ChatMessage {
            id: Uuid::nil(),
            project_id: PROJECT.to_owned(),
            seq: 1,
            sender_id: CLIENT.to_owned(),
            sender_name: None,
            content: "hi".to_owned(),
            attachment_url: None,
            attachment_type: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["projectId"], PROJECT);
        assert_eq!(json["createdAt"], "1970-01-01T00:00:00Z");
        assert!(json.get("senderName").is_none());
    }
}
