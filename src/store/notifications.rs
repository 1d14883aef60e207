use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::{decode_err, Store};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ProposalAccepted,
    WorkSubmitted,
    JobCompleted,
    NewRating,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        use NotificationKind::*;
        match self {
            ProposalAccepted => "proposal_accepted",
            WorkSubmitted => "work_submitted",
            JobCompleted => "job_completed",
            NewRating => "new_rating",
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown notification type {0:?}")]
pub struct UnknownNotificationKind(String);

impl FromStr for NotificationKind {
    type Err = UnknownNotificationKind;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        use NotificationKind::*;
        Ok(match s {
            "proposal_accepted" => ProposalAccepted,
            "work_submitted" => WorkSubmitted,
            "job_completed" => JobCompleted,
            "new_rating" => NewRating,
            other => return Err(UnknownNotificationKind(other.to_owned())),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    #[serde(skip)]
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    pub link: Option<String>,
    pub is_read: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: String,
    user_id: String,
    #[sqlx(rename = "type")]
    kind: String,
    message: String,
    link: Option<String>,
    is_read: bool,
    created_at: OffsetDateTime,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = sqlx::Error;

    fn try_from(row: NotificationRow) -> std::result::Result<Self, Self::Error> {
        Ok(Notification {
            id: Uuid::parse_str(&row.id).map_err(decode_err)?,
            user_id: row.user_id,
            kind: row.kind.parse().map_err(decode_err)?,
            message: row.message,
            link: row.link,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

impl Store {
    pub async fn insert_notification(&self, new: &NewNotification) -> Result<Notification> {
        let id = Uuid::now_v7();
        let created_at = OffsetDateTime::now_utc();

        sqlx::query("INSERT INTO notifications (id,user_id,type,message,link,is_read,created_at) VALUES (?,?,?,?,?,0,?)")
            .bind(id.to_string())
            .bind(&new.recipient_id)
            .bind(new.kind.as_str())
            .bind(&new.message)
            .bind(&new.link)
            .bind(created_at)
            .execute(&self.db_pool)
            .await?;

        Ok(Notification {
            id,
            user_id: new.recipient_id.clone(),
            kind: new.kind,
            message: new.message.clone(),
            link: new.link.clone(),
            is_read: false,
            created_at,
        })
    }

    /// Newest first.
    pub async fn notifications_for(&self, user_id: &str) -> Result<Vec<Notification>> {
        let rows: Vec<NotificationRow> = sqlx::query_as(
            "SELECT id,user_id,type,message,link,is_read,created_at FROM notifications \
             WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter()
            .map(|row| Notification::try_from(row).map_err(Error::from))
            .collect()
    }

    /// Scoped to the owner. Returns whether a row flipped from unread to read;
    /// someone else's id and an already-read id look the same to the caller.
    pub async fn mark_notification_read(&self, user_id: &str, notification_id: Uuid) -> Result<bool> {
        let result = sqlx::query("UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ? AND is_read = 0")
            .bind(notification_id.to_string())
            .bind(user_id)
            .execute(&self.db_pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn unread_count(&self, user_id: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE user_id = ? AND is_read = 0")
            .bind(user_id)
            .fetch_one(&self.db_pool)
            .await?;
        Ok(count)
    }
}
