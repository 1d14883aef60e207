//! Persistence gateway for project chat and the notification feed.
//!
//! Messages are append-only; notifications only ever change their read flag.
//! Timestamps and per-project sequence numbers are assigned here, at insert
//! time, and are authoritative for everything downstream.

mod messages;
mod notifications;
mod projects;

use sqlx::{pool::PoolConnection, Sqlite, SqlitePool};

use crate::error::Result;

pub use messages::{Attachment, AttachmentKind, ChatMessage, NewMessage, ATTACHMENT_PLACEHOLDER};
pub use notifications::{NewNotification, Notification, NotificationKind};
pub use projects::Project;

#[derive(Clone)]
pub struct Store {
    db_pool: SqlitePool,
}

impl Store {
    pub fn new(db_pool: SqlitePool) -> Self {
        Self { db_pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db_pool
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        Ok(self.db_pool.acquire().await?)
    }
}

fn decode_err<E>(err: E) -> sqlx::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    sqlx::Error::Decode(Box::new(err))
}
