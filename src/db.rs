use std::{str::FromStr, time::Duration};

use sqlx::{sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions}, SqlitePool};

use crate::error::Result;

/// Opens and migrates the database. A statement waiting on another writer's
/// lock gives up with a busy error after `busy_timeout`.
pub async fn connect(database_url: &str, busy_timeout: Duration) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(busy_timeout);

    let db_pool = SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await?;

    migrate(&db_pool).await?;
    Ok(db_pool)
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(db_pool).await?;
    Ok(())
}

/// A migrated in-memory database. Pinned to one connection, since every
/// in-memory SQLite connection is its own database.
pub async fn memory_pool() -> Result<SqlitePool> {
    let db_pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    migrate(&db_pool).await?;
    Ok(db_pool)
}
