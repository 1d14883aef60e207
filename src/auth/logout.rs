use axum::{debug_handler, extract::Query, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;

use crate::AppResult;

#[derive(Deserialize)]
pub struct LogoutQuery {
    return_url: Option<String>,
}

/// Drops the session. Open sockets keep their identity until they disconnect.
#[debug_handler]
pub async fn logout(
    Query(LogoutQuery { return_url }): Query<LogoutQuery>,
    session: Session,
) -> AppResult<Redirect> {
    session.flush().await?;

    let target = return_url
        .filter(|url| url.starts_with('/') && !url.starts_with("//"))
        .unwrap_or_else(|| "/".to_owned());
    Ok(Redirect::to(&target))
}
