use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::{auth::Identity, store::{Notification, Store}, AppResult, AppState};

#[derive(Debug, Serialize)]
pub(crate) struct UnreadCount {
    unread: i64,
}

/// Newest first.
#[debug_handler(state = AppState)]
pub(crate) async fn list(
    identity: Identity,
    State(store): State<Store>,
) -> AppResult<Json<Vec<Notification>>> {
    Ok(Json(store.notifications_for(&identity.user_id).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn unread_count(
    identity: Identity,
    State(store): State<Store>,
) -> AppResult<Json<UnreadCount>> {
    let unread = store.unread_count(&identity.user_id).await?;
    Ok(Json(UnreadCount { unread }))
}

/// Always 204 for a well-formed id, so the response never reveals whether
/// an id belongs to another user.
#[debug_handler(state = AppState)]
pub(crate) async fn mark_read(
    identity: Identity,
    State(store): State<Store>,
    Path(notification_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let changed = store.mark_notification_read(&identity.user_id, notification_id).await?;
    tracing::debug!(user_id = %identity.user_id, %notification_id, changed, "mark read");
    Ok(StatusCode::NO_CONTENT)
}
