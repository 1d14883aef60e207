use axum::{debug_handler, extract::{Path, State}, Json};

use crate::{auth::Identity, store::{ChatMessage, Project, Store}, AppResult, AppState};

/// Conversation list: one entry per project the caller takes part in.
#[debug_handler(state = AppState)]
pub(crate) async fn projects(
    identity: Identity,
    State(store): State<Store>,
) -> AppResult<Json<Vec<Project>>> {
    Ok(Json(store.projects_for(&identity.user_id).await?))
}

/// Full history of a project, oldest first. Participants only.
#[debug_handler(state = AppState)]
pub(crate) async fn messages(
    identity: Identity,
    State(store): State<Store>,
    Path(project_id): Path<String>,
) -> AppResult<Json<Vec<ChatMessage>>> {
    store.authorize_participant(&identity.user_id, &project_id).await?;
    Ok(Json(store.messages_for(&project_id).await?))
}
