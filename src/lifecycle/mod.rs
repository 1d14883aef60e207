//! Job lifecycle endpoints. Each one changes job state and then notifies the
//! other party in the background.

mod jobs;

use axum::{debug_handler, extract::{Path, State}, routing::post, Json, Router};
use serde::Deserialize;

use crate::{auth::Identity, notifications::Notifier, store::Store, AppResult, AppState};

pub use jobs::{accept_proposal, complete_job, submit_rating, submit_work, Transition};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/proposals/{proposal_id}/accept", post(accept))
        .route("/jobs/{job_id}/submit", post(submit))
        .route("/jobs/{job_id}/complete", post(complete))
        .route("/jobs/{job_id}/rating", post(rate))
}

#[debug_handler(state = AppState)]
async fn accept(
    identity: Identity,
    State(store): State<Store>,
    State(notifier): State<Notifier>,
    Path(proposal_id): Path<String>,
) -> AppResult<Json<Transition>> {
    let (transition, dispatch) = accept_proposal(&store, &notifier, &identity.user_id, &proposal_id).await?;
    drop(dispatch);
    Ok(Json(transition))
}

#[debug_handler(state = AppState)]
async fn submit(
    identity: Identity,
    State(store): State<Store>,
    State(notifier): State<Notifier>,
    Path(job_id): Path<String>,
) -> AppResult<Json<Transition>> {
    let (transition, dispatch) = submit_work(&store, &notifier, &identity.user_id, &job_id).await?;
    drop(dispatch);
    Ok(Json(transition))
}

#[debug_handler(state = AppState)]
async fn complete(
    identity: Identity,
    State(store): State<Store>,
    State(notifier): State<Notifier>,
    Path(job_id): Path<String>,
) -> AppResult<Json<Transition>> {
    let (transition, dispatch) = complete_job(&store, &notifier, &identity.user_id, &job_id).await?;
    drop(dispatch);
    Ok(Json(transition))
}

#[derive(Deserialize)]
struct RatingRequest {
    score: i64,
    #[serde(default)]
    comment: Option<String>,
}

#[debug_handler(state = AppState)]
async fn rate(
    identity: Identity,
    State(store): State<Store>,
    State(notifier): State<Notifier>,
    Path(job_id): Path<String>,
    Json(RatingRequest { score, comment }): Json<RatingRequest>,
) -> AppResult<Json<Transition>> {
    let (transition, dispatch) =
        submit_rating(&store, &notifier, &identity.user_id, &job_id, score, comment).await?;
    drop(dispatch);
    Ok(Json(transition))
}
