mod dispatcher;
mod feed;

use axum::{routing::{get, put}, Router};

use crate::AppState;

pub use dispatcher::{Dispatch, Notifier};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(feed::list))
        .route("/notifications/unread-count", get(feed::unread_count))
        .route("/notifications/{id}/read", put(feed::mark_read))
}
