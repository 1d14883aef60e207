mod room;
mod msg;
mod ws;

pub mod events;
pub mod registry;

use axum::{routing::get, Router};

use crate::AppState;

pub use events::{ClientEvent, SendMessage, ServerEvent};
pub use msg::Coordinator;
pub use registry::{ConnectionId, Registry};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/projects", get(room::projects))
        .route("/projects/{project_id}/messages", get(room::messages))
        .route("/ws", get(ws::project_ws))
}
