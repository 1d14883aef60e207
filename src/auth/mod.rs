//! Identity as handed over by the account service.
//!
//! Authentication itself happens elsewhere; whatever signs the user in
//! leaves a user id and role in the session, and every handler here reads
//! them back through the [`Identity`] extractor.

mod identity;
mod login;
mod logout;

use axum::{routing::post, Router};

use crate::AppState;

pub use identity::{Identity, Role};
pub use login::{login, remember};
pub use logout::logout;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/session", post(login))
        .route("/logout", post(logout))
}
