pub mod appresult;
pub mod auth;
pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod lifecycle;
pub mod notifications;
pub mod rooms;
pub mod session;
pub mod store;

use std::sync::Arc;

use axum::{extract::FromRef, routing::get, Router};
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

use config::Config;
use notifications::Notifier;
use rooms::{Coordinator, Registry};
use store::Store;

pub use appresult::{AppError, AppResult};

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub registry: Arc<Registry>,
    pub coordinator: Arc<Coordinator>,
    pub notifier: Notifier,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wires every component around one pool. The registry is shared by the
    /// coordinator and, when push is enabled, the notifier.
    pub fn new(config: Config, db_pool: SqlitePool) -> Self {
        let store = Store::new(db_pool);
        let registry = Arc::new(Registry::new());
        let coordinator = Arc::new(Coordinator::new(store.clone(), registry.clone(), config.persist_timeout));
        let push = config.push_notifications.then(|| registry.clone());
        let notifier = Notifier::new(store.clone(), push);

        Self {
            store,
            registry,
            coordinator,
            notifier,
            config: Arc::new(config),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(false)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(state.config.session_inactivity));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(auth::router())
        .merge(rooms::router())
        .merge(notifications::router())
        .merge(lifecycle::router())
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
