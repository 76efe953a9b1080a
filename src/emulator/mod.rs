//! Local emulator: the in-memory store served over the REST surface that
//! `RestBackend` speaks.

mod auth;
mod handlers;

pub use auth::*;
pub use handlers::*;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::backend::MemoryBackend;

/// State shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryBackend>,
}

impl AppState {
    pub fn new(store: Arc<MemoryBackend>) -> Self {
        Self { store }
    }
}

/// Build the emulator router. `auth_key` of `None` disables authentication.
pub fn create_router(state: AppState, auth_key: Option<String>) -> Router {
    let store_routes = Router::new()
        .route("/dbs", post(post_databases))
        .route("/dbs/{db}", delete(delete_database))
        .route("/dbs/{db}/colls", post(post_collections))
        .route("/dbs/{db}/colls/{coll}/docs", post(post_documents))
        .route(
            "/dbs/{db}/colls/{coll}/docs/{id}",
            delete(delete_document).put(replace_document),
        )
        .layer(middleware::from_fn(move |req, next| {
            auth::psk_auth_layer(auth_key.clone(), req, next)
        }));

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(store_routes)
        .merge(health_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
