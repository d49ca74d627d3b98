use axum::{
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::events_ws::events_ws_handler;
use super::handlers;
use super::relay_ws::relay_ws_handler;
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/sessions", get(handlers::list_sessions))
        .route("/sources", get(handlers::list_sources))
        .route("/config", get(handlers::config::get_all_config))
        .route(
            "/config/transcoder",
            post(handlers::config::update_transcoder_config),
        )
        .route("/ws/events", any(events_ws_handler));

    Router::new()
        // Relay endpoint: ws://<host>/?streamUrl=<source>
        .route("/", get(relay_ws_handler))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
