use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::{handlers, middleware::metrics_middleware, scraper, ws};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Health and metrics
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        // Runs
        .route("/scraper/run", post(scraper::run))
        .route("/scraper/download", post(scraper::download))
        .route("/scraper/extract", post(scraper::extract))
        .route("/scraper/status", get(scraper::status))
        .route("/scraper/logs", get(scraper::logs))
        .route("/scraper/cleanup", delete(scraper::cleanup))
        // Progress stream
        .route("/ws", get(ws::ws_handler))
        .route_layer(middleware::from_fn(metrics_middleware))
        .with_state(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
