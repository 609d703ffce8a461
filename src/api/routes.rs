use axum::{
    routing::{delete, get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use super::handlers;
use super::AppState;
use crate::middleware::request_id::{make_span_with_request_id, UuidRequestId};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        // Genres
        .route("/genres/:kind", get(handlers::get_genres))
        .route("/genres/:kind/cache", delete(handlers::invalidate_genres))
        .route("/genres/:kind/sync", post(handlers::sync_genres))
        // Provider lists, resolved through the entity cache
        .route("/:kind/trending", get(handlers::trending))
        .route("/:kind/top-rated", get(handlers::top_rated))
        .route("/:kind/discover", get(handlers::discover))
        .route("/:kind/search", get(handlers::search))
        // Single entities
        .route("/:kind/:id", get(handlers::get_entity))
        .route("/:kind/:id/recommendations", get(handlers::recommendations));

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}
