//! The HTTP surface (spec §6): a thin router over the core engine, read-
//! only and JSON. Per spec §9 this crate holds no business logic of its
//! own beyond request validation — everything interesting lives in
//! `common`.
use api_state::ApiState;
use axum::{
    extract::FromRef,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use routes::{
    analyze::analyze,
    health::health,
    search::search,
    stats::{stats, stats_stream},
};
use tower_http::trace::TraceLayer;

pub mod api_state;
pub mod error;
pub mod middleware;
mod routes;
pub mod youtube;

/// Router for the retrieval/ingestion engine's HTTP surface, version 1.
pub fn api_routes_v1<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route("/youtube/analyze", post(analyze))
        .route("/cache/search", post(search))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/stats/stream", get(stats_stream))
        .layer(from_fn_with_state(
            app_state.clone(),
            middleware::observe_request,
        ))
        .layer(TraceLayer::new_for_http())
}
