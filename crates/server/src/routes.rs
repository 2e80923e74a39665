//! Route configuration.

use crate::auth::{api_key_middleware, request_id_middleware};
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

/// Create the native API router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/store", post(handlers::store_blob))
        .route(
            "/api/file/{fingerprint}",
            get(handlers::get_blob).delete(handlers::delete_blob),
        )
        .route("/api/exists/{fingerprint}", get(handlers::blob_exists))
        // Uploads are streamed to disk, never buffered.
        .layer(DefaultBodyLimit::disable())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ));

    let mut router = Router::new().merge(api_routes);

    // Conditionally add metrics endpoint based on config.
    // When enabled, this endpoint should be network-restricted to the scraper.
    if state.config.server.metrics_enabled {
        let metrics_routes = Router::new().route("/metrics", get(metrics_handler));
        router = router.merge(metrics_routes);
    }

    // Order of execution: TraceLayer -> request ID -> API key -> Handler
    router
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the S3-compatible router.
pub fn create_s3_router(state: AppState) -> Router {
    crate::s3::router()
        .layer(middleware::from_fn(crate::s3::render_error_context))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
