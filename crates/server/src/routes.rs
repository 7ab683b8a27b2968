//! Route configuration.

use crate::admission::admission_middleware;
use crate::handlers;
use crate::metrics::metrics_handler;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    // Only generation spends provider quota, so only it is admission controlled.
    let generate_routes = Router::new()
        .route("/api/generate", post(handlers::generate_image))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admission_middleware,
        ));

    let api_routes = Router::new()
        .route("/api/images/batch", post(handlers::get_images_batch))
        .route("/api/images/{id}", get(handlers::get_image))
        .route("/api/style-presets", get(handlers::list_style_presets))
        .route("/files/{*path}", get(handlers::get_file))
        // Health check (outside admission control for load balancers)
        .route("/health", get(handlers::health_check));

    let mut router = Router::new().merge(generate_routes).merge(api_routes);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    // See crate::metrics module documentation for details.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
