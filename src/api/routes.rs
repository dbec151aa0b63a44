use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::CorsConfig;

use super::handlers::{health_check, not_found, stats, track, AppState};
use super::middleware::{log_request, reject_bots};

/// Raw request bodies above this are refused before parsing
pub const MAX_BODY_BYTES: usize = 16 * 1024;

pub fn create_api_router(state: Arc<AppState>, cors: &CorsConfig) -> Router {
    let api_routes = Router::new()
        .route(
            "/api/track",
            post(track)
                .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
                .fallback(not_found),
        )
        .route("/api/stats", get(stats).fallback(not_found))
        .route_layer(middleware::from_fn(reject_bots))
        .with_state(state);

    Router::new()
        .route("/health", get(health_check))
        .merge(api_routes)
        .fallback(not_found)
        .layer(middleware::from_fn(log_request))
        .layer(cors_layer(cors))
}

fn cors_layer(cors: &CorsConfig) -> CorsLayer {
    let origin = match cors
        .allowed_origin
        .as_deref()
        .and_then(|o| HeaderValue::from_str(o).ok())
    {
        // Only a matching request origin is echoed back
        Some(value) => AllowOrigin::list([value]),
        None => AllowOrigin::list(Vec::<HeaderValue>::new()),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(Duration::from_secs(86_400))
}
