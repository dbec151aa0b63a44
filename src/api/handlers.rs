use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::error::ApiError;
use super::extractors::ClientAddr;
use crate::analytics::aggregator::{DEFAULT_WINDOW_DAYS, MAX_WINDOW_DAYS};
use crate::analytics::{Aggregator, Recorder, StatsReport};
use crate::clock::Clock;
use crate::config::{Config, ProxyConfig};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::storage::CounterStore;

pub struct AppState {
    pub store: Arc<dyn CounterStore>,
    pub recorder: Recorder,
    pub aggregator: Aggregator,
    pub rate_limiter: RateLimiter,
    pub proxy: ProxyConfig,
}

impl AppState {
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        let rate_limit = RateLimitConfig {
            max_requests: config.rate_limit.max_requests,
            ..RateLimitConfig::default()
        };

        Self {
            recorder: Recorder::new(Arc::clone(&store), Arc::clone(&clock)),
            aggregator: Aggregator::new(Arc::clone(&store), Arc::clone(&clock)),
            rate_limiter: RateLimiter::new(Arc::clone(&store), clock, rate_limit),
            proxy: config.proxy.clone(),
            store,
        }
    }
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub days: Option<u32>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Record a beacon
pub async fn track(
    State(state): State<Arc<AppState>>,
    ClientAddr(address): ClientAddr,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    // Simple cross-site form posts cannot set this content type
    if !is_json_content_type(&headers) {
        return Err(ApiError::BadContentType);
    }

    if !state.rate_limiter.allow(&address).await? {
        return Err(ApiError::RateLimited);
    }

    let outcome = state.recorder.record_bytes(&body, &address).await?;
    if !outcome.is_accepted() {
        debug!(reason = outcome.reason(), size = body.len(), "beacon rejected");
        return Err(ApiError::Rejected(outcome));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Trailing-window report, most recent day first
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<StatsReport>, ApiError> {
    let days = query
        .days
        .unwrap_or(DEFAULT_WINDOW_DAYS)
        .clamp(1, MAX_WINDOW_DAYS);

    let report = state.aggregator.report(days).await?;
    info!(
        days,
        total_pageviews = report.total_pageviews,
        total_uniques = report.total_uniques,
        "served stats report"
    );
    Ok(Json(report))
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
    })
}

pub async fn not_found() -> ApiError {
    ApiError::NotFound
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}
