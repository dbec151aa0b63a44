use axum::{
    body::Body,
    http::{header, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::time::Instant;

use super::error::ApiError;
use crate::analytics::bot::is_bot;

/// Refuse automated clients before any handler work happens
pub async fn reject_bots(request: Request<Body>, next: Next) -> Response {
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    if is_bot(user_agent) {
        tracing::debug!(user_agent = ?user_agent, "rejected automated client");
        return ApiError::Forbidden.into_response();
    }

    next.run(request).await
}

pub async fn log_request(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_owned();

    let response = next.run(request).await;

    tracing::debug!(
        %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_us = start.elapsed().as_micros() as u64,
        "request"
    );
    response
}
