//! Request extractors.

use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::request::Parts,
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use super::handlers::AppState;
use crate::analytics::extract_client_ip;

/// Address recorded when neither proxy headers nor the socket identify the caller
pub const UNKNOWN_ADDRESS: &str = "0.0.0.0";

/// Caller's network address as a string, resolved through the proxy trust settings
#[derive(Debug, Clone)]
pub struct ClientAddr(pub String);

impl FromRequestParts<Arc<AppState>> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let socket_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        let address = extract_client_ip(&parts.headers, socket_ip, &state.proxy)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_string());

        Ok(ClientAddr(address))
    }
}
