//! Client IP extraction from HTTP headers with trust validation
//!
//! This module implements client address extraction that:
//! - Reads `CF-Connecting-IP` when running behind Cloudflare
//! - Walks `Forwarded` / `X-Forwarded-For` right to left, skipping trusted proxies
//! - Falls back to the socket remote address when headers are untrusted
//! - Handles both IPv4 and IPv6

use axum::http::HeaderMap;
use ipnet::IpNet;
use std::net::IpAddr;
use tracing::warn;

use crate::config::{ProxyConfig, TrustedProxyMode};

/// Extract the client IP address from HTTP headers
///
/// # Arguments
/// * `headers` - HTTP request headers
/// * `socket_addr` - The socket remote address, if the server recorded one
/// * `config` - Proxy trust settings
///
/// # Returns
/// The client IP address, or `None` when neither headers nor socket yield one
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: Option<IpAddr>,
    config: &ProxyConfig,
) -> Option<IpAddr> {
    match config.mode {
        TrustedProxyMode::Cloudflare => extract_cloudflare_ip(headers).or_else(|| {
            warn!("CF-Connecting-IP header missing in Cloudflare mode, using socket address");
            socket_addr
        }),
        TrustedProxyMode::Standard => extract_standard_ip(headers, config).or(socket_addr),
        TrustedProxyMode::None => socket_addr,
    }
}

/// Extract IP from Cloudflare-specific header
fn extract_cloudflare_ip(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("cf-connecting-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}

/// Extract IP from standard headers, preferring RFC 7239 `Forwarded`
fn extract_standard_ip(headers: &HeaderMap, config: &ProxyConfig) -> Option<IpAddr> {
    let chain = forwarded_chain(headers);
    if !chain.is_empty() {
        return pick_from_chain(&chain, config);
    }

    pick_from_chain(&x_forwarded_for_chain(headers), config)
}

/// `for=` parameters of every `Forwarded` element, left to right
fn forwarded_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("forwarded")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|element| {
            element.split(';').find_map(|param| {
                let (name, value) = param.trim().split_once('=')?;
                if !name.eq_ignore_ascii_case("for") {
                    return None;
                }
                parse_node(value.trim_matches('"'))
            })
        })
        .collect()
}

/// Node from a `Forwarded` value: `192.0.2.60`, `192.0.2.60:4711` or `[2001:db8::1]:4711`
fn parse_node(node: &str) -> Option<IpAddr> {
    if let Some(rest) = node.strip_prefix('[') {
        return rest.split(']').next()?.parse().ok();
    }
    if let Ok(ip) = node.parse() {
        return Some(ip);
    }
    node.rsplit_once(':')?.0.parse().ok()
}

fn x_forwarded_for_chain(headers: &HeaderMap) -> Vec<IpAddr> {
    headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|s| s.trim().parse::<IpAddr>().ok())
        .collect()
}

/// Choose the client from a proxy chain using right-to-left trust validation
fn pick_from_chain(ips: &[IpAddr], config: &ProxyConfig) -> Option<IpAddr> {
    if ips.is_empty() {
        return None;
    }

    // If num_trusted_proxies is specified, skip that many from the right
    if let Some(num_trusted) = config.num_trusted_proxies {
        if ips.len() > num_trusted {
            return Some(ips[ips.len() - num_trusted - 1]);
        }
        // Not enough IPs in chain, return the leftmost (least trusted)
        return ips.first().copied();
    }

    // First address from the right that is not one of our proxies
    if !config.trusted_proxies.is_empty() {
        return ips
            .iter()
            .rev()
            .find(|ip| !is_trusted(**ip, &config.trusted_proxies))
            .or_else(|| ips.first())
            .copied();
    }

    // No trust configuration, return the rightmost IP
    ips.last().copied()
}

fn is_trusted(ip: IpAddr, trusted: &[IpNet]) -> bool {
    trusted.iter().any(|net| net.contains(&ip))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn create_config(mode: TrustedProxyMode) -> ProxyConfig {
        ProxyConfig {
            mode,
            trusted_proxies: vec![],
            num_trusted_proxies: None,
        }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_extract_client_ip_none_mode() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.1"));
        let socket_addr = ip("192.168.1.1");
        let config = create_config(TrustedProxyMode::None);

        let result = extract_client_ip(&headers, Some(socket_addr), &config);
        assert_eq!(result, Some(socket_addr));
    }

    #[test]
    fn test_extract_cloudflare_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-connecting-ip", HeaderValue::from_static("203.0.113.1"));
        let config = create_config(TrustedProxyMode::Cloudflare);

        let result = extract_client_ip(&headers, Some(ip("192.168.1.1")), &config);
        assert_eq!(result, Some(ip("203.0.113.1")));
    }

    #[test]
    fn test_cloudflare_mode_without_header_uses_socket() {
        let config = create_config(TrustedProxyMode::Cloudflare);
        let result = extract_client_ip(&HeaderMap::new(), Some(ip("192.168.1.1")), &config);
        assert_eq!(result, Some(ip("192.168.1.1")));

        assert_eq!(extract_client_ip(&HeaderMap::new(), None, &config), None);
    }

    #[test]
    fn test_extract_x_forwarded_for_basic() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.1"),
        );
        let config = create_config(TrustedProxyMode::Standard);

        let result = extract_client_ip(&headers, Some(ip("192.168.1.1")), &config);
        // Should return rightmost IP in the absence of trust configuration
        assert_eq!(result, Some(ip("198.51.100.1")));
    }

    #[test]
    fn test_x_forwarded_for_skips_trusted_cidrs() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.7, 10.0.0.3"),
        );
        let mut config = create_config(TrustedProxyMode::Standard);
        config.trusted_proxies = vec![
            "10.0.0.0/8".parse().unwrap(),
            "198.51.100.0/24".parse().unwrap(),
        ];

        let result = extract_client_ip(&headers, Some(ip("10.0.0.1")), &config);
        assert_eq!(result, Some(ip("203.0.113.1")));
    }

    #[test]
    fn test_x_forwarded_for_hop_count() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.1, 198.51.100.7, 10.0.0.3"),
        );
        let mut config = create_config(TrustedProxyMode::Standard);
        config.num_trusted_proxies = Some(1);

        let result = extract_client_ip(&headers, None, &config);
        assert_eq!(result, Some(ip("198.51.100.7")));

        config.num_trusted_proxies = Some(5);
        let result = extract_client_ip(&headers, None, &config);
        assert_eq!(result, Some(ip("203.0.113.1")));
    }

    #[test]
    fn test_forwarded_header_preferred() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "forwarded",
            HeaderValue::from_static(r#"for="[2001:db8::17]:4711";proto=https, for=192.0.2.60:8080"#),
        );
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.1"));
        let mut config = create_config(TrustedProxyMode::Standard);
        config.num_trusted_proxies = Some(1);

        let result = extract_client_ip(&headers, None, &config);
        assert_eq!(result, Some(ip("2001:db8::17")));
    }

    #[test]
    fn test_standard_mode_without_headers_uses_socket() {
        let config = create_config(TrustedProxyMode::Standard);
        let result = extract_client_ip(&HeaderMap::new(), Some(ip("192.168.1.1")), &config);
        assert_eq!(result, Some(ip("192.168.1.1")));
    }
}
