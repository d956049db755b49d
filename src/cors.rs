//! CORS (Cross-Origin Resource Sharing) configuration for the Civipay daemon.
//!
//! The webhook endpoint is called server-to-server by the payment provider
//! and never involves a browser, so CORS does not apply to it. What CORS does
//! gate is the operational surface (`/status`, `/metrics`): local dashboards
//! poll those from browser JavaScript, and the policy here restricts that to
//! localhost origins only.
//!
//! # Security Policy
//!
//! - **Allowed Origins**: Only `localhost`, `127.0.0.1`, and `[::1]` on any port
//! - **Allowed Methods**: GET, POST, OPTIONS (preflight)
//! - **Allowed Headers**: Content-Type, Authorization, and the signature header
//! - **Max Age**: 3600 seconds (1 hour) for preflight caching
//!
//! # Example
//!
//! ```rust,ignore
//! use civipay::cors::cors_layer;
//! use axum::Router;
//!
//! let app = Router::new()
//!     .route("/status", get(status_handler))
//!     .layer(cors_layer());
//! ```

use http::header::{HeaderName, HeaderValue};
use http::Method;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::webhook::handler::SIGNATURE_HEADER;

/// Request headers a browser client may send.
///
/// The signature header is included so a local replay tool served from
/// localhost can post captured deliveries at the webhook endpoint.
pub const ALLOWED_HEADERS: [HeaderName; 3] = [
    http::header::CONTENT_TYPE,
    http::header::AUTHORIZATION,
    HeaderName::from_static(SIGNATURE_HEADER),
];

/// Methods the daemon serves.
pub const ALLOWED_METHODS: [Method; 3] = [Method::GET, Method::POST, Method::OPTIONS];

/// Default max age for preflight cache (1 hour)
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// Creates a strict CORS layer that only allows localhost origins.
///
/// # Security Properties
///
/// - Only allows requests from `http(s)://localhost:*`, `http(s)://127.0.0.1:*`,
///   and `http(s)://[::1]:*`
/// - Blocks all external origins including other private IP ranges
/// - Properly handles preflight OPTIONS requests
/// - Does not expose credentials
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(|origin, _| {
            is_localhost_origin(origin)
        }))
        .allow_methods(ALLOWED_METHODS)
        .allow_headers(ALLOWED_HEADERS)
        .max_age(Duration::from_secs(DEFAULT_MAX_AGE_SECS))
}

/// Checks if the given origin is a localhost origin.
///
/// # Valid Origins
///
/// - `http://localhost` (any port)
/// - `http://127.0.0.1` (any port)
/// - `http://[::1]` (any port)
/// - The `https` variants of all three
///
/// # Invalid Origins
///
/// - External domains (e.g., `http://example.com`)
/// - Lookalike hosts (e.g., `http://localhost.evil.com`)
/// - Other private IPs (e.g., `http://192.168.1.1`)
/// - Non-HTTP schemes (`ftp://`, `file://`)
///
/// # Example
///
/// ```rust
/// use http::header::HeaderValue;
/// use civipay::cors::is_localhost_origin;
///
/// let origin = HeaderValue::from_static("http://localhost:3000");
/// assert!(is_localhost_origin(&origin));
///
/// let external = HeaderValue::from_static("http://example.com");
/// assert!(!is_localhost_origin(&external));
/// ```
pub fn is_localhost_origin(origin: &HeaderValue) -> bool {
    let Ok(origin_str) = origin.to_str() else {
        return false;
    };
    let origin_lower = origin_str.to_lowercase();

    // Origin format: scheme://host[:port][/path]
    let rest = if let Some(rest) = origin_lower.strip_prefix("https://") {
        rest
    } else if let Some(rest) = origin_lower.strip_prefix("http://") {
        rest
    } else {
        return false;
    };

    let authority = match rest.find('/') {
        Some(idx) => &rest[..idx],
        None => rest,
    };

    let Some((host, port)) = split_host_port(authority) else {
        return false;
    };

    if !matches!(host, "localhost" | "127.0.0.1" | "[::1]") {
        return false;
    }

    match port {
        None => true,
        // Port zero is never a listening socket
        Some(port) => port.parse::<u16>().map(|p| p > 0).unwrap_or(false),
    }
}

/// Splits an authority into host and optional port.
///
/// Returns `None` for malformed authorities such as trailing garbage after a
/// bracketed IPv6 literal.
fn split_host_port(authority: &str) -> Option<(&str, Option<&str>)> {
    // Bracketed IPv6 literals keep their colons inside the brackets.
    if authority.starts_with('[') {
        let end = authority.find(']')?;
        let host = &authority[..=end];
        let rest = &authority[end + 1..];
        if rest.is_empty() {
            return Some((host, None));
        }
        return rest.strip_prefix(':').map(|port| (host, Some(port)));
    }

    Some(match authority.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== Localhost Origin Tests ====================

    #[test]
    fn test_localhost_origin_http() {
        let origin = HeaderValue::from_static("http://localhost");
        assert!(
            is_localhost_origin(&origin),
            "http://localhost should be allowed"
        );
    }

    #[test]
    fn test_localhost_origin_https() {
        let origin = HeaderValue::from_static("https://localhost");
        assert!(
            is_localhost_origin(&origin),
            "https://localhost should be allowed"
        );
    }

    #[test]
    fn test_localhost_origin_with_port() {
        let origin = HeaderValue::from_static("http://localhost:3000");
        assert!(
            is_localhost_origin(&origin),
            "http://localhost:3000 should be allowed"
        );
    }

    #[test]
    fn test_localhost_origin_with_port_and_path() {
        let origin = HeaderValue::from_static("http://localhost:9100/status");
        assert!(
            is_localhost_origin(&origin),
            "http://localhost:9100/status should be allowed"
        );
    }

    #[test]
    fn test_loopback_origin_with_port() {
        let origin = HeaderValue::from_static("http://127.0.0.1:8787");
        assert!(
            is_localhost_origin(&origin),
            "http://127.0.0.1:8787 should be allowed"
        );
    }

    #[test]
    fn test_ipv6_localhost_origin() {
        let origin = HeaderValue::from_static("http://[::1]");
        assert!(
            is_localhost_origin(&origin),
            "http://[::1] should be allowed"
        );
    }

    #[test]
    fn test_ipv6_localhost_origin_with_port() {
        let origin = HeaderValue::from_static("https://[::1]:8080");
        assert!(
            is_localhost_origin(&origin),
            "https://[::1]:8080 should be allowed"
        );
    }

    // ==================== External Origin Tests (Should Block) ====================

    #[test]
    fn test_external_origin_blocked() {
        let origin = HeaderValue::from_static("http://example.com");
        assert!(
            !is_localhost_origin(&origin),
            "http://example.com should be blocked"
        );
    }

    #[test]
    fn test_localhost_subdomain_attack_blocked() {
        let origin = HeaderValue::from_static("http://localhost.evil.com");
        assert!(
            !is_localhost_origin(&origin),
            "http://localhost.evil.com should be blocked (lookalike host)"
        );
    }

    #[test]
    fn test_localhost_prefix_host_blocked() {
        let origin = HeaderValue::from_static("http://localhostevil.com");
        assert!(
            !is_localhost_origin(&origin),
            "http://localhostevil.com should be blocked"
        );
    }

    #[test]
    fn test_private_ip_blocked() {
        let origin = HeaderValue::from_static("http://192.168.1.1");
        assert!(
            !is_localhost_origin(&origin),
            "http://192.168.1.1 should be blocked"
        );
    }

    #[test]
    fn test_other_loopback_address_blocked() {
        let origin = HeaderValue::from_static("http://127.0.0.2:8080");
        assert!(
            !is_localhost_origin(&origin),
            "http://127.0.0.2:8080 should be blocked"
        );
    }

    // ==================== Invalid Format Tests ====================

    #[test]
    fn test_no_scheme_blocked() {
        let origin = HeaderValue::from_static("localhost:3000");
        assert!(
            !is_localhost_origin(&origin),
            "localhost:3000 (no scheme) should be blocked"
        );
    }

    #[test]
    fn test_ftp_scheme_blocked() {
        let origin = HeaderValue::from_static("ftp://localhost");
        assert!(
            !is_localhost_origin(&origin),
            "ftp://localhost should be blocked"
        );
    }

    #[test]
    fn test_invalid_port_blocked() {
        let origin = HeaderValue::from_static("http://localhost:notaport");
        assert!(
            !is_localhost_origin(&origin),
            "http://localhost:notaport should be blocked"
        );
    }

    #[test]
    fn test_port_zero_blocked() {
        let origin = HeaderValue::from_static("http://localhost:0");
        assert!(
            !is_localhost_origin(&origin),
            "http://localhost:0 should be blocked (invalid port)"
        );
    }

    #[test]
    fn test_ipv6_trailing_garbage_blocked() {
        let origin = HeaderValue::from_static("http://[::1]evil");
        assert!(
            !is_localhost_origin(&origin),
            "http://[::1]evil should be blocked"
        );
    }

    #[test]
    fn test_empty_origin_blocked() {
        let origin = HeaderValue::from_static("");
        assert!(
            !is_localhost_origin(&origin),
            "Empty origin should be blocked"
        );
    }

    // ==================== Edge Case Tests ====================

    #[test]
    fn test_case_insensitive_localhost() {
        let origin = HeaderValue::from_static("HTTP://LOCALHOST:3000");
        assert!(
            is_localhost_origin(&origin),
            "HTTP://LOCALHOST:3000 should be allowed (case insensitive)"
        );
    }

    #[test]
    fn test_localhost_with_trailing_slash() {
        let origin = HeaderValue::from_static("http://localhost/");
        assert!(
            is_localhost_origin(&origin),
            "http://localhost/ should be allowed"
        );
    }

    #[test]
    fn test_common_dev_ports() {
        let ports = ["3000", "5000", "8000", "8080", "8787", "4200", "5173"];
        for port in ports {
            let origin_str = format!("http://localhost:{}", port);
            let origin = HeaderValue::from_str(&origin_str).unwrap();
            assert!(
                is_localhost_origin(&origin),
                "http://localhost:{} should be allowed",
                port
            );
        }
    }

    #[test]
    fn test_cors_layer_creation() {
        let layer = cors_layer();
        // Layer should be created without panicking
        let _ = format!("{:?}", layer);
    }

    #[test]
    fn test_signature_header_allowed() {
        assert!(ALLOWED_HEADERS
            .iter()
            .any(|h| h.as_str() == SIGNATURE_HEADER));
    }
}
