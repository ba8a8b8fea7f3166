//! Caller identity resolution.
//!
//! Resolves the network source address with validation to prevent header
//! spoofing, then attaches the account from a session token when one is
//! present and valid. An invalid or expired token degrades to an anonymous
//! identity rather than failing the request, since uploads are allowed
//! without an account.

use std::net::{IpAddr, SocketAddr};

use axum::http::{header, HeaderMap};
use sharebin_core::models::IdentityContext;
use uuid::Uuid;

use crate::auth::jwt::{decode_token, TOKEN_COOKIE};
use crate::state::SecurityConfig;

/// Extract and validate the client IP from request headers.
///
/// When behind a load balancer or proxy, the X-Forwarded-For header contains
/// a chain of IP addresses. With `trusted_proxy_count` proxies in front, the
/// client is the entry just before the trusted tail of the chain. With no
/// trusted proxies, forwarded headers are spoofable and ignored entirely and
/// the socket address is authoritative.
pub fn extract_client_ip(
    headers: &HeaderMap,
    socket_addr: Option<&SocketAddr>,
    trusted_proxy_count: usize,
) -> String {
    if trusted_proxy_count > 0 {
        if let Some(forwarded_for) = headers.get("x-forwarded-for") {
            if let Ok(header_value) = forwarded_for.to_str() {
                let ip = extract_from_forwarded_for(header_value, trusted_proxy_count);
                if ip != "unknown" {
                    return ip;
                }
            }
        }

        // X-Real-IP carries a single IP set by some proxies
        if let Some(real_ip) = headers.get("x-real-ip") {
            if let Ok(header_value) = real_ip.to_str() {
                let trimmed = header_value.trim();
                if is_valid_ip(trimmed) {
                    return trimmed.to_string();
                }
            }
        }
    }

    // Fall back to direct socket address
    if let Some(addr) = socket_addr {
        return addr.ip().to_string();
    }

    "unknown".to_string()
}

/// Extract the client IP from an X-Forwarded-For chain of the form
/// `client, proxy1, proxy2, ...` given `trusted_proxy_count` trusted proxies
/// at the end of the chain.
fn extract_from_forwarded_for(header_value: &str, trusted_proxy_count: usize) -> String {
    let ips: Vec<&str> = header_value
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if ips.is_empty() {
        return "unknown".to_string();
    }

    if ips.len() <= trusted_proxy_count {
        // Chain shorter than the proxy tier: every hop is trusted, use the
        // last entry.
        let last_ip = ips.last().unwrap_or(&"");
        if is_valid_ip(last_ip) {
            return last_ip.to_string();
        }
        return "unknown".to_string();
    }

    // Client sits just before the trusted proxy tail
    let client_ip_pos = ips.len().saturating_sub(trusted_proxy_count + 1);
    let client_ip = ips.get(client_ip_pos).unwrap_or(&"");

    if is_valid_ip(client_ip) {
        return client_ip.to_string();
    }

    "unknown".to_string()
}

fn is_valid_ip(ip_str: &str) -> bool {
    ip_str.parse::<IpAddr>().is_ok()
}

/// Resolve the full caller identity for one request.
///
/// The result is captured once per transfer and carried with the session; it
/// is never re-derived mid-transfer.
pub fn resolve_identity(
    headers: &HeaderMap,
    socket_addr: Option<&SocketAddr>,
    security: &SecurityConfig,
) -> IdentityContext {
    let source_address = extract_client_ip(headers, socket_addr, security.trusted_proxy_count);

    let Some(token) = bearer_or_cookie_token(headers) else {
        return IdentityContext::anonymous(source_address);
    };

    match decode_token(&token, &security.jwt_secret) {
        Ok(claims) => match Uuid::parse_str(&claims.sub) {
            Ok(user_id) => IdentityContext::authenticated(source_address, user_id),
            Err(_) => {
                tracing::debug!("Session token subject is not a UUID, treating as anonymous");
                IdentityContext::anonymous(source_address)
            }
        },
        Err(e) => {
            tracing::debug!(error = %e, "Rejected session token, treating as anonymous");
            IdentityContext::anonymous(source_address)
        }
    }
}

/// Session token from the Authorization header, or from the session cookie
/// for browser clients.
fn bearer_or_cookie_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(token.trim().to_string());
            }
        }
    }

    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookies.split(';').map(str::trim).find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == TOKEN_COOKIE).then(|| value.trim().to_string())
    })
}
