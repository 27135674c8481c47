pub mod health;
pub use self::health::health;

pub mod user_login;
pub use self::user_login::login;

// common functions for the handlers
use axum::http::HeaderMap;
use std::net::{IpAddr, SocketAddr};

/// How the caller address of a request is resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientAddress {
    pub trust_proxy_headers: bool,
}

impl ClientAddress {
    /// Resolve the caller address. With proxy headers trusted, the last
    /// `x-forwarded-for` entry wins, then `x-real-ip`, then the socket peer.
    ///
    /// Only the last hop was written by the trusted proxy; earlier entries are
    /// whatever the client sent.
    #[must_use]
    pub fn resolve(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
        if self.trust_proxy_headers {
            let forwarded =
                forwarded_for(headers).or_else(|| ip_from_header("x-real-ip", headers));
            if forwarded.is_some() {
                return forwarded;
            }
        }
        peer.map(|addr| addr.ip())
    }
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|hv| hv.to_str().ok())
        .and_then(|value| value.rsplit(',').next())
        .and_then(|last| last.trim().parse::<IpAddr>().ok())
}

fn ip_from_header(header: &str, headers: &HeaderMap) -> Option<IpAddr> {
    headers
        .get(header)
        .and_then(|hv| hv.to_str().ok())
        .and_then(|s| s.trim().parse::<IpAddr>().ok())
}
