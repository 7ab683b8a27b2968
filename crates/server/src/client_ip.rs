//! Client identity extraction.
//!
//! # Security Note
//!
//! X-Forwarded-For and X-Real-IP are NOT trusted by default, since any caller
//! could set them to dodge the per-client throttle. Configure
//! `admission.trusted_proxies` to enable header-based identity:
//!
//! - Empty list (default): only the direct connection IP is used
//! - List of IPs/CIDRs: headers trusted only when the peer is one of these
//! - ["*"]: headers trusted from all sources (NOT recommended for production)

use axum::{body::Body, extract::ConnectInfo, http::Request};
use ipnet::IpNet;
use std::{
    net::{IpAddr, SocketAddr},
    sync::atomic::{AtomicBool, Ordering},
};

/// Identity used when neither headers nor connection info are usable.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Which connection peers may speak for the client through forwarded headers.
#[derive(Clone, Debug)]
enum TrustedProxies {
    None,
    All,
    /// Single addresses are stored as host networks (/32 or /128).
    Networks(Vec<IpNet>),
}

impl TrustedProxies {
    fn from_config(proxies: &[String]) -> Self {
        if proxies.is_empty() {
            return Self::None;
        }
        if proxies.iter().any(|p| p == "*") {
            return Self::All;
        }
        Self::Networks(proxies.iter().filter_map(|p| parse_network(p)).collect())
    }

    fn is_trusted(&self, peer: &str) -> bool {
        match self {
            Self::None => false,
            Self::All => true,
            Self::Networks(networks) => peer
                .parse::<IpAddr>()
                .is_ok_and(|ip| networks.iter().any(|net| net.contains(&ip))),
        }
    }
}

fn parse_network(entry: &str) -> Option<IpNet> {
    let parsed = if entry.contains('/') {
        entry.parse::<IpNet>().map_err(|e| e.to_string())
    } else {
        entry
            .parse::<IpAddr>()
            .map(IpNet::from)
            .map_err(|e| e.to_string())
    };
    match parsed {
        Ok(net) => Some(net),
        Err(e) => {
            tracing::warn!(entry = %entry, error = %e, "Ignoring invalid trusted_proxies entry");
            None
        }
    }
}

/// Resolves the client identity of a request.
#[derive(Debug)]
pub struct ClientIpExtractor {
    trusted_proxies: TrustedProxies,
    connect_info_warned: AtomicBool,
}

impl ClientIpExtractor {
    pub fn new(trusted_proxies: &[String]) -> Self {
        Self {
            trusted_proxies: TrustedProxies::from_config(trusted_proxies),
            connect_info_warned: AtomicBool::new(false),
        }
    }

    /// Extract the client identity.
    ///
    /// Forwarded headers win only when the connection comes from a trusted
    /// proxy (or all proxies are trusted and connection info is missing).
    pub fn extract(&self, req: &Request<Body>) -> String {
        let connection_ip = extract_connection_ip(req);

        let trust_headers = match (&connection_ip, &self.trusted_proxies) {
            (None, TrustedProxies::All) => true,
            (None, _) => false,
            (Some(conn_ip), trusted) => trusted.is_trusted(conn_ip),
        };

        if trust_headers && let Some(forwarded_ip) = extract_forwarded_ip(req) {
            return forwarded_ip;
        }

        match connection_ip {
            Some(ip) => ip,
            None => {
                self.warn_connect_info_missing();
                UNKNOWN_CLIENT.to_string()
            }
        }
    }

    fn warn_connect_info_missing(&self) {
        if !self.connect_info_warned.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "ConnectInfo not available for admission. All clients will share the \
                 'unknown' identity. Serve with into_make_service_with_connect_info::<SocketAddr>() \
                 to throttle per client."
            );
        }
    }
}

/// Extract client IP address from forwarding headers.
fn extract_forwarded_ip(req: &Request<Body>) -> Option<String> {
    if let Some(forwarded) = req.headers().get("x-forwarded-for")
        && let Ok(s) = forwarded.to_str()
        && let Some(ip) = s.split(',').next()
        && !ip.trim().is_empty()
    {
        return Some(ip.trim().to_string());
    }

    if let Some(real_ip) = req.headers().get("x-real-ip")
        && let Ok(s) = real_ip.to_str()
        && !s.trim().is_empty()
    {
        return Some(s.trim().to_string());
    }

    None
}

/// Extract connection IP from request extensions (set by ConnectInfo).
fn extract_connection_ip(req: &Request<Body>) -> Option<String> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
}
