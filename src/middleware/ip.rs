//! Client IP resolution for per-client rate limiting.
//!
//! The client is identified by the TCP peer address, taken from Axum's
//! `ConnectInfo<SocketAddr>` extension. Forwarding headers are ignored unless
//! the peer itself sits inside a configured trusted-proxy CIDR range; only
//! then is the first `X-Forwarded-For` entry (or `X-Real-IP`) used.
//!
//! # Deployment
//!
//! Behind a reverse proxy, set `TRUSTED_PROXIES` to the proxy network and
//! configure the proxy to overwrite, not append to, the forwarding headers:
//!
//! ```nginx
//! proxy_set_header X-Real-IP $remote_addr;
//! proxy_set_header X-Forwarded-For $remote_addr;
//! ```
//!
//! Without `TRUSTED_PROXIES` a client cannot choose its own rate limit key
//! by sending a spoofed header.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ClientIpError {
    /// The server was not started with connect info, so the peer is unknown.
    #[error("peer address missing from request")]
    MissingPeerAddress,
}

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse CIDR notation ("10.0.0.0/8", "::1/128") or a bare address.
    ///
    /// Returns `None` if the format is invalid.
    pub fn parse(cidr: &str) -> Option<Self> {
        let cidr = cidr.trim();
        let (addr, prefix) = match cidr.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr, None),
        };

        let network: IpAddr = addr.parse().ok()?;
        let max_prefix = if network.is_ipv4() { 32 } else { 128 };
        let prefix_len = match prefix {
            Some(p) => p.parse::<u8>().ok().filter(|p| *p <= max_prefix)?,
            None => max_prefix,
        };

        Some(Self {
            network,
            prefix_len,
        })
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX
                    .checked_shl(32 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX
                    .checked_shl(128 - u32::from(self.prefix_len))
                    .unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            // Mixed families never match
            _ => false,
        }
    }
}

/// Networks whose forwarding headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Build from CIDR strings; invalid entries are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy ranges configured");
        }

        Self { ranges }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// Whether `ip` belongs to a trusted proxy. Nothing is trusted when no
    /// ranges are configured.
    pub fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.ranges.iter().any(|range| range.contains(ip))
    }
}

// =============================================================================
// Extraction
// =============================================================================

/// Where a resolved client address came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpSource {
    Peer,
    ForwardedFor,
    RealIp,
}

fn header_str<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers().get(name).and_then(|v| v.to_str().ok())
}

/// First address named by the forwarding headers, if any parses.
fn forwarded_ip<B>(req: &Request<B>) -> Option<(IpAddr, IpSource)> {
    // "client, proxy1, proxy2": the client is first
    if let Some(ip) = header_str(req, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse().ok())
    {
        return Some((ip, IpSource::ForwardedFor));
    }

    header_str(req, "x-real-ip")
        .and_then(|v| v.trim().parse().ok())
        .map(|ip| (ip, IpSource::RealIp))
}

/// Resolve the client address of `req`.
///
/// # Errors
///
/// `ClientIpError::MissingPeerAddress` when no `ConnectInfo` is attached.
pub fn client_ip<B>(
    req: &Request<B>,
    trusted: &TrustedProxyConfig,
) -> Result<(IpAddr, IpSource), ClientIpError> {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .ok_or(ClientIpError::MissingPeerAddress)?;

    if trusted.is_trusted(&peer) {
        if let Some((ip, source)) = forwarded_ip(req) {
            return Ok((ip, source));
        }
        debug!(peer = %peer, "Trusted proxy sent no usable forwarding header");
    } else if req.headers().contains_key("x-forwarded-for") {
        debug!(peer = %peer, "Ignoring X-Forwarded-For from untrusted peer");
    }

    Ok((peer, IpSource::Peer))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn request_from(peer: &str, headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut req = builder.body(()).unwrap();
        let addr: SocketAddr = peer.parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(addr));
        req
    }

    #[test]
    fn test_cidr_parse() {
        assert_eq!(CidrRange::parse("10.0.0.0/8").unwrap().prefix_len, 8);
        assert_eq!(CidrRange::parse("::1/128").unwrap().prefix_len, 128);
        assert_eq!(CidrRange::parse("192.168.1.1").unwrap().prefix_len, 32);
        assert!(CidrRange::parse("not-an-ip").is_none());
        assert!(CidrRange::parse("10.0.0.0/33").is_none());
    }

    #[test]
    fn test_cidr_contains() {
        let cidr = CidrRange::parse("192.168.1.0/24").unwrap();
        assert!(cidr.contains(&"192.168.1.254".parse().unwrap()));
        assert!(!cidr.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!cidr.contains(&"::1".parse().unwrap()));

        let everything = CidrRange::parse("0.0.0.0/0").unwrap();
        assert!(everything.contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_empty_config_trusts_nobody() {
        let config = TrustedProxyConfig::new(&[]);
        assert!(!config.is_enabled());
        assert!(!config.is_trusted(&"10.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_peer_address_used_by_default() {
        let req = request_from("203.0.113.9:5555", &[("x-forwarded-for", "1.2.3.4")]);
        let (ip, source) = client_ip(&req, &TrustedProxyConfig::default()).unwrap();
        assert_eq!(ip, "203.0.113.9".parse::<IpAddr>().unwrap());
        assert_eq!(source, IpSource::Peer);
    }

    #[test]
    fn test_forwarded_for_honored_from_trusted_proxy() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
        let req = request_from(
            "10.1.2.3:443",
            &[("x-forwarded-for", "198.51.100.7, 10.1.2.3")],
        );

        let (ip, source) = client_ip(&req, &trusted).unwrap();
        assert_eq!(ip, "198.51.100.7".parse::<IpAddr>().unwrap());
        assert_eq!(source, IpSource::ForwardedFor);
    }

    #[test]
    fn test_real_ip_fallback_from_trusted_proxy() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
        let req = request_from(
            "10.1.2.3:443",
            &[("x-forwarded-for", "garbage"), ("x-real-ip", "198.51.100.8")],
        );

        let (ip, source) = client_ip(&req, &trusted).unwrap();
        assert_eq!(ip, "198.51.100.8".parse::<IpAddr>().unwrap());
        assert_eq!(source, IpSource::RealIp);
    }

    #[test]
    fn test_missing_connect_info_is_an_error() {
        let req = Request::builder().uri("/").body(()).unwrap();
        assert_eq!(
            client_ip(&req, &TrustedProxyConfig::default()).unwrap_err(),
            ClientIpError::MissingPeerAddress
        );
    }
}
