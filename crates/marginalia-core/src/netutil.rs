//! Client IP resolution behind reverse proxies.
//!
//! Forwarding headers are only honored when the direct peer matches the
//! configured trusted-proxy list (plain IPs or CIDRs); otherwise the peer
//! address wins. This keeps X-Forwarded-For spoofing from untrusted
//! clients out of the stored records.

use ipnet::IpNet;
use std::net::{IpAddr, SocketAddr};

/// Parse a peer address that may be `ip:port` or a bare IP.
pub fn parse_peer_ip(remote: &str) -> Option<IpAddr> {
    let remote = remote.trim();
    if remote.is_empty() {
        return None;
    }
    if let Ok(addr) = remote.parse::<SocketAddr>() {
        return Some(addr.ip());
    }
    remote.parse::<IpAddr>().ok()
}

/// Whether the peer matches any trusted-proxy entry (IP or CIDR).
pub fn is_trusted_proxy(peer: IpAddr, trusted: &[String]) -> bool {
    trusted.iter().any(|raw| {
        let entry = raw.trim();
        if entry.is_empty() {
            return false;
        }
        if entry.contains('/') {
            entry
                .parse::<IpNet>()
                .map(|net| net.contains(&peer))
                .unwrap_or(false)
        } else {
            entry.parse::<IpAddr>().map(|ip| ip == peer).unwrap_or(false)
        }
    })
}

/// Resolve the client IP for a request.
///
/// If the direct peer is a trusted proxy, the first X-Forwarded-For hop is
/// preferred, then X-Real-IP; the peer itself is the fallback either way.
pub fn resolve_client_ip(
    peer: Option<IpAddr>,
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    trusted: &[String],
) -> Option<IpAddr> {
    let peer = peer?;

    if !is_trusted_proxy(peer, trusted) {
        return Some(peer);
    }

    if let Some(xff) = forwarded_for {
        if let Some(first) = xff.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return Some(ip);
            }
        }
    }

    if let Some(xri) = real_ip {
        if let Ok(ip) = xri.trim().parse::<IpAddr>() {
            return Some(ip);
        }
    }

    Some(peer)
}
