//! `host:port` parsing for both ends of the transport.

use std::net::{SocketAddr, SocketAddrV4};

use crate::error::{Result, TransportError};

/// Resolve a sender target. Any IPv4 destination is accepted (a unicast
/// target is handy for tests and point-to-point links).
///
/// Literals are parsed directly; host names go through the async resolver.
pub async fn resolve_target(addr: &str) -> Result<SocketAddrV4> {
    if let Ok(literal) = addr.parse::<SocketAddrV4>() {
        return Ok(literal);
    }
    let resolved = tokio::net::lookup_host(addr).await.map_err(|e| TransportError::InvalidAddress {
        addr: addr.to_string(),
        reason: e.to_string(),
    })?;
    resolved
        .filter_map(|a| match a {
            SocketAddr::V4(v4) => Some(v4),
            SocketAddr::V6(_) => None,
        })
        .next()
        .ok_or_else(|| TransportError::InvalidAddress {
            addr: addr.to_string(),
            reason: "no IPv4 address".into(),
        })
}

/// Parse a receiver group address: an IPv4 multicast literal with a port.
pub fn parse_group(addr: &str) -> Result<SocketAddrV4> {
    let group: SocketAddrV4 = addr.parse().map_err(|_| TransportError::InvalidAddress {
        addr: addr.to_string(),
        reason: "expected IPv4 group:port".into(),
    })?;
    if !group.ip().is_multicast() {
        return Err(TransportError::InvalidAddress {
            addr: addr.to_string(),
            reason: "not a multicast address".into(),
        });
    }
    Ok(group)
}
