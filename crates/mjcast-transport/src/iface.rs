//! Network interface lookup for multicast membership.
//!
//! Multicast options address interfaces by their IPv4 address, so names are
//! resolved to the first IPv4 address the interface carries.

use std::net::{IpAddr, Ipv4Addr};

use crate::error::{Result, TransportError};

/// An interface usable for IPv4 multicast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MulticastInterface {
    pub name: String,
    pub addr: Ipv4Addr,
}

/// Resolve an interface name to its IPv4 address.
pub fn resolve(name: &str) -> Result<MulticastInterface> {
    let ifaces = if_addrs::get_if_addrs().map_err(TransportError::Socket)?;
    ipv4_interfaces(ifaces.iter().map(|i| (i.name.as_str(), i.ip(), i.is_loopback())), true)
        .into_iter()
        .find(|i| i.name == name)
        .ok_or_else(|| TransportError::UnknownInterface(name.to_string()))
}

/// Non-loopback interfaces with an IPv4 address, in system order.
///
/// Interfaces that are down or cannot do multicast simply fail the join and
/// the caller moves on to the next candidate.
pub fn candidates() -> Vec<MulticastInterface> {
    match if_addrs::get_if_addrs() {
        Ok(ifaces) => ipv4_interfaces(ifaces.iter().map(|i| (i.name.as_str(), i.ip(), i.is_loopback())), false),
        Err(e) => {
            tracing::warn!("interface enumeration failed: {}", e);
            Vec::new()
        }
    }
}

/// Keep the first IPv4 address per interface name.
fn ipv4_interfaces<'a>(
    addrs: impl Iterator<Item = (&'a str, IpAddr, bool)>,
    include_loopback: bool,
) -> Vec<MulticastInterface> {
    let mut out: Vec<MulticastInterface> = Vec::new();
    for (name, ip, loopback) in addrs {
        let IpAddr::V4(addr) = ip else { continue };
        if (loopback && !include_loopback) || out.iter().any(|i| i.name == name) {
            continue;
        }
        out.push(MulticastInterface { name: name.to_string(), addr });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_ipv4_filtering() {
        let raw = vec![
            ("lo", IpAddr::V4(Ipv4Addr::LOCALHOST), true),
            ("eth0", IpAddr::V6(Ipv6Addr::LOCALHOST), false),
            ("eth0", IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)), false),
            ("eth0", IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)), false),
            ("wlan0", IpAddr::V4(Ipv4Addr::new(172, 16, 0, 5)), false),
        ];
        let ifaces = ipv4_interfaces(raw.clone().into_iter(), false);
        assert_eq!(
            ifaces,
            vec![
                MulticastInterface { name: "eth0".into(), addr: Ipv4Addr::new(192, 168, 1, 10) },
                MulticastInterface { name: "wlan0".into(), addr: Ipv4Addr::new(172, 16, 0, 5) },
            ]
        );

        let with_lo = ipv4_interfaces(raw.into_iter(), true);
        assert_eq!(with_lo.len(), 3);
        assert_eq!(with_lo[0].name, "lo");
    }

    #[test]
    fn test_unknown_interface() {
        let err = resolve("no-such-iface-42").unwrap_err();
        assert!(matches!(err, TransportError::UnknownInterface(ref n) if n == "no-such-iface-42"));
        assert!(err.is_configuration());
    }
}
