//! IP helpers shared by the cluster probe and auto-registration identity matching.

use crate::core::domain::value_object::hostname_of;
use ipnet::IpNet;
use std::net::IpAddr;
use tokio::time::Duration;

const IPV4_PREFIXES: [u8; 3] = [24, 20, 16];
const IPV6_PREFIXES: [u8; 2] = [64, 48];

/// Returns the literal IP of a host URL, `None` when it names a DNS host.
pub fn extract_ip(host: &str) -> Option<IpAddr> {
    hostname_of(host).parse().ok()
}

/// Returns the literal IP of a host URL, or the first address its name resolves to.
///
/// Lookup failures and timeouts yield `None`.
pub async fn resolve_ip(host: &str, timeout: Duration) -> Option<IpAddr> {
    let name = hostname_of(host);
    if name.is_empty() {
        return None;
    }
    if let Ok(ip) = name.parse::<IpAddr>() {
        return Some(ip);
    }

    match tokio::time::timeout(timeout, tokio::net::lookup_host((name.as_str(), 0))).await {
        Ok(Ok(mut addrs)) => addrs.next().map(|addr| addr.ip()),
        Ok(Err(e)) => {
            tracing::debug!(host = %name, error = %e, "DNS resolution failed");
            None
        }
        Err(_) => {
            tracing::debug!(host = %name, "DNS resolution timed out");
            None
        }
    }
}

/// Two addresses share a network when they agree on an IPv4 /24, /20 or /16 prefix,
/// or on an IPv6 /64 or /48 prefix. Mixed families never match.
pub fn ips_on_same_network(a: IpAddr, b: IpAddr) -> bool {
    let (a, b) = (a.to_canonical(), b.to_canonical());
    let prefixes: &[u8] = if a.is_ipv4() {
        &IPV4_PREFIXES
    } else {
        &IPV6_PREFIXES
    };
    prefixes.iter().any(|&bits| {
        IpNet::new(a, bits).is_ok_and(|network| network.trunc().contains(&b))
    })
}
