use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::error::GatewayError;

/// Check if an IPv4 address is private, loopback, or otherwise non-routable.
pub fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()          // 127.0.0.0/8
        || ip.is_private()    // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
        || ip.is_link_local() // 169.254.0.0/16
        || ip.is_broadcast()  // 255.255.255.255
        || ip.is_unspecified() // 0.0.0.0
        || ip.octets()[0] == 100 && (ip.octets()[1] & 0xC0) == 64 // 100.64.0.0/10 (CGNAT)
}

/// Check if an IPv6 address is private, loopback, or otherwise non-routable.
pub fn is_private_ipv6(ip: &Ipv6Addr) -> bool {
    ip.is_loopback()       // ::1
        || ip.is_unspecified() // ::
        || {
            let segments = ip.segments();
            // fc00::/7 (unique local)
            (segments[0] & 0xFE00) == 0xFC00
            // fe80::/10 (link-local)
            || (segments[0] & 0xFFC0) == 0xFE80
            || match ip.to_ipv4_mapped() {
                Some(v4) => is_private_ipv4(&v4),
                None => false,
            }
        }
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_ipv4(v4),
        IpAddr::V6(v6) => is_private_ipv6(v6),
    }
}

fn refuse(reason: &str) -> GatewayError {
    GatewayError::UpstreamUnavailable(format!("origin refused: {reason}"))
}

/// Reject origins whose host is literally private (an IP or a local name).
pub fn check_origin_host(url: &Url) -> Result<(), GatewayError> {
    match url.host() {
        Some(Host::Ipv4(ip)) if is_private_ipv4(&ip) => Err(refuse("private IPv4 address")),
        Some(Host::Ipv6(ip)) if is_private_ipv6(&ip) => Err(refuse("private IPv6 address")),
        Some(Host::Domain(domain)) => {
            let domain = domain.to_ascii_lowercase();
            if domain == "localhost"
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
            {
                Err(refuse("local hostname"))
            } else {
                Ok(())
            }
        }
        Some(_) => Ok(()),
        None => Err(refuse("no host")),
    }
}

/// Full origin policy: literal host check, then every resolved address.
pub async fn ensure_public_origin(url: &Url) -> Result<(), GatewayError> {
    check_origin_host(url)?;

    let Some(Host::Domain(domain)) = url.host() else {
        return Ok(());
    };
    let port = url.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((domain, port)).await.map_err(|e| {
        tracing::warn!(host = %domain, error = %e, "origin DNS resolution failed");
        refuse("DNS resolution failed")
    })?;

    for addr in addrs {
        if is_private_ip(&addr.ip()) {
            tracing::warn!(host = %domain, ip = %addr.ip(), "origin resolves to a private address");
            return Err(refuse("resolves to a private address"));
        }
    }

    Ok(())
}
