//! Outbound URL policy for network tools.
//!
//! Rules:
//! - Only `http` and `https` URLs are fetched
//! - Loopback, private, link-local, and cloud-metadata targets are blocked
//!   unless `allow_private` is set (SSRF prevention)
//! - If `allowed_endpoints` is non-empty and not `["*"]`, the URL must start
//!   with one of the listed prefixes

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use reqwest::Url;

#[derive(Debug, Clone, Default)]
pub struct UrlPolicy {
    allowed_endpoints: Vec<String>,
    allow_private: bool,
}

impl UrlPolicy {
    pub fn new(allowed_endpoints: Vec<String>, allow_private: bool) -> Self {
        Self {
            allowed_endpoints,
            allow_private,
        }
    }

    /// Static checks on the URL itself.
    pub fn check(&self, url: &Url) -> Result<(), String> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("scheme '{}' is not allowed", url.scheme()));
        }

        let Some(host) = url.host_str() else {
            return Err("URL has no host".into());
        };

        if !self.allow_private && is_private_host(host) {
            return Err(format!("request to private/internal host '{host}' blocked"));
        }

        if self.allowed_endpoints.is_empty() || self.allowed_endpoints.iter().any(|e| e == "*") {
            return Ok(());
        }

        if self.allowed_endpoints.iter().any(|e| url.as_str().starts_with(e.as_str())) {
            Ok(())
        } else {
            Err(format!(
                "URL '{url}' not in allowed endpoints ({} configured)",
                self.allowed_endpoints.len()
            ))
        }
    }

    /// Resolve the host and reject it if any address is internal.
    ///
    /// Catches public names that point at private ranges.
    pub async fn check_resolved(&self, url: &Url) -> Result<(), String> {
        if self.allow_private {
            return Ok(());
        }
        let Some(host) = url.host_str() else {
            return Err("URL has no host".into());
        };
        let port = url.port_or_known_default().unwrap_or(80);
        let host = host.trim_start_matches('[').trim_end_matches(']');

        let addrs = tokio::net::lookup_host((host, port))
            .await
            .map_err(|e| format!("cannot resolve '{host}': {e}"))?;
        for addr in addrs {
            if is_private_ip(&addr.ip()) {
                return Err(format!("'{host}' resolves to internal address {}", addr.ip()));
            }
        }
        Ok(())
    }

    pub fn allows_private(&self) -> bool {
        self.allow_private
    }
}

/// Check if a host name or literal targets an internal address.
pub fn is_private_host(host: &str) -> bool {
    let host = host.trim_start_matches('[').trim_end_matches(']').to_ascii_lowercase();

    if host == "localhost" || host.ends_with(".localhost") || host == "metadata.google.internal" {
        return true;
    }

    host.parse::<IpAddr>().is_ok_and(|ip| is_private_ip(&ip))
}

fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_v4(&mapped);
            }
            is_private_v6(v6)
        }
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local() // includes 169.254.169.254 metadata
        || ip.is_unspecified()
        || ip.is_broadcast()
        // 100.64.0.0/10 carrier-grade NAT
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64)
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80 // link local
}
