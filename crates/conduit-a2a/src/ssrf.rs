//! Rejects agent card URLs that resolve to a private, loopback, or link-local address
//! (spec §4.6, a hard invariant).
//!
//! Adapted closely from `turbomcp-auth`'s `SsrfValidator`/`SsrfPolicy`: the IPv4/IPv6
//! classification predicates are reused almost verbatim since they are directly on-spec;
//! the cloud-metadata/redirect-allowlist machinery from the teacher's OAuth2-callback use
//! case is dropped since an A2A agent card URL has no redirect surface to protect against.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, ToSocketAddrs};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SsrfError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("scheme must be https, got '{0}'")]
    InvalidScheme(String),

    #[error("Private or local URLs are not allowed")]
    BlockedIpAddress(String),

    #[error("could not resolve hostname")]
    ResolutionFailed,
}

/// Validates that a URL is safe to fetch as an agent card / A2A endpoint: every address the
/// hostname resolves to must be public, and the scheme must be HTTPS.
///
/// Host resolution and classification run before the scheme check so a private/loopback
/// target (e.g. `http://localhost:8080`) is always reported as a blocked address rather than
/// a scheme mismatch — a non-https URL that also targets a private host is the more severe
/// finding and must not be masked by the cheaper scheme check.
pub fn validate_agent_url(url_str: &str) -> Result<Url, SsrfError> {
    let url = Url::parse(url_str).map_err(|e| SsrfError::InvalidUrl(e.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| SsrfError::InvalidUrl("missing host".into()))?;
    let port = url.port_or_known_default().unwrap_or(443);

    let addrs: Vec<IpAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|_| SsrfError::ResolutionFailed)?
        .map(|sa| sa.ip())
        .collect();
    if addrs.is_empty() {
        return Err(SsrfError::ResolutionFailed);
    }
    for ip in &addrs {
        validate_ip(*ip)?;
    }
    if url.scheme() != "https" {
        return Err(SsrfError::InvalidScheme(url.scheme().to_string()));
    }
    Ok(url)
}

fn validate_ip(ip: IpAddr) -> Result<(), SsrfError> {
    match ip {
        IpAddr::V4(v4) => validate_ipv4(v4),
        IpAddr::V6(v6) => validate_ipv6(v6),
    }
}

fn validate_ipv4(ip: Ipv4Addr) -> Result<(), SsrfError> {
    if ip.is_private()
        || ip.is_loopback()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        || ip.is_documentation()
    {
        return Err(SsrfError::BlockedIpAddress(ip.to_string()));
    }
    Ok(())
}

fn validate_ipv6(ip: Ipv6Addr) -> Result<(), SsrfError> {
    if ip.is_loopback() || ip.is_unspecified() {
        return Err(SsrfError::BlockedIpAddress(ip.to_string()));
    }
    let segments = ip.segments();
    let is_unique_local = segments[0] & 0xfe00 == 0xfc00;
    let is_link_local = segments[0] & 0xffc0 == 0xfe80;
    if is_unique_local || is_link_local {
        return Err(SsrfError::BlockedIpAddress(ip.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_http_scheme() {
        let err = validate_agent_url("http://example.com/card").unwrap_err();
        assert!(matches!(err, SsrfError::InvalidScheme(_)));
    }

    #[test]
    fn rejects_loopback_literal() {
        let err = validate_agent_url("https://127.0.0.1/card").unwrap_err();
        assert!(matches!(err, SsrfError::BlockedIpAddress(_)));
    }

    #[test]
    fn rejects_private_host_even_over_http() {
        let err = validate_agent_url("http://localhost:8080").unwrap_err();
        assert!(matches!(err, SsrfError::BlockedIpAddress(_)));
        assert_eq!(err.to_string(), "Private or local URLs are not allowed");
    }

    #[test]
    fn rejects_rfc1918_literal() {
        let err = validate_agent_url("https://10.0.0.5/card").unwrap_err();
        assert!(matches!(err, SsrfError::BlockedIpAddress(_)));
    }

    #[test]
    fn rejects_link_local_literal() {
        let err = validate_agent_url("https://169.254.169.254/card").unwrap_err();
        assert!(matches!(err, SsrfError::BlockedIpAddress(_)));
    }

    #[test]
    fn rejects_ipv6_loopback() {
        let err = validate_agent_url("https://[::1]/card").unwrap_err();
        assert!(matches!(err, SsrfError::BlockedIpAddress(_)));
    }

    #[test]
    fn ipv4_classification_matches_rfc1918_boundaries() {
        assert!(validate_ipv4(Ipv4Addr::new(172, 15, 0, 1)).is_ok());
        assert!(validate_ipv4(Ipv4Addr::new(172, 16, 0, 1)).is_err());
        assert!(validate_ipv4(Ipv4Addr::new(172, 31, 255, 255)).is_err());
        assert!(validate_ipv4(Ipv4Addr::new(172, 32, 0, 1)).is_ok());
    }
}
