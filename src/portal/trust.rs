//! Endpoint parsing and the local-only certificate trust exception
//!
//! The device portal serves a self-signed certificate. Accepting it is only
//! allowed when the endpoint is the headset itself (loopback) or a device on
//! the local network; every other host keeps full certificate validation.

use std::net::{IpAddr, Ipv4Addr};

use url::{Host, Url};

use crate::error::PortalError;

/// Parse and check a device portal base URL
pub fn parse_endpoint(raw: &str) -> Result<Url, PortalError> {
    let url = Url::parse(raw).map_err(|e| PortalError::InvalidEndpoint(format!("{raw}: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(PortalError::InvalidEndpoint(format!(
                "{raw}: unsupported scheme {other}"
            )))
        }
    }

    if url.host().is_none() {
        return Err(PortalError::InvalidEndpoint(format!("{raw}: missing host")));
    }

    Ok(url)
}

/// Whether the endpoint is loopback or on the local network
pub fn is_local_endpoint(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => is_local_v4(addr),
        Some(Host::Ipv6(addr)) => IpAddr::V6(addr).is_loopback(),
        None => false,
    }
}

fn is_local_v4(addr: Ipv4Addr) -> bool {
    addr.is_loopback() || addr.is_private() || addr.is_link_local()
}

/// Whether certificate validation may be relaxed for this endpoint
pub fn accepts_untrusted_certs(url: &Url) -> bool {
    url.scheme() == "https" && is_local_endpoint(url)
}
