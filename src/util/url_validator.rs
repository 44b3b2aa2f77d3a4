use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("Private address not allowed: {0}")]
    PrivateIp(IpAddr),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Checks a fetch URL before any request is made.
///
/// Only `http` and `https` pass. With `block_private_hosts` set, hosts that
/// name the local machine or a private, link-local or unspecified address
/// are refused too. Hostnames are not resolved.
pub fn validate_feed_url(url: &str, block_private_hosts: bool) -> Result<(), UrlValidationError> {
    let url = Url::parse(url)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlValidationError::UnsupportedScheme(url.scheme().to_owned()));
    }
    if !block_private_hosts {
        return Ok(());
    }

    let ip = match url.host() {
        Some(Host::Domain(domain)) if domain.eq_ignore_ascii_case("localhost") => {
            return Err(UrlValidationError::Localhost)
        }
        Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
        Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
        _ => return Ok(()),
    };

    if ip.is_loopback() {
        Err(UrlValidationError::Localhost)
    } else if is_internal(ip) {
        Err(UrlValidationError::PrivateIp(ip))
    } else {
        Ok(())
    }
}

fn is_internal(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        // fc00::/7 unique local, fe80::/10 link-local
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_unspecified() || first & 0xfe00 == 0xfc00 || first & 0xffc0 == 0xfe80
        }
    }
}
