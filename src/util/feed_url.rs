use std::net::IpAddr;

use thiserror::Error;
use url::{Host, Url};

/// Reasons a subscription URL is refused.
#[derive(Error, Debug)]
pub enum FeedUrlError {
    #[error("Invalid URL: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    /// Loopback, private, link-local or unspecified address.
    #[error("Local address not allowed: {0}")]
    LocalAddress(String),
}

/// Validates a URL before it is added to the subscription list.
///
/// Only `http`/`https` with a public host are accepted, so a subscription can
/// never make the fetcher request `localhost` or a private network.
pub fn validate_feed_url(raw: &str) -> Result<Url, FeedUrlError> {
    let url = Url::parse(raw.trim())?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(FeedUrlError::UnsupportedScheme(scheme.to_owned())),
    }

    let local = match url.host() {
        None => return Err(FeedUrlError::MissingHost),
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => is_local_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_local_ip(IpAddr::V6(ip)),
    };
    if local {
        return Err(FeedUrlError::LocalAddress(
            url.host_str().unwrap_or_default().to_owned(),
        ));
    }

    Ok(url)
}

/// Host component of `link`, if it parses as an absolute URL with a host.
pub fn host_of(link: &str) -> Option<String> {
    Url::parse(link.trim())
        .ok()
        .and_then(|url| url.host_str().map(str::to_owned))
        .filter(|host| !host.is_empty())
}

fn is_local_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_private() || v4.is_loopback() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local fc00::/7
                || (first & 0xffc0) == 0xfe80 // link-local fe80::/10
        }
    }
}
