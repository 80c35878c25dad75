//! Request-admission validation: URL scheme/shape, SSRF target guard,
//! output format parsing.
//!
//! Builds on `utils::url_utils::is_valid_url`'s scheme check, adding a
//! private/loopback/link-local/multicast target guard on top.

use std::net::IpAddr;

use crate::content_extractor::OutputFormat;
use crate::errors::ScrapeError;
use crate::utils::url_utils::is_valid_url;

const DANGEROUS_SUBSTRINGS: &[&str] = &["javascript:", "data:", "file:", "vbscript:"];

/// Syntactic + scheme validation, matching `is_valid_url` plus an
/// explicit dangerous-substring rejection (e.g. `javascript:alert('x')`
/// must be a 422, not a crash).
pub fn validate_url_shape(url: &str) -> Result<(), ScrapeError> {
    let lower = url.to_lowercase();
    if DANGEROUS_SUBSTRINGS.iter().any(|s| lower.starts_with(s)) {
        return Err(ScrapeError::DisallowedTarget(url.to_string()));
    }
    if !is_valid_url(url) {
        return Err(ScrapeError::InvalidUrl(url.to_string()));
    }
    Ok(())
}

/// Resolve `url`'s host and reject private/loopback/link-local/multicast
/// targets. Resolution failures are treated as invalid rather than
/// allowed through, since an unresolvable host can't be fetched anyway.
pub async fn validate_target(url: &str) -> Result<(), ScrapeError> {
    let parsed = url::Url::parse(url).map_err(|_| ScrapeError::InvalidUrl(url.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| ScrapeError::InvalidUrl(url.to_string()))?;
    let port = parsed.port_or_known_default().unwrap_or(443);

    if let Ok(ip) = host.parse::<IpAddr>() {
        return reject_if_disallowed(ip, url);
    }

    match tokio::net::lookup_host((host, port)).await {
        Ok(addrs) => {
            for addr in addrs {
                reject_if_disallowed(addr.ip(), url)?;
            }
            Ok(())
        }
        Err(_) => Err(ScrapeError::InvalidUrl(format!("could not resolve host: {host}"))),
    }
}

fn reject_if_disallowed(ip: IpAddr, url: &str) -> Result<(), ScrapeError> {
    let disallowed = match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_multicast() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_multicast() || v6.is_unspecified(),
    };
    if disallowed {
        Err(ScrapeError::DisallowedTarget(url.to_string()))
    } else {
        Ok(())
    }
}

/// Parse the requested output format, surfacing an "unsupported output
/// format" error kind rather than a generic parse error.
pub fn parse_output_format(raw: &str) -> Result<OutputFormat, ScrapeError> {
    raw.parse().map_err(|_| ScrapeError::UnsupportedFormat(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_javascript_scheme() {
        assert!(matches!(
            validate_url_shape("javascript:alert('x')"),
            Err(ScrapeError::DisallowedTarget(_))
        ));
    }

    #[test]
    fn accepts_https_url() {
        assert!(validate_url_shape("https://example.com/page").is_ok());
    }

    #[test]
    fn rejects_empty_url() {
        assert!(matches!(validate_url_shape(""), Err(ScrapeError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn rejects_loopback_ip_literal() {
        assert!(matches!(
            validate_target("http://127.0.0.1/admin").await,
            Err(ScrapeError::DisallowedTarget(_))
        ));
    }

    #[tokio::test]
    async fn rejects_private_ip_literal() {
        assert!(matches!(
            validate_target("http://10.0.0.5/").await,
            Err(ScrapeError::DisallowedTarget(_))
        ));
    }

    #[test]
    fn parses_known_format() {
        assert_eq!(parse_output_format("markdown").unwrap(), OutputFormat::Markdown);
    }

    #[test]
    fn rejects_unknown_format() {
        assert!(matches!(parse_output_format("yaml"), Err(ScrapeError::UnsupportedFormat(_))));
    }
}
