//! URL 验证模块
//!
//! Creation-time and redirect-time predicates. Both return `InvalidUrl` on
//! rejection; the creation pipeline calls them before any store access.

use std::net::IpAddr;

use tracing::{debug, warn};
use url::Url;

use crate::config::{RedirectValidationConfig, UrlValidationConfig};
use crate::errors::{LinkcutError, Result};

/// Reject obviously malformed or dangerous raw input.
///
/// Checks, in order: blank input, length bound, forbidden scheme prefixes,
/// protocol-relative form.
pub fn validate_raw_url(config: &UrlValidationConfig, raw: &str) -> Result<()> {
    let trimmed = raw.trim();

    if trimmed.is_empty() {
        return Err(LinkcutError::invalid_url("URL cannot be empty"));
    }

    if trimmed.len() > config.max_length {
        return Err(LinkcutError::invalid_url(format!(
            "URL exceeds maximum length of {} characters",
            config.max_length
        )));
    }

    let lower = trimmed.to_lowercase();
    for scheme in &config.forbidden_schemes {
        if lower.starts_with(&format!("{}:", scheme.to_lowercase())) {
            return Err(LinkcutError::invalid_url(format!(
                "URL scheme '{}' is not allowed",
                scheme
            )));
        }
    }

    if trimmed.starts_with("//") {
        return Err(LinkcutError::invalid_url(
            "Protocol-relative URLs are not allowed",
        ));
    }

    Ok(())
}

/// Normalize a raw URL to its canonical stored form.
///
/// A bare host gets an `https://` prefix; anything else must already be
/// http(s). The host must be present and well-formed; the path length is
/// bounded like the whole URL.
pub fn normalize_url(config: &UrlValidationConfig, raw: &str) -> Result<String> {
    let mut normalized = raw.trim().to_string();

    if !normalized.starts_with("http://") && !normalized.starts_with("https://") {
        if normalized.contains("://") {
            return Err(LinkcutError::invalid_url(
                "Only http and https schemes are allowed",
            ));
        }
        normalized = format!("https://{}", normalized);
    }

    let parsed = Url::parse(&normalized)
        .map_err(|e| LinkcutError::invalid_url(format!("Invalid URL format: {}", e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(LinkcutError::invalid_url(format!(
                "URL must have http or https scheme, got '{}'",
                other
            )));
        }
    }

    let host = parsed
        .host_str()
        .ok_or_else(|| LinkcutError::invalid_url("URL must have a valid host"))?;
    if host.is_empty() {
        return Err(LinkcutError::invalid_url("URL must have a valid host"));
    }
    if host.contains("..") || host.contains("//") {
        return Err(LinkcutError::invalid_url("Invalid host format"));
    }

    if parsed.path().len() > config.max_length {
        return Err(LinkcutError::invalid_url("URL path exceeds maximum length"));
    }

    Ok(normalized)
}

/// Creation-time hook: reject private or local destinations.
pub fn validate_normalized_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url)
        .map_err(|e| LinkcutError::invalid_url(format!("Invalid URL format: {}", e)))?;

    let host = parsed
        .host_str()
        .ok_or_else(|| LinkcutError::invalid_url("URL must have a valid host"))?;

    if is_private_host(host) {
        debug!("rejected private host at creation: {}", host);
        return Err(LinkcutError::invalid_url(
            "Private IPs and localhost are not allowed",
        ));
    }

    Ok(())
}

/// Why a redirect target was rejected; tags feed the failure counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectRejection {
    Malformed(String),
    InvalidScheme(String),
    InvalidHost,
    PrivateHost(String),
    BlacklistedDomain(String),
}

impl RedirectRejection {
    /// Low-cardinality tag for `redirect.validation.failure`.
    pub fn reason(&self) -> &'static str {
        match self {
            RedirectRejection::Malformed(_) => "malformed",
            RedirectRejection::InvalidScheme(_) => "invalid_scheme",
            RedirectRejection::InvalidHost => "invalid_host",
            RedirectRejection::PrivateHost(_) => "private_ip",
            RedirectRejection::BlacklistedDomain(_) => "blacklisted_domain",
        }
    }
}

impl From<RedirectRejection> for LinkcutError {
    fn from(rejection: RedirectRejection) -> Self {
        let msg = match &rejection {
            RedirectRejection::Malformed(detail) => {
                format!("Invalid redirect URL format: {}", detail)
            }
            RedirectRejection::InvalidScheme(scheme) => format!(
                "Invalid redirect scheme: {}. Only HTTP and HTTPS are allowed",
                scheme
            ),
            RedirectRejection::InvalidHost => "Invalid redirect host".to_string(),
            RedirectRejection::PrivateHost(host) => format!(
                "Private IPs and localhost are not allowed for redirects: {}",
                host
            ),
            RedirectRejection::BlacklistedDomain(host) => format!("Blacklisted domain: {}", host),
        };
        LinkcutError::invalid_url(msg)
    }
}

/// Redirect-time hook: open-redirect defense in depth.
///
/// Re-validates scheme, host shape and privacy even though the URL was
/// checked at creation, and additionally applies the domain blacklist.
pub fn validate_redirect_url(
    config: &RedirectValidationConfig,
    url: &str,
) -> std::result::Result<(), RedirectRejection> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(RedirectRejection::Malformed("empty URL".to_string()));
    }

    let parsed =
        Url::parse(trimmed).map_err(|e| RedirectRejection::Malformed(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(RedirectRejection::InvalidScheme(other.to_string())),
    }

    let host = parsed.host_str().ok_or(RedirectRejection::InvalidHost)?;
    if host.contains("..") || host.contains("//") {
        return Err(RedirectRejection::InvalidHost);
    }

    if is_private_host(host) {
        warn!("attempted redirect to private IP/localhost: {}", host);
        return Err(RedirectRejection::PrivateHost(host.to_string()));
    }

    if is_blacklisted(config, host) {
        warn!("attempted redirect to blacklisted domain: {}", host);
        return Err(RedirectRejection::BlacklistedDomain(host.to_string()));
    }

    Ok(())
}

/// Whether a host is localhost or sits in a private/local range.
///
/// IP literals are classified precisely; other hosts fall back to the
/// string-prefix ranges so an unresolvable name cannot smuggle one in.
fn is_private_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }

    // Bracketed IPv6 hosts come out of url::Url without brackets.
    if let Ok(addr) = host.parse::<IpAddr>() {
        return match addr {
            IpAddr::V4(v4) => {
                v4.is_loopback()
                    || v4.is_private()
                    || v4.is_link_local()
                    || v4.is_unspecified()
            }
            IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
        };
    }

    host.starts_with("192.168.")
        || host.starts_with("10.")
        || host.starts_with("127.")
        || (host.starts_with("172.") && is_private_172_range(host))
}

/// 172.16.0.0 - 172.31.255.255
fn is_private_172_range(host: &str) -> bool {
    host.split('.')
        .nth(1)
        .and_then(|octet| octet.parse::<u8>().ok())
        .map(|octet| (16..=31).contains(&octet))
        .unwrap_or(false)
}

/// Exact or subdomain-suffix match against the blacklist.
fn is_blacklisted(config: &RedirectValidationConfig, host: &str) -> bool {
    let host_lower = host.to_lowercase();
    config.blacklisted_domains.iter().any(|blacklisted| {
        let blacklisted = blacklisted.to_lowercase();
        host_lower == blacklisted || host_lower.ends_with(&format!(".{}", blacklisted))
    })
}
