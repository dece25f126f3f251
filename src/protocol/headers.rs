//! Header helpers used when a request is carried across a redirect.
//!
//! # Header Groups
//!
//! | Group | Names | Dropped when |
//! |-------|-------|--------------|
//! | Entity | `content-*`, `transfer-encoding` | the method is downgraded to GET |
//! | Host | `host` | the redirect leaves the host the request was sent to |
//! | Credentials | `authorization`, `proxy-authorization`, `cookie` | cross-host redirect under [`CredentialPolicy::StripOnCrossHost`](crate::policy::CredentialPolicy::StripOnCrossHost) |
//!
//! # Examples
//!
//! ```
//! use follow_redirects::protocol::headers::{is_entity_header, is_credential_header};
//!
//! assert!(is_entity_header("Content-Type"));
//! assert!(is_entity_header("transfer-encoding"));
//! assert!(!is_entity_header("accept"));
//!
//! assert!(is_credential_header("Proxy-Authorization"));
//! assert!(!is_credential_header("x-authorization-hint"));
//! ```
//!
//! See [RFC 9110 Section 15.4](https://www.rfc-editor.org/rfc/rfc9110#section-15.4) for
//! the redirection semantics these rules follow.

use http::header::{HeaderMap, HeaderName, HeaderValue, HOST, TRANSFER_ENCODING};
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

static CREDENTIAL_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:(?:proxy-)?authorization|cookie)$").expect("credential header pattern")
});

/// Whether `name` describes the request entity.
pub fn is_entity_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name.starts_with("content-") || name == TRANSFER_ENCODING.as_str()
}

/// Whether `name` carries credentials.
pub fn is_credential_header(name: &str) -> bool {
    CREDENTIAL_HEADER.is_match(name)
}

/// Remove every entity header, returning how many names were removed.
pub fn strip_entity_headers(headers: &mut HeaderMap) -> usize {
    remove_matching(headers, |name| is_entity_header(name.as_str()))
}

/// Remove credential headers, returning how many names were removed.
pub fn strip_credential_headers(headers: &mut HeaderMap) -> usize {
    remove_matching(headers, |name| is_credential_header(name.as_str()))
}

/// Remove the `Host` header, returning its last value.
pub fn take_host(headers: &mut HeaderMap) -> Option<HeaderValue> {
    headers.remove(HOST)
}

fn remove_matching(headers: &mut HeaderMap, matches: impl Fn(&HeaderName) -> bool) -> usize {
    let doomed: Vec<HeaderName> = headers.keys().filter(|name| matches(name)).cloned().collect();
    for name in &doomed {
        headers.remove(name);
    }
    doomed.len()
}

/// Whether `host` equals `domain` or is one of its subdomains.
///
/// Ports are ignored; comparison is case-insensitive.
pub fn is_same_or_subdomain(host: &str, domain: &str) -> bool {
    let host = strip_port(host).to_ascii_lowercase();
    let domain = strip_port(domain).to_ascii_lowercase();
    if host == domain {
        return true;
    }
    host.len() > domain.len()
        && host.ends_with(&domain)
        && host.as_bytes()[host.len() - domain.len() - 1] == b'.'
}

fn strip_port(authority: &str) -> &str {
    // Bracketed IPv6 literals keep their colons.
    if let Some(end) = authority.rfind(']') {
        return &authority[..=end];
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}

/// Flatten headers into a sorted map of lowercase names to string values.
///
/// Values that are not visible ASCII are skipped; repeated names are joined with `", "`.
pub fn header_snapshot(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut snapshot: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            snapshot
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
    }
    snapshot
}
