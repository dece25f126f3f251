//! Redirect policy: decides whether a response ends the chain and, if not, what the
//! next hop looks like.
//!
//! [`evaluate`] is a pure function of the response status and headers and of the hop that
//! produced them. It never touches the network and never mutates its inputs.
//!
//! # Method Rules
//!
//! | Status | GET / HEAD / OPTIONS / TRACE | Any other method |
//! |--------|------------------------------|------------------|
//! | 300, 301, 302, 303 | reused | becomes GET, body and entity headers dropped |
//! | 307, 308 | reused | reused, body replayed byte for byte |
//!
//! A redirect status without a non-empty `Location` is terminal and reaches the caller
//! unchanged.
//!
//! # Examples
//!
//! ```
//! use follow_redirects::policy::{evaluate, CredentialPolicy, Decision};
//! use follow_redirects::HopRequest;
//! use http::{HeaderMap, Method, StatusCode};
//!
//! let hop = HopRequest::new(
//!     "http://localhost:3600/a".parse().unwrap(),
//!     Method::POST,
//!     HeaderMap::new(),
//! );
//! let mut headers = HeaderMap::new();
//! headers.insert("location", "/b".parse().unwrap());
//!
//! match evaluate(StatusCode::FOUND, &headers, &hop, CredentialPolicy::Keep).unwrap() {
//!     Decision::Redirect(plan) => {
//!         assert_eq!(plan.request.method, Method::GET);
//!         assert_eq!(plan.request.url.as_str(), "http://localhost:3600/b");
//!         assert!(plan.downgraded);
//!     }
//!     Decision::Terminal => unreachable!(),
//! }
//! ```

use crate::error::{FollowError, Result};
use crate::protocol::headers::{
    is_same_or_subdomain, strip_credential_headers, strip_entity_headers, take_host,
};
use crate::protocol::{is_redirect_status, preserves_method};
use crate::types::{authority_of, HopRequest};
use http::header::{HOST, LOCATION};
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::{ParseError, Url};

/// What happens to credential headers when a redirect leaves the current host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPolicy {
    /// Carry `Authorization`, `Proxy-Authorization` and `Cookie` to every hop.
    #[default]
    Keep,
    /// Drop them when the target is neither the current host nor one of its
    /// subdomains, or when the redirect downgrades https to http.
    StripOnCrossHost,
}

/// Outcome of evaluating one response.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// The response goes to the caller as is.
    Terminal,
    /// The chain continues with another hop.
    Redirect(RedirectPlan),
}

/// The next hop of a chain.
#[derive(Debug, Clone, PartialEq)]
pub struct RedirectPlan {
    /// Status of the response being redirected.
    pub status: StatusCode,
    /// Resolved target, method and headers of the next hop.
    pub request: HopRequest,
    /// The method was switched to GET and the body must not be replayed.
    pub downgraded: bool,
}

impl RedirectPlan {
    /// Whether the buffered body is replayed onto the next hop.
    pub fn preserves_body(&self) -> bool {
        !self.downgraded
    }
}

/// Method used for the hop after a redirect with `status`, and whether it is a
/// downgrade to GET.
pub fn redirected_method(status: StatusCode, method: &Method) -> (Method, bool) {
    if preserves_method(status) || is_safe_method(method) {
        (method.clone(), false)
    } else {
        (Method::GET, true)
    }
}

fn is_safe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Evaluate a response produced by `current`.
///
/// # Errors
///
/// [`FollowError::RedirectionFailure`] when the `Location` header cannot be resolved
/// against the current URL.
pub fn evaluate(
    status: StatusCode,
    response_headers: &HeaderMap,
    current: &HopRequest,
    credentials: CredentialPolicy,
) -> Result<Decision> {
    if !is_redirect_status(status) {
        return Ok(Decision::Terminal);
    }
    let Some(location) = response_headers.get(LOCATION) else {
        return Ok(Decision::Terminal);
    };
    let location = std::str::from_utf8(location.as_bytes())
        .map_err(|_| FollowError::RedirectionFailure("Location is not valid UTF-8".into()))?
        .trim();
    if location.is_empty() {
        return Ok(Decision::Terminal);
    }

    let url = current
        .url
        .join(location)
        .map_err(|e| FollowError::RedirectionFailure(format!("{e}: {location}")))?;

    let (method, downgraded) = redirected_method(status, &current.method);
    let mut headers = current.headers.clone();
    if downgraded {
        strip_entity_headers(&mut headers);
    }

    let current_host = current
        .headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| current.authority());

    if !is_relative(location) || authority_of(&url) != current.authority() {
        take_host(&mut headers);
    }

    if credentials == CredentialPolicy::StripOnCrossHost && leaves_origin(&current.url, &current_host, &url) {
        strip_credential_headers(&mut headers);
    }

    Ok(Decision::Redirect(RedirectPlan {
        status,
        request: HopRequest::new(url, method, headers),
        downgraded,
    }))
}

/// Look up whatever serves `url`'s scheme.
///
/// # Errors
///
/// [`FollowError::UnsupportedProtocol`] carrying the scheme with its trailing colon when
/// `lookup` finds nothing.
pub fn validate_protocol<T>(url: &Url, lookup: impl FnOnce(&str) -> Option<T>) -> Result<T> {
    lookup(url.scheme()).ok_or_else(|| FollowError::UnsupportedProtocol(format!("{}:", url.scheme())))
}

fn is_relative(location: &str) -> bool {
    matches!(Url::parse(location), Err(ParseError::RelativeUrlWithoutBase))
        && !location.starts_with("//")
}

fn leaves_origin(from: &Url, from_host: &str, to: &Url) -> bool {
    let downgrade = from.scheme() == "https" && to.scheme() == "http";
    downgrade || !is_same_or_subdomain(&authority_of(to), from_host)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hop(url: &str, method: Method, headers: &[(&'static str, &'static str)]) -> HopRequest {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            map.insert(*name, http::HeaderValue::from_static(value));
        }
        HopRequest::new(Url::parse(url).unwrap(), method, map)
    }

    fn location(value: &'static str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(LOCATION, http::HeaderValue::from_static(value));
        map
    }

    fn plan(decision: Decision) -> RedirectPlan {
        match decision {
            Decision::Redirect(plan) => plan,
            Decision::Terminal => panic!("expected a redirect"),
        }
    }

    #[test]
    fn test_non_redirect_status_is_terminal() {
        let current = hop("http://localhost/a", Method::GET, &[]);
        for status in [StatusCode::OK, StatusCode::NOT_MODIFIED, StatusCode::NOT_FOUND] {
            let decision = evaluate(status, &location("/b"), &current, CredentialPolicy::Keep);
            assert_eq!(decision.unwrap(), Decision::Terminal);
        }
    }

    #[test]
    fn test_missing_or_empty_location_is_terminal() {
        let current = hop("http://localhost/a", Method::GET, &[]);
        let decision = evaluate(
            StatusCode::TEMPORARY_REDIRECT,
            &HeaderMap::new(),
            &current,
            CredentialPolicy::Keep,
        );
        assert_eq!(decision.unwrap(), Decision::Terminal);

        let decision = evaluate(StatusCode::FOUND, &location(""), &current, CredentialPolicy::Keep);
        assert_eq!(decision.unwrap(), Decision::Terminal);
    }

    #[test]
    fn test_method_switching() {
        for code in [300, 301, 302, 303] {
            let status = StatusCode::from_u16(code).unwrap();
            for method in [Method::GET, Method::HEAD, Method::OPTIONS, Method::TRACE] {
                assert_eq!(redirected_method(status, &method), (method.clone(), false));
            }
            assert_eq!(redirected_method(status, &Method::POST), (Method::GET, true));
            assert_eq!(redirected_method(status, &Method::PUT), (Method::GET, true));
        }
        for code in [307, 308] {
            let status = StatusCode::from_u16(code).unwrap();
            assert_eq!(redirected_method(status, &Method::POST), (Method::POST, false));
            assert_eq!(redirected_method(status, &Method::PUT), (Method::PUT, false));
        }
    }

    #[test]
    fn test_downgrade_drops_entity_headers() {
        let current = hop(
            "http://localhost:3600/a",
            Method::POST,
            &[("content-type", "application/javascript"), ("content-length", "42"), ("other", "value")],
        );
        let plan = plan(evaluate(StatusCode::FOUND, &location("/b"), &current, CredentialPolicy::Keep).unwrap());
        assert!(plan.downgraded);
        assert!(!plan.preserves_body());
        assert!(!plan.request.headers.contains_key("content-type"));
        assert!(!plan.request.headers.contains_key("content-length"));
        assert_eq!(plan.request.headers["other"], "value");
    }

    #[test]
    fn test_307_keeps_entity_headers() {
        let current = hop("http://localhost:3600/a", Method::POST, &[("content-type", "text/plain")]);
        let plan = plan(
            evaluate(StatusCode::TEMPORARY_REDIRECT, &location("/b"), &current, CredentialPolicy::Keep).unwrap(),
        );
        assert_eq!(plan.request.method, Method::POST);
        assert!(plan.preserves_body());
        assert_eq!(plan.request.headers["content-type"], "text/plain");
    }

    #[test]
    fn test_query_survives_resolution() {
        let current = hop("http://localhost:3600/a", Method::GET, &[]);
        let plan = plan(
            evaluate(StatusCode::FOUND, &location("/b?greeting=hello"), &current, CredentialPolicy::Keep).unwrap(),
        );
        assert_eq!(plan.request.url.as_str(), "http://localhost:3600/b?greeting=hello");
    }

    #[test]
    fn test_host_header_rules() {
        let current = hop("http://localhost:3600/a", Method::GET, &[("host", "otherhost.com")]);

        let plan_absolute = plan(
            evaluate(StatusCode::FOUND, &location("http://localhost:3600/b"), &current, CredentialPolicy::Keep).unwrap(),
        );
        assert!(!plan_absolute.request.headers.contains_key(HOST));

        let plan_relative = plan(
            evaluate(StatusCode::FOUND, &location("/b"), &current, CredentialPolicy::Keep).unwrap(),
        );
        assert_eq!(plan_relative.request.headers[HOST], "otherhost.com");

        let plan_scheme_relative = plan(
            evaluate(StatusCode::FOUND, &location("//elsewhere/b"), &current, CredentialPolicy::Keep).unwrap(),
        );
        assert!(!plan_scheme_relative.request.headers.contains_key(HOST));
        assert_eq!(plan_scheme_relative.request.url.as_str(), "http://elsewhere/b");
    }

    #[test]
    fn test_credential_policy() {
        let current = hop(
            "https://example.com/a",
            Method::GET,
            &[("authorization", "Bearer t"), ("cookie", "a=b")],
        );

        let kept = plan(
            evaluate(StatusCode::FOUND, &location("https://other.org/b"), &current, CredentialPolicy::Keep).unwrap(),
        );
        assert!(kept.request.headers.contains_key("authorization"));

        let stripped = plan(
            evaluate(
                StatusCode::FOUND,
                &location("https://other.org/b"),
                &current,
                CredentialPolicy::StripOnCrossHost,
            )
            .unwrap(),
        );
        assert!(!stripped.request.headers.contains_key("authorization"));
        assert!(!stripped.request.headers.contains_key("cookie"));

        let subdomain = plan(
            evaluate(
                StatusCode::FOUND,
                &location("https://api.example.com/b"),
                &current,
                CredentialPolicy::StripOnCrossHost,
            )
            .unwrap(),
        );
        assert!(subdomain.request.headers.contains_key("authorization"));

        let downgrade = plan(
            evaluate(
                StatusCode::FOUND,
                &location("http://example.com/b"),
                &current,
                CredentialPolicy::StripOnCrossHost,
            )
            .unwrap(),
        );
        assert!(!downgrade.request.headers.contains_key("authorization"));
    }

    #[test]
    fn test_unresolvable_location() {
        let current = hop("http://localhost/a", Method::GET, &[]);
        let err = evaluate(StatusCode::FOUND, &location("http://[::1/b"), &current, CredentialPolicy::Keep)
            .unwrap_err();
        assert!(matches!(err, FollowError::RedirectionFailure(_)));
    }

    #[test]
    fn test_validate_protocol() {
        let about = Url::parse("about:blank").unwrap();
        let err = validate_protocol(&about, |scheme| (scheme == "http").then_some(())).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported protocol about:");

        let http = Url::parse("http://localhost/").unwrap();
        let rest = validate_protocol(&http, |scheme| scheme.strip_prefix("ht").map(str::to_string));
        assert_eq!(rest.unwrap(), "tp");
    }
}
