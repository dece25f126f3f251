//! Per-request options.
//!
//! [`RequestOptions`] describes the first hop and how the chain may evolve from it.
//! Limits left unset fall back to the process-wide [`config`](crate::config) defaults,
//! read once when the request is created.
//!
//! # Examples
//!
//! ```
//! use follow_redirects::RequestOptions;
//! use http::Method;
//!
//! let options = RequestOptions::parse("http://localhost:3600/a")
//!     .unwrap()
//!     .with_method(Method::POST)
//!     .with_max_redirects(3)
//!     .with_track_redirects(true)
//!     .try_with_header("content-type", "text/plain")
//!     .unwrap();
//!
//! assert_eq!(options.max_redirects, Some(3));
//! assert!(options.track_redirects);
//! ```

use crate::config;
use crate::error::{FollowError, Result};
use crate::policy::CredentialPolicy;
use crate::pool::Agent;
use crate::types::{HopRequest, ResponseDetails};
use http::header::IntoHeaderName;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Hook run before every redirect.
///
/// Receives the next hop (mutable), the redirect response, and the hop that was
/// redirected. Changes to the next hop's URL, method or headers are honored.
pub type BeforeRedirect = Arc<dyn Fn(&mut HopRequest, &ResponseDetails, &HopRequest) + Send + Sync>;

/// Options of one redirect-following request.
#[derive(Clone)]
pub struct RequestOptions {
    /// Target of the first hop.
    pub url: Url,
    /// Method of the first hop.
    pub method: Method,
    /// Request headers, carried to every hop subject to the redirect rules.
    pub headers: HeaderMap,
    /// Redirect limit; `None` uses the process-wide default.
    pub max_redirects: Option<usize>,
    /// Body size limit in bytes; `None` uses the process-wide default.
    pub max_body_length: Option<usize>,
    /// Follow redirects at all. When `false` the first response is returned as is.
    pub follow_redirects: bool,
    /// Record every hop in [`RedirectResponse::redirects`](crate::RedirectResponse::redirects).
    pub track_redirects: bool,
    /// Pools keyed by scheme (`"http"`, `"https"`).
    pub agents: HashMap<String, Arc<dyn Agent>>,
    /// Hook run before each redirect.
    pub before_redirect: Option<BeforeRedirect>,
    /// Credential handling on cross-host redirects.
    pub credential_policy: CredentialPolicy,
}

impl RequestOptions {
    /// GET request to `url`.
    pub fn new(url: Url) -> Self {
        RequestOptions {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            max_redirects: None,
            max_body_length: None,
            follow_redirects: true,
            track_redirects: false,
            agents: HashMap::new(),
            before_redirect: None,
            credential_policy: CredentialPolicy::default(),
        }
    }

    /// GET request to a URL given as text.
    ///
    /// # Errors
    ///
    /// [`FollowError::InvalidUrl`] when `url` is not an absolute URL.
    pub fn parse(url: &str) -> Result<Self> {
        Url::parse(url)
            .map(Self::new)
            .map_err(|e| FollowError::InvalidUrl(format!("{e}: {url}")))
    }

    /// Set the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set a header, replacing earlier values.
    pub fn with_header(mut self, name: impl IntoHeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set a header from runtime strings.
    ///
    /// # Errors
    ///
    /// [`FollowError::InvalidHeader`] when the name or value is not valid in HTTP.
    pub fn try_with_header(mut self, name: &str, value: &str) -> Result<Self> {
        let (name, value) = parse_header(name, value)?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Set the redirect limit.
    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = Some(max_redirects);
        self
    }

    /// Set the body size limit.
    pub fn with_max_body_length(mut self, max_body_length: usize) -> Self {
        self.max_body_length = Some(max_body_length);
        self
    }

    /// Enable or disable redirect following.
    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    /// Enable or disable redirect tracking.
    pub fn with_track_redirects(mut self, track: bool) -> Self {
        self.track_redirects = track;
        self
    }

    /// Use `agent` for every hop with `scheme`.
    pub fn with_agent(mut self, scheme: &str, agent: Arc<dyn Agent>) -> Self {
        self.agents.insert(scheme.to_string(), agent);
        self
    }

    /// Run `hook` before every redirect.
    pub fn with_before_redirect<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut HopRequest, &ResponseDetails, &HopRequest) + Send + Sync + 'static,
    {
        self.before_redirect = Some(Arc::new(hook));
        self
    }

    /// Set the credential policy.
    pub fn with_credential_policy(mut self, policy: CredentialPolicy) -> Self {
        self.credential_policy = policy;
        self
    }

    pub(crate) fn resolve(self) -> Descriptor {
        let defaults = config::defaults();
        Descriptor {
            request: HopRequest::new(self.url, self.method, self.headers),
            max_redirects: self.max_redirects.unwrap_or(defaults.max_redirects),
            max_body_length: self.max_body_length.unwrap_or(defaults.max_body_length),
            follow_redirects: self.follow_redirects,
            track_redirects: self.track_redirects,
            agents: self.agents,
            before_redirect: self.before_redirect,
            credential_policy: self.credential_policy,
        }
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("url", &self.url.as_str())
            .field("method", &self.method)
            .field("headers", &self.headers)
            .field("max_redirects", &self.max_redirects)
            .field("max_body_length", &self.max_body_length)
            .field("follow_redirects", &self.follow_redirects)
            .field("track_redirects", &self.track_redirects)
            .field("agents", &self.agents)
            .field("before_redirect", &self.before_redirect.is_some())
            .field("credential_policy", &self.credential_policy)
            .finish()
    }
}

/// Options with every default filled in.
pub(crate) struct Descriptor {
    pub(crate) request: HopRequest,
    pub(crate) max_redirects: usize,
    pub(crate) max_body_length: usize,
    pub(crate) follow_redirects: bool,
    pub(crate) track_redirects: bool,
    pub(crate) agents: HashMap<String, Arc<dyn Agent>>,
    pub(crate) before_redirect: Option<BeforeRedirect>,
    pub(crate) credential_policy: CredentialPolicy,
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| FollowError::InvalidHeader(format!("invalid header name {name:?}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|_| FollowError::InvalidHeader(format!("invalid value for header {name}")))?;
    Ok((name, value))
}
