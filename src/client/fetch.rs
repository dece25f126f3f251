//! Entry point wrapping a set of client bindings.
//!
//! # Examples
//!
//! ## Simple GET
//!
//! ```ignore
//! use follow_redirects::{FollowClient, RequestOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FollowClient::new();
//!     let mut request = client.get(RequestOptions::parse("http://localhost:3600/a")?.with_track_redirects(true))?;
//!     let response = request.response().await?;
//!     for hop in response.redirects() {
//!         println!("{} {}", hop.status_code, hop.url);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Custom bindings
//!
//! ```ignore
//! use follow_redirects::transport::{BindingRegistry, ReqwestBinding};
//! use follow_redirects::{ClientConfig, FollowClient};
//! use std::sync::Arc;
//!
//! let registry = BindingRegistry::new()
//!     .with_binding("https", Arc::new(ReqwestBinding::new("tls-only", ClientConfig::default())));
//! let client = FollowClient::with_bindings(registry);
//! ```

use crate::client::config::ClientConfig;
use crate::client::request::RedirectableRequest;
use crate::error::Result;
use crate::options::RequestOptions;
use crate::transport::{BindingRegistry, ReqwestBinding};
use std::sync::Arc;

/// Creates redirect-following requests.
///
/// Cloning is cheap; clones share bindings and therefore connection pools.
#[derive(Debug, Clone)]
pub struct FollowClient {
    bindings: Arc<BindingRegistry>,
}

impl FollowClient {
    /// Client with reqwest bindings for `http` and `https`.
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    /// Client with reqwest bindings for `http` and `https`, each with its own pool
    /// built from `config`.
    pub fn with_config(config: ClientConfig) -> Self {
        let registry = BindingRegistry::new()
            .with_binding("http", Arc::new(ReqwestBinding::new("http", config.clone())))
            .with_binding("https", Arc::new(ReqwestBinding::new("https", config)));
        Self::with_bindings(registry)
    }

    /// Client over an arbitrary set of bindings.
    pub fn with_bindings(bindings: BindingRegistry) -> Self {
        FollowClient {
            bindings: Arc::new(bindings),
        }
    }

    /// Registered bindings.
    pub fn bindings(&self) -> &BindingRegistry {
        &self.bindings
    }

    /// Start a request. The body stays open until [`RedirectableRequest::end`].
    ///
    /// Process-wide defaults are read here, once.
    ///
    /// # Panics
    ///
    /// When called outside a tokio runtime.
    pub fn request(&self, options: RequestOptions) -> RedirectableRequest {
        RedirectableRequest::spawn(options.resolve(), Arc::clone(&self.bindings))
    }

    /// Start a request and finish its body right away.
    pub fn get(&self, options: RequestOptions) -> Result<RedirectableRequest> {
        let request = self.request(options);
        let _ = request.end()?;
        Ok(request)
    }
}

impl Default for FollowClient {
    fn default() -> Self {
        Self::new()
    }
}
