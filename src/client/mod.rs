//! Redirect-following client.
//!
//! # Module Organization
//!
//! ```text
//! client/
//! ├── fetch      - FollowClient, the entry point
//! ├── request    - RedirectableRequest facade and its events
//! ├── response   - RedirectResponse
//! ├── controller - per-request task driving the hops
//! └── config     - reqwest binding configuration
//! ```
//!
//! # Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`FollowClient`] | Creates requests over a set of bindings |
//! | [`RedirectableRequest`] | One logical request across every hop |
//! | [`RedirectResponse`] | Final response plus redirect history |
//! | [`RequestEvent`] | Socket, response, error and abort notifications |
//! | [`ClientConfig`] | Pool settings for the reqwest binding |
//!
//! # Examples
//!
//! ```
//! use follow_redirects::client::{ClientConfig, FollowClient};
//!
//! let client = FollowClient::with_config(ClientConfig {
//!     max_idle_per_host: 8,
//!     ..Default::default()
//! });
//! assert_eq!(client.bindings().schemes(), ["http", "https"]);
//! ```

mod config;
mod controller;
mod fetch;
mod request;
mod response;

pub use config::ClientConfig;
pub use controller::Phase;
pub use fetch::FollowClient;
pub use request::{AbortHandle, RedirectableRequest, RequestEvent, Written};
pub use response::RedirectResponse;
