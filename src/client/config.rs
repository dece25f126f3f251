//! Configuration for the bundled reqwest binding.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings applied to the reqwest pools created by [`FollowClient`](crate::FollowClient).
///
/// # Examples
///
/// ```
/// use follow_redirects::client::ClientConfig;
///
/// let config = ClientConfig {
///     max_idle_per_host: 4,
///     enable_logging: false,
///     ..Default::default()
/// };
/// assert_eq!(config.pool_idle_timeout_secs, 90);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Overall per-hop timeout in milliseconds, including the response body.
    /// `None` leaves hops unbounded unless the caller uses `set_timeout`.
    pub request_timeout_ms: Option<u64>,
    /// How long idle pooled connections are kept.
    pub pool_idle_timeout_secs: u64,
    /// Idle connections kept per host.
    pub max_idle_per_host: usize,
    /// Disable Nagle's algorithm on pooled connections.
    pub tcp_nodelay: bool,
    /// TCP keep-alive interval for pooled connections.
    pub tcp_keepalive_secs: Option<u64>,
    /// Buffered body size after which a hop starts streaming before `end`.
    pub body_stream_threshold: usize,
    /// Emit per-hop debug logs from the binding.
    pub enable_logging: bool,
}

impl ClientConfig {
    pub(crate) fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub(crate) fn tcp_keepalive(&self) -> Option<Duration> {
        self.tcp_keepalive_secs.map(Duration::from_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            request_timeout_ms: None,
            pool_idle_timeout_secs: 90,
            max_idle_per_host: 32,
            tcp_nodelay: true,
            tcp_keepalive_secs: None,
            body_stream_threshold: 64 * 1024,
            enable_logging: true,
        }
    }
}
