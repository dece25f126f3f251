#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

//! # follow_redirects: one request, any number of hops
//!
//! Wraps an HTTP client so that redirect responses are followed transparently. The
//! caller writes a body, sets headers and listens for events on one
//! [`RedirectableRequest`], exactly as with a plain request; behind it the crate issues
//! as many underlying requests as the redirect chain needs.
//!
//! ## Overview
//!
//! For every response the chain produces, the controller:
//!
//! 1. **Evaluates** it against the [`policy`]: 300, 301, 302, 303, 307 and 308 with a
//!    `Location` continue the chain, anything else ends it.
//! 2. **Rewrites** the next hop: unsafe methods become GET on 300-303, 307 and 308 keep
//!    method and body, entity headers go with a dropped body, `Host` is recomputed when
//!    the target changes.
//! 3. **Re-selects** the connection pool for the target scheme, so http→https→http
//!    chains use the right pool on every hop.
//! 4. **Replays** the buffered body when the method is kept.
//! 5. **Enforces** two limits for the whole chain: `max_redirects` (21 by default) and
//!    `max_body_length` (10 MiB by default).
//!
//! ## Client Usage
//!
//! ```ignore
//! use follow_redirects::{FollowClient, RequestEvent, RequestOptions};
//! use futures::StreamExt;
//! use http::Method;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FollowClient::new();
//!     let options = RequestOptions::parse("http://localhost:3600/a")?
//!         .with_method(Method::POST)
//!         .with_track_redirects(true);
//!
//!     let mut request = client.request(options);
//!     request.write("payload")?.await;
//!     request.end()?.await;
//!
//!     while let Some(event) = request.next().await {
//!         match event {
//!             RequestEvent::Socket(socket) => println!("connected to {:?}", socket.remote_addr),
//!             RequestEvent::Response(response) => {
//!                 println!("{} after {} hops", response.response_url(), response.redirects().len());
//!                 break;
//!             }
//!             RequestEvent::Error(e) => return Err(e.into()),
//!             RequestEvent::Abort => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - **[client]** - [`FollowClient`], the request facade and the controller task
//! - **[policy]** - Redirect decisions and method/header rewriting
//! - **[transport]** - Client binding traits and the reqwest binding
//! - **[pool]** - Connection pool selection per hop
//! - **[options]** - Per-request options
//! - **[config]** - Process-wide defaults
//! - **[protocol]** - Redirect statuses and header groups
//! - **[types]** - Chunks, hop requests and redirect records
//! - **[error]** - Error types and result handling

mod body;
mod history;

pub mod client;
pub mod config;
pub mod error;
pub mod options;
pub mod policy;
pub mod pool;
pub mod protocol;
pub mod transport;
pub mod types;

pub use client::{
    AbortHandle, ClientConfig, FollowClient, Phase, RedirectResponse, RedirectableRequest,
    RequestEvent, Written,
};
pub use config::RedirectDefaults;
pub use error::{ErrorKind, FollowError, Result, TransportError, TransportErrorKind};
pub use options::{BeforeRedirect, RequestOptions};
pub use policy::CredentialPolicy;
pub use pool::{Agent, PoolUsage};
pub use types::{Chunk, Encoding, HopRequest, RedirectRecord, ResponseDetails, SocketInfo};
