//! Underlying client bindings.
//!
//! The controller never speaks HTTP itself. Each hop is handed to a [`ClientBinding`]
//! registered for the hop's scheme, which returns an [`UnderlyingRequest`] handle the
//! controller writes the body into and a stream of [`HopEvent`]s reporting what happened
//! on the wire.
//!
//! # Contract
//!
//! | Call | Binding must |
//! |------|--------------|
//! | [`ClientBinding::issue`] | start the hop without blocking; report through the given [`HopEvents`] |
//! | [`UnderlyingRequest::write`] | forward or buffer the bytes in order |
//! | [`UnderlyingRequest::end`] | finish the outbound body |
//! | [`UnderlyingRequest::abort`] | stop the hop; later events are ignored anyway |
//!
//! Every hop emits at most one [`HopEvent::Response`] or [`HopEvent::Error`]. Events
//! carry the hop index assigned by the controller, so a handle that outlives its hop
//! cannot disturb the chain.
//!
//! The crate ships one binding, [`ReqwestBinding`], used for both `http` and `https`.

mod reqwest;

pub use self::reqwest::{ReqwestAgent, ReqwestBinding};

use crate::error::{Result as FollowResult, TransportError};
use crate::policy::validate_protocol;
use crate::pool::Agent;
use crate::types::{HopRequest, SocketInfo};
use bytes::Bytes;
use futures::Stream;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

/// Response body as delivered by a binding.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send>>;

/// Factory for underlying requests of one or more schemes.
pub trait ClientBinding: Send + Sync + 'static {
    /// Pool used when the caller did not supply one for the scheme.
    fn default_agent(&self) -> Arc<dyn Agent>;

    /// Start a hop.
    fn issue(
        &self,
        request: HopRequest,
        agent: Arc<dyn Agent>,
        events: HopEvents,
    ) -> Box<dyn UnderlyingRequest>;
}

/// Handle to one in-flight hop.
pub trait UnderlyingRequest: Send {
    /// Send a body chunk.
    fn write(&mut self, chunk: Bytes);

    /// Finish the outbound body.
    fn end(&mut self);

    /// Cancel the hop.
    fn abort(&mut self);

    /// Give up on the hop after `timeout` without a response.
    fn set_timeout(&mut self, timeout: Duration);

    /// Toggle Nagle's algorithm on the hop's connection.
    fn set_no_delay(&mut self, no_delay: bool);

    /// Toggle TCP keep-alive on the hop's connection.
    fn set_socket_keep_alive(&mut self, enable: bool, initial_delay: Option<Duration>);

    /// Send the request head without waiting for body data.
    fn flush_headers(&mut self);

    /// Header as it will go out on this hop.
    fn get_header(&self, name: &HeaderName) -> Option<HeaderValue>;

    /// Replace a header. Has no effect once the head has been sent.
    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Remove a header. Has no effect once the head has been sent.
    fn remove_header(&mut self, name: &HeaderName);

    /// Connection currently serving the hop, once known.
    fn socket(&self) -> Option<SocketInfo>;
}

/// A response head plus its streaming body.
pub struct IncomingResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: BodyStream,
}

impl IncomingResponse {
    /// Wrap a status, headers and body stream.
    pub fn new(status: StatusCode, headers: HeaderMap, body: BodyStream) -> Self {
        IncomingResponse {
            status,
            headers,
            body,
        }
    }

    /// Response with a body already held in memory.
    pub fn from_bytes(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        let body: Bytes = body.into();
        Self::new(
            status,
            headers,
            Box::pin(futures::stream::iter([Ok::<_, TransportError>(body)])),
        )
    }

    /// Response with no body.
    pub fn empty(status: StatusCode, headers: HeaderMap) -> Self {
        Self::new(status, headers, Box::pin(futures::stream::empty::<Result<Bytes, TransportError>>()))
    }
}

impl fmt::Debug for IncomingResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncomingResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Something that happened on a hop.
#[derive(Debug)]
pub enum HopEvent {
    /// The hop has a connection.
    Socket(SocketInfo),
    /// The response head arrived.
    Response(IncomingResponse),
    /// The hop failed.
    Error(TransportError),
}

#[derive(Debug)]
pub(crate) struct HopSignal {
    pub(crate) hop: usize,
    pub(crate) event: HopEvent,
}

/// Sender a binding reports a hop's events through.
#[derive(Debug, Clone)]
pub struct HopEvents {
    hop: usize,
    tx: mpsc::UnboundedSender<HopSignal>,
}

impl HopEvents {
    pub(crate) fn new(hop: usize, tx: mpsc::UnboundedSender<HopSignal>) -> Self {
        HopEvents { hop, tx }
    }

    /// Index of the hop these events belong to.
    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Report an event. Returns `false` once the request is gone.
    pub fn emit(&self, event: HopEvent) -> bool {
        self.tx
            .send(HopSignal {
                hop: self.hop,
                event,
            })
            .is_ok()
    }
}

/// Bindings keyed by URL scheme.
#[derive(Clone, Default)]
pub struct BindingRegistry {
    bindings: HashMap<String, Arc<dyn ClientBinding>>,
}

impl BindingRegistry {
    /// Empty registry. Every scheme is unsupported until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `binding` for `scheme` and return the registry.
    pub fn with_binding(mut self, scheme: &str, binding: Arc<dyn ClientBinding>) -> Self {
        self.register(scheme, binding);
        self
    }

    /// Register `binding` for `scheme`, replacing any previous one.
    pub fn register(&mut self, scheme: &str, binding: Arc<dyn ClientBinding>) {
        let scheme = scheme.trim_end_matches(':').to_ascii_lowercase();
        self.bindings.insert(scheme, binding);
    }

    /// Binding for `scheme`.
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn ClientBinding>> {
        self.bindings.get(scheme).cloned()
    }

    /// Binding for `url`'s scheme.
    ///
    /// # Errors
    ///
    /// [`FollowError::UnsupportedProtocol`](crate::FollowError::UnsupportedProtocol) when no binding is registered.
    pub fn binding_for(&self, url: &Url) -> FollowResult<Arc<dyn ClientBinding>> {
        validate_protocol(url, |scheme| self.get(scheme))
    }

    /// Whether `scheme` has a binding.
    pub fn supports(&self, scheme: &str) -> bool {
        self.bindings.contains_key(scheme)
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.bindings.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl fmt::Debug for BindingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}
