//! Binding backed by `reqwest`.
//!
//! Each [`ReqwestAgent`] owns one `reqwest::Client`, and therefore one connection pool.
//! Automatic redirects are disabled on every client so the controller sees each 3xx.
//!
//! # Body Handling
//!
//! A hop starts out buffering whatever the controller writes. The request is sent
//!
//! - with the whole body in one piece on `end`, or
//! - as a chunked stream once the buffer grows past
//!   [`ClientConfig::body_stream_threshold`] or `flush_headers` is called.
//!
//! # Connection Settings
//!
//! `reqwest` applies TCP no-delay and keep-alive per pool, not per request, so
//! `set_no_delay` and `set_socket_keep_alive` are logged on the handle and only take
//! effect through [`ClientConfig`]. `set_timeout` is honored per hop and restarts the
//! timer when changed while the hop is in flight.

use crate::client::ClientConfig;
use crate::error::{TransportError, TransportErrorKind};
use crate::pool::Agent;
use crate::transport::{ClientBinding, HopEvent, HopEvents, IncomingResponse, UnderlyingRequest};
use crate::types::{HopRequest, SocketInfo};
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use http::{HeaderName, HeaderValue};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// A reqwest connection pool.
///
/// Holds the error instead of a client when no redirect-free client could be built;
/// every hop issued through it then fails with that error.
#[derive(Debug, Clone)]
pub struct ReqwestAgent {
    label: String,
    client: Result<reqwest::Client, TransportError>,
}

impl ReqwestAgent {
    /// Wrap an existing client.
    ///
    /// The client should be built with `redirect(Policy::none())`; otherwise reqwest
    /// follows redirects itself and the controller never sees them.
    pub fn new(label: impl Into<String>, client: reqwest::Client) -> Self {
        ReqwestAgent {
            label: label.into(),
            client: Ok(client),
        }
    }

    /// Build a fresh pool from `config`.
    ///
    /// If the configured client cannot be built, falls back to one with reqwest's
    /// defaults, still without automatic redirects.
    pub fn from_config(label: impl Into<String>, config: &ClientConfig) -> Self {
        let label = label.into();
        let client = Self::try_build(config).or_else(|err| {
            tracing::warn!(agent = %label, error = %err, "client config rejected, using reqwest defaults");
            no_redirects().build().map_err(TransportError::from)
        });
        if let Err(err) = &client {
            tracing::error!(agent = %label, error = %err, "no http client available");
        }
        ReqwestAgent { label, client }
    }

    /// Build a fresh pool from `config`, failing if reqwest rejects it.
    pub fn try_from_config(label: impl Into<String>, config: &ClientConfig) -> Result<Self, TransportError> {
        Ok(Self::new(label, Self::try_build(config)?))
    }

    fn try_build(config: &ClientConfig) -> Result<reqwest::Client, TransportError> {
        let mut builder = no_redirects()
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_secs))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .tcp_nodelay(config.tcp_nodelay);

        if let Some(keepalive) = config.tcp_keepalive() {
            builder = builder.tcp_keepalive(keepalive);
        }
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Ok(builder.build()?)
    }

    /// The underlying client, if one could be built.
    pub fn client(&self) -> Option<&reqwest::Client> {
        self.client.as_ref().ok()
    }
}

fn no_redirects() -> reqwest::ClientBuilder {
    reqwest::Client::builder().redirect(reqwest::redirect::Policy::none())
}

impl Agent for ReqwestAgent {
    fn label(&self) -> &str {
        &self.label
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// [`ClientBinding`] issuing hops through reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestBinding {
    agent: Arc<ReqwestAgent>,
    config: Arc<ClientConfig>,
}

impl ReqwestBinding {
    /// Binding with its own pool labelled `label`.
    pub fn new(label: impl Into<String>, config: ClientConfig) -> Self {
        let agent = ReqwestAgent::from_config(label, &config);
        Self::with_agent(agent, config)
    }

    /// Binding whose default pool is `agent`.
    pub fn with_agent(agent: ReqwestAgent, config: ClientConfig) -> Self {
        ReqwestBinding {
            agent: Arc::new(agent),
            config: Arc::new(config),
        }
    }

    /// The binding's own pool.
    pub fn agent(&self) -> &ReqwestAgent {
        &self.agent
    }
}

impl ClientBinding for ReqwestBinding {
    fn default_agent(&self) -> Arc<dyn Agent> {
        self.agent.clone()
    }

    fn issue(
        &self,
        request: HopRequest,
        agent: Arc<dyn Agent>,
        events: HopEvents,
    ) -> Box<dyn UnderlyingRequest> {
        let client = match agent.as_any().downcast_ref::<ReqwestAgent>() {
            Some(agent) => agent.client.clone(),
            None => {
                tracing::warn!(
                    agent = agent.label(),
                    fallback = self.agent.label(),
                    "agent is not a reqwest pool, using the binding's own"
                );
                self.agent.client.clone()
            }
        };

        if self.config.enable_logging {
            tracing::debug!(
                hop = events.hop(),
                method = %request.method,
                url = %request.url,
                agent = agent.label(),
                "issuing hop"
            );
        }

        Box::new(ReqwestRequest::new(request, client, events, &self.config))
    }
}

enum Outbound {
    Buffering { chunks: Vec<Bytes>, len: usize },
    Streaming(mpsc::UnboundedSender<Result<Bytes, std::io::Error>>),
    Finished,
}

/// One hop sent through reqwest.
struct ReqwestRequest {
    request: HopRequest,
    client: Result<reqwest::Client, TransportError>,
    events: HopEvents,
    outbound: Outbound,
    sent: bool,
    task: Option<JoinHandle<()>>,
    timeout: watch::Sender<Option<Duration>>,
    socket: Arc<Mutex<Option<SocketInfo>>>,
    stream_threshold: usize,
    logging: bool,
}

impl ReqwestRequest {
    fn new(
        request: HopRequest,
        client: Result<reqwest::Client, TransportError>,
        events: HopEvents,
        config: &ClientConfig,
    ) -> Self {
        let (timeout, _) = watch::channel(None);
        ReqwestRequest {
            request,
            client,
            events,
            outbound: Outbound::Buffering {
                chunks: Vec::new(),
                len: 0,
            },
            sent: false,
            task: None,
            timeout,
            socket: Arc::new(Mutex::new(None)),
            stream_threshold: config.body_stream_threshold,
            logging: config.enable_logging,
        }
    }

    /// Switch to a streamed body and send the head now.
    fn start_streaming(&mut self) {
        let Outbound::Buffering { chunks, .. } = std::mem::replace(&mut self.outbound, Outbound::Finished) else {
            return;
        };
        let (tx, rx) = mpsc::unbounded_channel();
        for chunk in chunks {
            let _ = tx.send(Ok(chunk));
        }
        self.outbound = Outbound::Streaming(tx);
        self.dispatch(Some(reqwest::Body::wrap_stream(UnboundedReceiverStream::new(rx))));
    }

    fn dispatch(&mut self, body: Option<reqwest::Body>) {
        if self.sent {
            return;
        }
        self.sent = true;

        let client = match &self.client {
            Ok(client) => client,
            Err(err) => {
                self.events.emit(HopEvent::Error(err.clone()));
                return;
            }
        };
        let mut builder = client
            .request(self.request.method.clone(), self.request.url.clone())
            .headers(self.request.headers.clone());
        if let Some(body) = body {
            builder = builder.body(body);
        }

        let events = self.events.clone();
        let socket = Arc::clone(&self.socket);
        let mut timeout = self.timeout.subscribe();
        let logging = self.logging;

        self.task = Some(tokio::spawn(async move {
            let send = builder.send();
            tokio::pin!(send);
            let mut watching = true;

            loop {
                let limit = *timeout.borrow_and_update();
                let expiry = async move {
                    match limit {
                        Some(limit) => tokio::time::sleep(limit).await,
                        None => std::future::pending().await,
                    }
                };

                tokio::select! {
                    result = &mut send => {
                        match result {
                            Ok(response) => {
                                if let Some(addr) = response.remote_addr() {
                                    let info = SocketInfo::remote(addr);
                                    *socket.lock() = Some(info);
                                    events.emit(HopEvent::Socket(info));
                                }
                                let status = response.status();
                                let headers = response.headers().clone();
                                if logging {
                                    tracing::debug!(hop = events.hop(), %status, "response head received");
                                }
                                let body = response.bytes_stream().map(|chunk| chunk.map_err(TransportError::from));
                                events.emit(HopEvent::Response(IncomingResponse::new(
                                    status,
                                    headers,
                                    Box::pin(body),
                                )));
                            }
                            Err(err) => {
                                events.emit(HopEvent::Error(TransportError::from(err)));
                            }
                        }
                        break;
                    }
                    _ = expiry => {
                        let limit = limit.unwrap_or_default();
                        events.emit(HopEvent::Error(TransportError::new(
                            TransportErrorKind::Timeout,
                            format!("no response within {} ms", limit.as_millis()),
                        )));
                        break;
                    }
                    changed = timeout.changed(), if watching => {
                        watching = changed.is_ok();
                    }
                }
            }
        }));
    }
}

impl UnderlyingRequest for ReqwestRequest {
    fn write(&mut self, chunk: Bytes) {
        let overflow = match &mut self.outbound {
            Outbound::Buffering { chunks, len } => {
                *len += chunk.len();
                chunks.push(chunk);
                *len > self.stream_threshold
            }
            Outbound::Streaming(tx) => {
                let _ = tx.send(Ok(chunk));
                false
            }
            Outbound::Finished => {
                tracing::trace!(hop = self.events.hop(), "write after the body was finished");
                false
            }
        };
        if overflow {
            self.start_streaming();
        }
    }

    fn end(&mut self) {
        match std::mem::replace(&mut self.outbound, Outbound::Finished) {
            Outbound::Buffering { chunks, len } => {
                let body = match chunks.len() {
                    0 => None,
                    1 => chunks.into_iter().next().map(reqwest::Body::from),
                    _ => {
                        let mut joined = BytesMut::with_capacity(len);
                        for chunk in chunks {
                            joined.extend_from_slice(&chunk);
                        }
                        Some(reqwest::Body::from(joined.freeze()))
                    }
                };
                self.dispatch(body);
            }
            // Dropping the sender closes the body stream.
            Outbound::Streaming(_) | Outbound::Finished => {}
        }
    }

    fn abort(&mut self) {
        self.outbound = Outbound::Finished;
        self.sent = true;
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout.send_replace(Some(timeout));
    }

    fn set_no_delay(&mut self, no_delay: bool) {
        if self.logging {
            tracing::debug!(hop = self.events.hop(), no_delay, "no-delay is configured per pool");
        }
    }

    fn set_socket_keep_alive(&mut self, enable: bool, initial_delay: Option<Duration>) {
        if self.logging {
            tracing::debug!(
                hop = self.events.hop(),
                enable,
                ?initial_delay,
                "keep-alive is configured per pool"
            );
        }
    }

    fn flush_headers(&mut self) {
        if !self.sent {
            self.start_streaming();
        }
    }

    fn get_header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.request.headers.get(name).cloned()
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        if !self.sent {
            self.request.headers.insert(name, value);
        }
    }

    fn remove_header(&mut self, name: &HeaderName) {
        if !self.sent {
            self.request.headers.remove(name);
        }
    }

    fn socket(&self) -> Option<SocketInfo> {
        *self.socket.lock()
    }
}
