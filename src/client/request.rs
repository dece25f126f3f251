//! The caller-facing request object.
//!
//! A [`RedirectableRequest`] looks like a single outbound request no matter how many
//! hops the chain takes. Writes, header changes and socket settings go to whichever hop
//! is current; events from every hop come out of one stream.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | [`RequestEvent::Socket`] | a hop obtained its connection |
//! | [`RequestEvent::Response`] | the chain settled on a final response |
//! | [`RequestEvent::Error`] | the chain failed |
//! | [`RequestEvent::Abort`] | [`abort`](RedirectableRequest::abort) was called; emitted once |
//!
//! Once the request is aborted no event other than the single `Abort` is delivered. The
//! stream ends after `Response`, `Error` or `Abort`.
//!
//! # Examples
//!
//! ```ignore
//! use follow_redirects::{FollowClient, RequestOptions};
//! use http::Method;
//!
//! let client = FollowClient::new();
//! let options = RequestOptions::parse("http://localhost:3600/upload")?.with_method(Method::POST);
//! let mut request = client.request(options);
//! request.write("hello ")?.await;
//! request.end_with("world")?.await;
//!
//! let response = request.response().await?;
//! println!("{} from {}", response.status(), response.response_url());
//! ```

use crate::client::controller::{shared_state, Command, Controller, ControlOp, Phase, Shared};
use crate::error::{FollowError, Result, TransportError, TransportErrorKind};
use crate::options::{parse_header, Descriptor};
use crate::pool::PoolUsage;
use crate::transport::BindingRegistry;
use crate::types::{Chunk, SocketInfo};
use crate::RedirectResponse;
use futures::{Stream, StreamExt};
use http::{HeaderName, HeaderValue, Method};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot};
use url::Url;
use uuid::Uuid;

/// Event emitted by a [`RedirectableRequest`].
#[derive(Debug)]
pub enum RequestEvent {
    /// The current hop has a connection.
    Socket(SocketInfo),
    /// The final response.
    Response(RedirectResponse),
    /// The chain failed.
    Error(FollowError),
    /// The request was aborted.
    Abort,
}

/// Resolves once a chunk has been handed to the current hop.
///
/// Also resolves if the chain ends before that happens; errors are reported on the
/// event stream.
#[derive(Debug)]
pub struct Written {
    ack: Option<oneshot::Receiver<()>>,
}

impl Written {
    fn ready() -> Self {
        Written { ack: None }
    }

    fn pending(ack: oneshot::Receiver<()>) -> Self {
        Written { ack: Some(ack) }
    }
}

impl Future for Written {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        match self.ack.as_mut() {
            Some(ack) => Pin::new(ack).poll(cx).map(|_| ()),
            None => Poll::Ready(()),
        }
    }
}

/// Aborts a request from elsewhere, e.g. another task.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    commands: mpsc::WeakUnboundedSender<Command>,
    shared: Shared,
}

impl AbortHandle {
    /// Abort the request. Later calls do nothing.
    pub fn abort(&self) {
        if let Some(commands) = self.commands.upgrade() {
            abort(&commands, &self.shared);
        }
    }
}

fn abort(commands: &mpsc::UnboundedSender<Command>, shared: &Shared) {
    {
        let mut state = shared.lock();
        if state.aborted_at.is_some() {
            return;
        }
        state.aborted_at = Some(SystemTime::now());
    }
    let _ = commands.send(Command::Abort);
}

/// A request that follows redirects behind one object.
pub struct RedirectableRequest {
    id: Uuid,
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<RequestEvent>,
    shared: Shared,
    abort_delivered: bool,
}

impl RedirectableRequest {
    /// Start the controller task and issue the first hop.
    pub(crate) fn spawn(descriptor: Descriptor, bindings: Arc<BindingRegistry>) -> Self {
        let id = Uuid::new_v4();
        let shared = shared_state(&descriptor.request);
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (event_tx, events) = mpsc::unbounded_channel();

        let controller = Controller::new(id, descriptor, bindings, Arc::clone(&shared), command_rx, event_tx);
        tokio::spawn(controller.run());

        RedirectableRequest {
            id,
            commands,
            events,
            shared,
            abort_delivered: false,
        }
    }

    /// Identifier of this request, also attached to its log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Write a body chunk.
    ///
    /// # Errors
    ///
    /// [`FollowError::WriteAfterEnd`] once [`end`](Self::end) has been called. A body
    /// that outgrows `max_body_length` is reported on the event stream instead.
    pub fn write(&self, chunk: impl Into<Chunk>) -> Result<Written> {
        if self.shared.lock().ended {
            return Err(FollowError::WriteAfterEnd);
        }
        Ok(self.send_chunk(chunk.into()))
    }

    /// Write text given in `encoding` (`"utf8"`, `"latin1"`, `"base64"`).
    ///
    /// # Errors
    ///
    /// [`FollowError::InvalidChunk`] for an unknown encoding or text that does not
    /// decode; otherwise as [`write`](Self::write).
    pub fn write_encoded(&self, text: &str, encoding: &str) -> Result<Written> {
        let chunk = Chunk::encoded(text, encoding)?;
        self.write(chunk)
    }

    /// Finish the body.
    ///
    /// Calling `end` again without data does nothing.
    pub fn end(&self) -> Result<Written> {
        self.finish(None)
    }

    /// Write a last chunk and finish the body.
    ///
    /// # Errors
    ///
    /// [`FollowError::WriteAfterEnd`] if the body was already finished.
    pub fn end_with(&self, chunk: impl Into<Chunk>) -> Result<Written> {
        self.finish(Some(chunk.into()))
    }

    /// Write a last chunk of encoded text and finish the body.
    pub fn end_encoded(&self, text: &str, encoding: &str) -> Result<Written> {
        let chunk = Chunk::encoded(text, encoding)?;
        self.end_with(chunk)
    }

    fn send_chunk(&self, chunk: Chunk) -> Written {
        if chunk.is_empty() {
            return Written::ready();
        }
        let (done, ack) = oneshot::channel();
        match self.commands.send(Command::Write {
            chunk: chunk.into_bytes(),
            done,
        }) {
            Ok(()) => Written::pending(ack),
            Err(_) => Written::ready(),
        }
    }

    fn finish(&self, chunk: Option<Chunk>) -> Result<Written> {
        {
            let mut state = self.shared.lock();
            if state.ended {
                return match chunk {
                    Some(chunk) if !chunk.is_empty() => Err(FollowError::WriteAfterEnd),
                    _ => Ok(Written::ready()),
                };
            }
            state.ended = true;
        }
        let chunk = chunk.filter(|chunk| !chunk.is_empty()).map(Chunk::into_bytes);
        let (done, ack) = oneshot::channel();
        match self.commands.send(Command::End { chunk, done }) {
            Ok(()) => Ok(Written::pending(ack)),
            Err(_) => Ok(Written::ready()),
        }
    }

    /// Abort the request: cancel the current hop and emit one [`RequestEvent::Abort`].
    ///
    /// After the final response was delivered only the abort time is recorded.
    pub fn abort(&self) {
        abort(&self.commands, &self.shared);
    }

    /// When the request was aborted, if it was.
    pub fn aborted(&self) -> Option<SystemTime> {
        self.shared.lock().aborted_at
    }

    /// Handle that aborts this request without borrowing it.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            commands: self.commands.downgrade(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Time out the current hop, and every later one, after `timeout` without a
    /// response.
    pub fn set_timeout(&self, timeout: Duration) {
        self.control(ControlOp::SetTimeout(timeout));
    }

    /// Toggle Nagle's algorithm for the current and later hops.
    pub fn set_no_delay(&self, no_delay: bool) {
        self.control(ControlOp::SetNoDelay(no_delay));
    }

    /// Toggle TCP keep-alive for the current and later hops.
    pub fn set_socket_keep_alive(&self, enable: bool, initial_delay: Option<Duration>) {
        self.control(ControlOp::SetKeepAlive(enable, initial_delay));
    }

    /// Send the request head of the current hop without waiting for the body.
    pub fn flush_headers(&self) {
        self.control(ControlOp::FlushHeaders);
    }

    /// Header of the current hop.
    pub fn get_header(&self, name: &str) -> Option<HeaderValue> {
        self.shared.lock().headers.get(name).cloned()
    }

    /// Set a header on the current hop and every later one.
    ///
    /// A hop whose head was already sent keeps its headers; the change applies from the
    /// next hop on.
    ///
    /// # Errors
    ///
    /// [`FollowError::InvalidHeader`] for a malformed name or value.
    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        let (name, value) = parse_header(name, value)?;
        self.shared.lock().headers.insert(name.clone(), value.clone());
        self.control(ControlOp::SetHeader(name, value));
        Ok(())
    }

    /// Remove a header from the current hop and every later one.
    pub fn remove_header(&self, name: &str) {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            return;
        };
        self.shared.lock().headers.remove(&name);
        self.control(ControlOp::RemoveHeader(name));
    }

    fn control(&self, op: ControlOp) {
        let _ = self.commands.send(Command::Control(op));
    }

    /// Connection of the current hop, once known.
    pub fn socket(&self) -> Option<SocketInfo> {
        self.shared.lock().socket
    }

    /// Alias of [`socket`](Self::socket).
    pub fn connection(&self) -> Option<SocketInfo> {
        self.socket()
    }

    /// Lifecycle phase of the chain.
    pub fn phase(&self) -> Phase {
        self.shared.lock().phase
    }

    /// URL of the current hop.
    pub fn url(&self) -> Url {
        self.shared.lock().url.clone()
    }

    /// Method of the current hop.
    pub fn method(&self) -> Method {
        self.shared.lock().method.clone()
    }

    /// Index of the current hop, starting at zero.
    pub fn hop(&self) -> usize {
        self.shared.lock().hop
    }

    /// Pool used by each hop issued so far.
    pub fn pool_usage(&self) -> Vec<PoolUsage> {
        self.shared.lock().pool_usage.clone()
    }

    /// Next event, or `None` once the final response, error or abort has been delivered.
    pub async fn next_event(&mut self) -> Option<RequestEvent> {
        self.next().await
    }

    /// Wait for the final response, skipping socket events.
    ///
    /// # Errors
    ///
    /// The error the chain failed with, or [`FollowError::Aborted`] if it was aborted.
    pub async fn response(&mut self) -> Result<RedirectResponse> {
        while let Some(event) = self.next().await {
            match event {
                RequestEvent::Socket(_) => continue,
                RequestEvent::Response(response) => return Ok(response),
                RequestEvent::Error(err) => return Err(err),
                RequestEvent::Abort => return Err(FollowError::Aborted),
            }
        }
        if self.aborted().is_some() {
            return Err(FollowError::Aborted);
        }
        Err(TransportError::new(TransportErrorKind::Other, "request closed without a response").into())
    }

    /// Filter applied to every event before it reaches the caller.
    fn admit(&mut self, event: RequestEvent) -> Option<RequestEvent> {
        let aborted = self.shared.lock().aborted_at.is_some();
        match event {
            RequestEvent::Abort if !self.abort_delivered => {
                self.abort_delivered = true;
                Some(RequestEvent::Abort)
            }
            RequestEvent::Abort => None,
            _ if aborted => {
                tracing::trace!(request_id = %self.id, "dropping event after abort");
                None
            }
            event => Some(event),
        }
    }
}

impl Stream for RedirectableRequest {
    type Item = RequestEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match self.events.poll_recv(cx) {
                Poll::Ready(Some(event)) => {
                    if let Some(event) = self.admit(event) {
                        return Poll::Ready(Some(event));
                    }
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl std::fmt::Debug for RedirectableRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("RedirectableRequest")
            .field("id", &self.id)
            .field("phase", &state.phase)
            .field("hop", &state.hop)
            .field("url", &state.url.as_str())
            .finish_non_exhaustive()
    }
}
