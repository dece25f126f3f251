//! The per-request controller task.
//!
//! Every [`RedirectableRequest`](crate::RedirectableRequest) is backed by one tokio task
//! running [`Controller::run`]. The facade never touches an underlying handle; it sends
//! [`Command`]s and reads [`RequestEvent`]s, so swapping handles between hops is
//! invisible to the caller.
//!
//! ```text
//!            commands                   HopRequest
//! facade ─────────────────▶ controller ───────────▶ binding
//!        ◀─────────────────            ◀───────────
//!           RequestEvent                HopSignal { hop, event }
//! ```
//!
//! # Phases
//!
//! | Phase | Meaning |
//! |-------|---------|
//! | `Accumulating` | a hop is open and the caller is still writing the body |
//! | `InFlight` | the body is complete, waiting for the response head |
//! | `Evaluating` | a response head arrived and is being checked for a redirect |
//! | `Redirecting` | the next hop is being prepared |
//! | `Responded` | the final response was handed to the caller; the controller stops |
//! | `Aborted` | the caller aborted |
//! | `Errored` | the chain failed |
//! | `Done` | the controller stopped after the facade was dropped |
//!
//! Signals carry the index of the hop they belong to. Anything tagged with an earlier
//! hop, or arriving after the chain failed or was aborted, is dropped. Commands are
//! polled before signals, and an abort recorded by the facade wins over any hop event
//! still queued.

use crate::body::BodyBuffer;
use crate::client::request::RequestEvent;
use crate::client::response::RedirectResponse;
use crate::error::FollowError;
use crate::history::RedirectHistory;
use crate::options::{BeforeRedirect, Descriptor};
use crate::policy::{self, CredentialPolicy, Decision, RedirectPlan};
use crate::pool::{PoolSelector, PoolUsage};
use crate::transport::{BindingRegistry, HopEvent, HopEvents, HopSignal, IncomingResponse, UnderlyingRequest};
use crate::types::{HopRequest, RedirectRecord, ResponseDetails, SocketInfo};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

/// Lifecycle phase of a redirect chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// A hop is open and the body is still being written.
    Accumulating,
    /// The body is complete; waiting for a response.
    InFlight,
    /// A response arrived and is being evaluated.
    Evaluating,
    /// The next hop is being prepared.
    Redirecting,
    /// The final response was delivered.
    Responded,
    /// The caller aborted the request.
    Aborted,
    /// The chain failed.
    Errored,
    /// The controller has shut down.
    Done,
}

impl Phase {
    /// Whether no further hop will be issued.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Phase::Responded | Phase::Aborted | Phase::Errored | Phase::Done
        )
    }
}

/// Requests from the facade to the controller.
pub(crate) enum Command {
    Write {
        chunk: Bytes,
        done: oneshot::Sender<()>,
    },
    End {
        chunk: Option<Bytes>,
        done: oneshot::Sender<()>,
    },
    Control(ControlOp),
    Abort,
}

/// Calls forwarded to the active handle.
#[derive(Debug, Clone)]
pub(crate) enum ControlOp {
    SetTimeout(Duration),
    SetNoDelay(bool),
    SetKeepAlive(bool, Option<Duration>),
    FlushHeaders,
    SetHeader(HeaderName, HeaderValue),
    RemoveHeader(HeaderName),
}

/// Socket settings the caller made, replayed onto every later hop.
#[derive(Debug, Default)]
struct ControlLog {
    timeout: Option<Duration>,
    no_delay: Option<bool>,
    keep_alive: Option<(bool, Option<Duration>)>,
    flushed: bool,
}

impl ControlLog {
    fn replay(&self, handle: &mut dyn UnderlyingRequest) {
        if let Some(timeout) = self.timeout {
            handle.set_timeout(timeout);
        }
        if let Some(no_delay) = self.no_delay {
            handle.set_no_delay(no_delay);
        }
        if let Some((enable, delay)) = self.keep_alive {
            handle.set_socket_keep_alive(enable, delay);
        }
        if self.flushed {
            handle.flush_headers();
        }
    }
}

/// State the facade reads synchronously.
#[derive(Debug)]
pub(crate) struct SharedState {
    pub(crate) phase: Phase,
    pub(crate) hop: usize,
    pub(crate) url: Url,
    pub(crate) method: Method,
    pub(crate) headers: HeaderMap,
    pub(crate) socket: Option<SocketInfo>,
    pub(crate) ended: bool,
    pub(crate) aborted_at: Option<SystemTime>,
    pub(crate) pool_usage: Vec<PoolUsage>,
}

pub(crate) type Shared = Arc<Mutex<SharedState>>;

pub(crate) fn shared_state(request: &HopRequest) -> Shared {
    Arc::new(Mutex::new(SharedState {
        phase: Phase::Accumulating,
        hop: 0,
        url: request.url.clone(),
        method: request.method.clone(),
        headers: request.headers.clone(),
        socket: None,
        ended: false,
        aborted_at: None,
        pool_usage: Vec::new(),
    }))
}

/// Drives one redirect chain.
pub(crate) struct Controller {
    id: Uuid,
    bindings: Arc<BindingRegistry>,
    max_redirects: usize,
    follow_redirects: bool,
    before_redirect: Option<BeforeRedirect>,
    credential_policy: CredentialPolicy,
    pools: PoolSelector,
    body: BodyBuffer,
    history: RedirectHistory,
    current: HopRequest,
    hop: usize,
    handle: Option<Box<dyn UnderlyingRequest>>,
    controls: ControlLog,
    ended: bool,
    phase: Phase,
    shared: Shared,
    commands: mpsc::UnboundedReceiver<Command>,
    signal_tx: mpsc::UnboundedSender<HopSignal>,
    signals: mpsc::UnboundedReceiver<HopSignal>,
    events: mpsc::UnboundedSender<RequestEvent>,
}

impl Controller {
    pub(crate) fn new(
        id: Uuid,
        descriptor: Descriptor,
        bindings: Arc<BindingRegistry>,
        shared: Shared,
        commands: mpsc::UnboundedReceiver<Command>,
        events: mpsc::UnboundedSender<RequestEvent>,
    ) -> Self {
        let (signal_tx, signals) = mpsc::unbounded_channel();
        Controller {
            id,
            bindings,
            max_redirects: descriptor.max_redirects,
            follow_redirects: descriptor.follow_redirects,
            before_redirect: descriptor.before_redirect,
            credential_policy: descriptor.credential_policy,
            pools: PoolSelector::new(descriptor.agents),
            body: BodyBuffer::new(descriptor.max_body_length),
            history: RedirectHistory::new(descriptor.track_redirects),
            current: descriptor.request,
            hop: 0,
            handle: None,
            controls: ControlLog::default(),
            ended: false,
            phase: Phase::Accumulating,
            shared,
            commands,
            signal_tx,
            signals,
            events,
        }
    }

    /// Issue the first hop and process commands and signals until the chain is over.
    pub(crate) async fn run(mut self) {
        let span = tracing::debug_span!("redirect_chain", request_id = %self.id);
        async move {
            self.issue_hop(false);

            while !matches!(self.phase, Phase::Responded | Phase::Aborted | Phase::Errored) {
                tokio::select! {
                    biased;
                    command = self.commands.recv() => match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            self.detach();
                            break;
                        }
                    },
                    Some(signal) = self.signals.recv() => self.handle_signal(signal),
                }
            }
            tracing::trace!(hop = self.hop, phase = ?self.phase, "controller stopped");
        }
        .instrument(span)
        .await
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
        self.shared.lock().phase = phase;
    }

    fn emit(&self, event: RequestEvent) {
        let _ = self.events.send(event);
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Write { chunk, done } => {
                if self.accept_chunk(chunk) {
                    let _ = done.send(());
                }
            }
            Command::End { chunk, done } => {
                if let Some(chunk) = chunk {
                    if !self.accept_chunk(chunk) {
                        return;
                    }
                }
                self.finish_body();
                let _ = done.send(());
            }
            Command::Control(op) => self.apply_control(op),
            Command::Abort => self.abort(),
        }
    }

    /// Buffer a chunk and forward it to the active handle. Returns `false` if the chain
    /// failed on it.
    fn accept_chunk(&mut self, chunk: Bytes) -> bool {
        if self.phase.is_terminal() || chunk.is_empty() {
            return !matches!(self.phase, Phase::Errored);
        }
        if let Err(err) = self.body.push(chunk.clone()) {
            self.fail(err);
            return false;
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.write(chunk);
        }
        true
    }

    fn finish_body(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.shared.lock().ended = true;
        if self.phase.is_terminal() {
            return;
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.end();
        }
        if matches!(self.current.method, Method::GET | Method::HEAD) {
            self.body.release();
        }
        if self.phase == Phase::Accumulating {
            self.set_phase(Phase::InFlight);
        }
        tracing::debug!(hop = self.hop, bytes = self.body.total(), "request body finished");
    }

    fn apply_control(&mut self, op: ControlOp) {
        match &op {
            ControlOp::SetTimeout(timeout) => self.controls.timeout = Some(*timeout),
            ControlOp::SetNoDelay(no_delay) => self.controls.no_delay = Some(*no_delay),
            ControlOp::SetKeepAlive(enable, delay) => self.controls.keep_alive = Some((*enable, *delay)),
            ControlOp::FlushHeaders => self.controls.flushed = true,
            ControlOp::SetHeader(name, value) => {
                self.current.headers.insert(name.clone(), value.clone());
                self.shared.lock().headers.insert(name.clone(), value.clone());
            }
            ControlOp::RemoveHeader(name) => {
                self.current.headers.remove(name);
                self.shared.lock().headers.remove(name);
            }
        }

        let Some(handle) = self.handle.as_mut() else {
            return;
        };
        match op {
            ControlOp::SetTimeout(timeout) => handle.set_timeout(timeout),
            ControlOp::SetNoDelay(no_delay) => handle.set_no_delay(no_delay),
            ControlOp::SetKeepAlive(enable, delay) => handle.set_socket_keep_alive(enable, delay),
            ControlOp::FlushHeaders => handle.flush_headers(),
            ControlOp::SetHeader(name, value) => handle.set_header(name, value),
            ControlOp::RemoveHeader(name) => handle.remove_header(&name),
        }
    }

    fn abort(&mut self) {
        if matches!(self.phase, Phase::Aborted | Phase::Errored) {
            return;
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.abort();
        }
        self.body.release();
        {
            let mut shared = self.shared.lock();
            shared.aborted_at.get_or_insert_with(SystemTime::now);
        }
        self.set_phase(Phase::Aborted);
        tracing::debug!(hop = self.hop, "request aborted");
        self.emit(RequestEvent::Abort);
    }

    /// The facade is gone; stop the hop unless its response was already delivered.
    fn detach(&mut self) {
        if self.phase != Phase::Responded {
            if let Some(handle) = self.handle.as_mut() {
                handle.abort();
            }
        }
        self.body.release();
        self.set_phase(Phase::Done);
    }

    fn fail(&mut self, err: FollowError) {
        if matches!(self.phase, Phase::Aborted | Phase::Errored) {
            return;
        }
        if self.abort_requested() {
            tracing::trace!(hop = self.hop, error = %err, "failure after abort suppressed");
            return self.abort();
        }
        tracing::debug!(hop = self.hop, code = err.code(), error = %err, "redirect chain failed");
        if let Some(handle) = self.handle.as_mut() {
            handle.abort();
        }
        self.body.release();
        self.set_phase(Phase::Errored);
        self.emit(RequestEvent::Error(err));
    }

    /// The facade records the abort time before the command is queued.
    fn abort_requested(&self) -> bool {
        self.shared.lock().aborted_at.is_some()
    }

    fn handle_signal(&mut self, signal: HopSignal) {
        if self.abort_requested() {
            return self.abort();
        }
        if signal.hop != self.hop || matches!(self.phase, Phase::Aborted | Phase::Errored | Phase::Done) {
            tracing::trace!(hop = signal.hop, current = self.hop, "dropping stale hop event");
            return;
        }
        match signal.event {
            HopEvent::Socket(info) => {
                self.shared.lock().socket = Some(info);
                self.emit(RequestEvent::Socket(info));
            }
            HopEvent::Response(response) => self.on_response(response),
            HopEvent::Error(err) => self.fail(FollowError::Connection(err)),
        }
    }

    fn on_response(&mut self, response: IncomingResponse) {
        self.set_phase(Phase::Evaluating);
        let IncomingResponse {
            status,
            headers,
            body,
        } = response;
        self.history
            .record(|| RedirectRecord::new(&self.current.url, status, &headers));

        let decision = if self.follow_redirects {
            match policy::evaluate(status, &headers, &self.current, self.credential_policy) {
                Ok(decision) => decision,
                Err(err) => return self.fail(err),
            }
        } else {
            Decision::Terminal
        };

        match decision {
            Decision::Terminal => {
                self.body.release();
                self.set_phase(Phase::Responded);
                tracing::debug!(hop = self.hop, %status, url = %self.current.url, "response delivered");
                self.emit(RequestEvent::Response(RedirectResponse::new(
                    status,
                    headers,
                    body,
                    self.current.url.clone(),
                    self.history.snapshot(),
                )));
            }
            Decision::Redirect(plan) => {
                // Nothing reads a redirect's body; dropping it releases the connection.
                drop(body);
                self.redirect(plan, headers);
            }
        }
    }

    fn redirect(&mut self, plan: RedirectPlan, headers: HeaderMap) {
        if self.hop >= self.max_redirects {
            return self.fail(FollowError::TooManyRedirects {
                limit: self.max_redirects,
            });
        }
        self.set_phase(Phase::Redirecting);

        let RedirectPlan {
            status,
            request: mut next,
            downgraded,
        } = plan;
        tracing::debug!(
            hop = self.hop,
            %status,
            from = %self.current.url,
            to = %next.url,
            method = %next.method,
            downgraded,
            "following redirect"
        );

        if let Some(hook) = self.before_redirect.clone() {
            let details = ResponseDetails { status, headers };
            let scheme = next.url.scheme().to_string();
            hook(&mut next, &details, &self.current);
            if next.url.scheme() != scheme {
                tracing::warn!(
                    hop = self.hop,
                    from = %scheme,
                    to = next.url.scheme(),
                    "redirect hook changed the protocol"
                );
            }
        }

        if downgraded {
            self.body.release();
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.abort();
        }
        self.current = next;
        self.hop += 1;
        self.issue_hop(!downgraded);
    }

    fn issue_hop(&mut self, replay_body: bool) {
        let binding = match self.bindings.binding_for(&self.current.url) {
            Ok(binding) => binding,
            Err(err) => return self.fail(err),
        };
        let (agent, usage) = self.pools.select(self.hop, &self.current.url, binding.as_ref());
        tracing::debug!(
            hop = self.hop,
            method = %self.current.method,
            url = %self.current.url,
            agent = %usage.agent,
            "issuing hop"
        );

        let phase = if self.ended {
            Phase::InFlight
        } else {
            Phase::Accumulating
        };
        {
            let mut shared = self.shared.lock();
            if self.hop > 0 {
                shared.hop = self.hop;
                shared.url = self.current.url.clone();
                shared.method = self.current.method.clone();
                shared.headers = self.current.headers.clone();
                shared.socket = None;
            }
            shared.pool_usage.push(usage);
        }
        self.set_phase(phase);

        let events = HopEvents::new(self.hop, self.signal_tx.clone());
        let mut handle = binding.issue(self.current.clone(), agent, events);
        self.controls.replay(handle.as_mut());
        if replay_body {
            for chunk in self.body.chunks() {
                handle.write(chunk.clone());
            }
        }
        if self.ended {
            handle.end();
        }
        self.handle = Some(handle);
    }
}
