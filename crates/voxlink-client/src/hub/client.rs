//! Control channel engine.
//!
//! Responsibilities:
//! - negotiate / connect / close lifecycle with cancellation and bounded waits
//! - one read loop per socket: decode records, classify, pin sessions, emit events
//! - a single serialized write path shared by every outgoing message
//! - keepalive pings while the socket is open
//!
//! Events never reach subscribers directly from the read loop or the send
//! path; both push into the event pump, which dispatches one record at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use voxlink_core::error::{Result, VoxlinkError};
use voxlink_core::protocol::envelope::{Envelope, HandshakeRequest};
use voxlink_core::protocol::frame::{self, RecordDecoder};
use voxlink_core::protocol::incoming::{
    classify, EventRecord, Inbound, Phase, ServerEventKind, CLIENT_SEND_EVENT, CLOSE_EVENT,
    READY_EVENT,
};
use voxlink_core::protocol::outgoing::ClientMessage;

use crate::config::VoxlinkConfig;
use crate::dispatch::{BoxError, Dispatcher, SubscriptionHandle};
use crate::hub::state::ConnectionState;
use crate::session::SessionPinner;
use crate::transport::{
    channel_url, ConnectRequest, Connector, FrameSink, FrameStream, HttpNegotiator, Negotiation,
    Negotiator, WireFrame, WsConnector,
};

/// One logical hub connection. Cheap to clone; clones share the connection.
#[derive(Clone)]
pub struct HubClient {
    inner: Arc<Inner>,
}

struct Inner {
    cfg: VoxlinkConfig,
    connector: Arc<dyn Connector>,
    negotiator: Arc<dyn Negotiator>,
    dispatcher: Arc<Dispatcher>,
    pinner: SessionPinner,
    state: watch::Sender<ConnectionState>,
    writer: tokio::sync::Mutex<Option<Box<dyn FrameSink>>>,
    events: mpsc::UnboundedSender<EventRecord>,
    live: Mutex<Option<Live>>,
}

/// Read loop of the current socket.
struct Live {
    shutdown: CancellationToken,
    finished: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

/// Why a read loop stopped.
struct Ending {
    state: ConnectionState,
    reason: String,
    error: Option<String>,
    allow_reconnect: bool,
}

impl Ending {
    fn closed(reason: impl Into<String>) -> Self {
        Self {
            state: ConnectionState::Closed,
            reason: reason.into(),
            error: None,
            allow_reconnect: false,
        }
    }
}

fn spawn_pump(dispatcher: Arc<Dispatcher>) -> mpsc::UnboundedSender<EventRecord> {
    let (tx, mut rx) = mpsc::unbounded_channel::<EventRecord>();
    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            dispatcher.dispatch(record).await;
        }
        tracing::debug!("event pump stopped");
    });
    tx
}

/// Wait until a pending connect can stop waiting.
async fn wait_settled(mut rx: watch::Receiver<ConnectionState>) -> ConnectionState {
    loop {
        let current = *rx.borrow_and_update();
        if current.is_settled() {
            return current;
        }
        if rx.changed().await.is_err() {
            return *rx.borrow();
        }
    }
}

impl HubClient {
    /// Engine over real WebSocket and HTTP transports.
    ///
    /// Must be called inside a Tokio runtime (the event pump is spawned here).
    pub fn new(cfg: VoxlinkConfig) -> Result<Self> {
        let negotiator = HttpNegotiator::new(&cfg.hub)?;
        Ok(Self::with_transport(
            cfg,
            Arc::new(WsConnector),
            Arc::new(negotiator),
        ))
    }

    pub fn with_transport(
        cfg: VoxlinkConfig,
        connector: Arc<dyn Connector>,
        negotiator: Arc<dyn Negotiator>,
    ) -> Self {
        let dispatcher = Arc::new(Dispatcher::new());
        let events = spawn_pump(dispatcher.clone());
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                cfg,
                connector,
                negotiator,
                dispatcher,
                pinner: SessionPinner::new(),
                state,
                writer: tokio::sync::Mutex::new(None),
                events,
                live: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &VoxlinkConfig {
        &self.inner.cfg
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn pinner(&self) -> &SessionPinner {
        &self.inner.pinner
    }

    /// Most recently pinned session id.
    pub fn session_id(&self) -> Option<String> {
        self.inner.pinner.get()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    /// Subscribe to a named event.
    pub fn on<F, Fut>(&self, event: impl Into<String>, f: F) -> SubscriptionHandle
    where
        F: Fn(EventRecord) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = std::result::Result<(), BoxError>> + Send + 'static,
    {
        self.inner.dispatcher.subscribe(event, f)
    }

    pub fn off(&self, handle: &SubscriptionHandle) -> bool {
        self.inner.dispatcher.unsubscribe(handle)
    }

    // --------------------
    // Lifecycle
    // --------------------

    /// Obtain a connection token. The engine returns to `Disconnected`
    /// afterwards; the token may be reused for several `connect` calls.
    pub async fn negotiate(&self, cancel: &CancellationToken) -> Result<Negotiation> {
        self.transition(ConnectionState::is_idle, ConnectionState::Negotiating)
            .map_err(|s| VoxlinkError::NotReady(format!("cannot negotiate while {s}")))?;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VoxlinkError::Cancelled),
            r = self.inner.negotiator.negotiate() => r,
        };
        self.set_state(ConnectionState::Disconnected);

        match &outcome {
            Ok(n) => tracing::info!(cookies = n.cookies.len(), "negotiated"),
            Err(e) => tracing::warn!(error = %e, "negotiation failed"),
        }
        outcome
    }

    /// Open the control socket, handshake, authenticate and wait for `welcome`.
    pub async fn connect(&self, negotiation: &Negotiation, cancel: &CancellationToken) -> Result<()> {
        let hub = &self.inner.cfg.hub;
        let url = channel_url(&hub.url, &hub.hub_path, &negotiation.token)?;

        self.transition(ConnectionState::is_idle, ConnectionState::SocketOpen)
            .map_err(|s| VoxlinkError::NotReady(format!("cannot connect while {s}")))?;
        tracing::info!(url = %hub.url, path = %hub.hub_path, "connecting");

        let request = ConnectRequest::new(url, negotiation.cookies.clone());
        let open_timeout = Duration::from_millis(hub.connect_timeout_ms);
        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VoxlinkError::Cancelled),
            r = tokio::time::timeout(open_timeout, self.inner.connector.connect(&request)) => {
                r.unwrap_or_else(|_| Err(VoxlinkError::Timeout("socket open".into())))
            }
        };

        let (sink, stream) = match opened {
            Ok(halves) => halves,
            Err(e) => {
                let next = match e {
                    VoxlinkError::Cancelled | VoxlinkError::Timeout(_) => {
                        ConnectionState::Disconnected
                    }
                    _ => ConnectionState::Failed,
                };
                self.set_state(next);
                tracing::warn!(error = %e, "socket open failed");
                return Err(e);
            }
        };

        *self.inner.writer.lock().await = Some(sink);
        self.spawn_read_loop(stream);

        match self.authenticate(cancel).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, "connect aborted");
                self.teardown().await;
                Err(e)
            }
        }
    }

    async fn authenticate(&self, cancel: &CancellationToken) -> Result<()> {
        let handshake = frame::encode_text(&HandshakeRequest::default())?;
        self.write(WireFrame::Text(handshake)).await?;
        tracing::debug!("handshake sent");

        self.transition(
            |s| s == ConnectionState::SocketOpen,
            ConnectionState::Authenticating,
        )
        .map_err(|s| VoxlinkError::TransportClosed(format!("connection {s} during handshake")))?;

        self.send(self.authenticate_message()).await?;
        tracing::info!(client = %self.inner.cfg.client.name, "authenticate sent");

        let ready_timeout = Duration::from_millis(self.inner.cfg.hub.ready_timeout_ms);
        let settled = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(VoxlinkError::Cancelled),
            r = tokio::time::timeout(ready_timeout, wait_settled(self.watch_state())) => match r {
                Ok(s) => s,
                Err(_) => return Err(VoxlinkError::Timeout("waiting for welcome".into())),
            },
        };

        match settled {
            ConnectionState::Ready => {
                tracing::info!("hub ready");
                Ok(())
            }
            ConnectionState::Failed => Err(VoxlinkError::NegotiationFailed(
                "handshake rejected by server".into(),
            )),
            other => Err(VoxlinkError::TransportClosed(format!(
                "connection {other} before welcome"
            ))),
        }
    }

    fn authenticate_message(&self) -> ClientMessage {
        let c = &self.inner.cfg.client;
        ClientMessage::Authenticate {
            client: c.name.clone(),
            client_version: c.version.clone(),
            scope: c.scope.clone(),
            capabilities: c.capabilities_or_default(),
        }
    }

    /// Graceful shutdown. In-flight sends are not flushed.
    ///
    /// No-op when no socket is open. The read loop gets `close_timeout_ms`
    /// to stop before it is aborted; either way the engine ends `Closed`.
    /// Cancelling `cancel` cuts the wait short and returns `Cancelled`.
    pub async fn close(&self, cancel: &CancellationToken) -> Result<()> {
        let Some(live) = self.take_live() else {
            tracing::debug!("close: no open connection");
            return Ok(());
        };

        let _ = self.transition(ConnectionState::is_open, ConnectionState::Closing);
        tracing::info!("closing hub connection");
        live.shutdown.cancel();

        let Live {
            finished, mut task, ..
        } = live;
        let close_timeout = Duration::from_millis(self.inner.cfg.hub.close_timeout_ms);
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(VoxlinkError::Cancelled),
            r = tokio::time::timeout(close_timeout, &mut task) => {
                if r.is_err() {
                    tracing::warn!("read loop did not stop in time");
                }
                Ok(())
            }
        };

        if !task.is_finished() {
            task.abort();
            self.finish(&finished, Ending::closed("closed by client (forced)"));
        }
        outcome
    }

    async fn teardown(&self) {
        let _ = self.close(&CancellationToken::new()).await;
    }

    // --------------------
    // Send path
    // --------------------

    /// Validate, wrap and write one message. Returns its invocation id.
    ///
    /// `client_send` is emitted right before the write.
    pub async fn send(&self, msg: ClientMessage) -> Result<String> {
        msg.validate()?;

        let state = self.state();
        let permitted = match state {
            ConnectionState::Ready => true,
            ConnectionState::Authenticating => matches!(msg, ClientMessage::Authenticate { .. }),
            _ => false,
        };
        if !permitted {
            return Err(VoxlinkError::NotReady(state.to_string()));
        }

        let invocation_id = Uuid::new_v4().to_string();
        let env = msg.to_envelope(invocation_id.clone())?;
        let text = env.to_text()?;

        let mut observed = env.arguments.into_iter().next().unwrap_or(Value::Null);
        if let Some(obj) = observed.as_object_mut() {
            obj.insert(
                "invocationId".into(),
                Value::String(invocation_id.clone()),
            );
        }
        self.emit(EventRecord::new(CLIENT_SEND_EVENT, observed));

        tracing::debug!(message = msg.wire_type(), invocation_id = %invocation_id, "sending");
        self.write(WireFrame::Text(text)).await?;
        Ok(invocation_id)
    }

    async fn write_envelope(&self, env: &Envelope) -> Result<()> {
        self.write(WireFrame::Text(env.to_text()?)).await
    }

    /// Single serialized writer. A failed write drops the sink and tells the
    /// read loop to end the connection. A write still pending when the
    /// connection shuts down is abandoned and the sink dropped.
    async fn write(&self, frame: WireFrame) -> Result<()> {
        let shutdown = self.shutdown_token();
        let mut guard = self.inner.writer.lock().await;
        let Some(sink) = guard.as_mut() else {
            return Err(VoxlinkError::TransportClosed("socket not open".into()));
        };

        let sent = tokio::select! {
            r = sink.send(frame) => Some(r),
            _ = shutdown.cancelled() => None,
        };
        match sent {
            None => {
                guard.take();
                Err(VoxlinkError::TransportClosed("connection closing".into()))
            }
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => {
                guard.take();
                drop(guard);
                tracing::warn!(error = %e, "socket write failed");
                self.signal_shutdown();
                Err(match e {
                    VoxlinkError::TransportClosed(_) => e,
                    other => VoxlinkError::TransportClosed(other.to_string()),
                })
            }
        }
    }

    /// Send the close frame, giving up after `close_timeout_ms`.
    async fn close_writer(&self) {
        let close_timeout = Duration::from_millis(self.inner.cfg.hub.close_timeout_ms);
        let closing = async {
            let sink = self.inner.writer.lock().await.take();
            if let Some(mut sink) = sink {
                if let Err(e) = sink.close().await {
                    tracing::debug!(error = %e, "close frame not sent");
                }
            }
        };
        if tokio::time::timeout(close_timeout, closing).await.is_err() {
            tracing::warn!("close frame timed out");
        }
    }

    // --------------------
    // Read loop
    // --------------------

    fn spawn_read_loop(&self, stream: Box<dyn FrameStream>) {
        let shutdown = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(
            self.clone()
                .read_loop(stream, shutdown.clone(), finished.clone()),
        );
        *self.lock_live() = Some(Live {
            shutdown,
            finished,
            task,
        });
    }

    async fn read_loop(
        self,
        mut stream: Box<dyn FrameStream>,
        shutdown: CancellationToken,
        finished: Arc<AtomicBool>,
    ) {
        let hub = &self.inner.cfg.hub;
        let mut decoder = RecordDecoder::with_max_record_bytes(hub.max_record_bytes);

        let every = Duration::from_millis(hub.keepalive_interval_ms);
        let mut keepalive = tokio::time::interval_at(Instant::now() + every, every);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut phase = Phase::Handshake;
        let ending = loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    let reason = if self.state() == ConnectionState::Closing {
                        "closed by client"
                    } else {
                        "socket write failed"
                    };
                    self.close_writer().await;
                    break Ending::closed(reason);
                }

                _ = keepalive.tick() => {
                    if let Err(e) = self.write_envelope(&Envelope::ping()).await {
                        break Ending::closed(e.to_string());
                    }
                    tracing::trace!("keepalive ping sent");
                }

                incoming = stream.recv() => match incoming {
                    None => break Ending::closed("socket closed"),
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "socket read failed");
                        break Ending::closed(e.to_string());
                    }
                    Some(Ok(WireFrame::Close(reason))) => {
                        break Ending::closed(reason.unwrap_or_else(|| "socket closed by server".into()));
                    }
                    Some(Ok(WireFrame::Text(text))) => {
                        if let Some(end) = self.on_bytes(&mut decoder, &mut phase, text.as_bytes()).await {
                            break end;
                        }
                    }
                    Some(Ok(WireFrame::Binary(bytes))) => {
                        if let Some(end) = self.on_bytes(&mut decoder, &mut phase, &bytes).await {
                            break end;
                        }
                    }
                },
            }
        };

        self.finish(&finished, ending);
    }

    async fn on_bytes(
        &self,
        decoder: &mut RecordDecoder,
        phase: &mut Phase,
        bytes: &[u8],
    ) -> Option<Ending> {
        for item in decoder.feed_json(bytes) {
            let inbound = match item.and_then(|raw| classify(raw, *phase)) {
                Ok(inbound) => inbound,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping inbound record");
                    continue;
                }
            };

            match inbound {
                Inbound::Handshake(resp) => match resp.error {
                    Some(error) => {
                        tracing::warn!(error = %error, "handshake rejected");
                        return Some(Ending {
                            state: ConnectionState::Failed,
                            reason: format!("handshake rejected: {error}"),
                            error: Some(error),
                            allow_reconnect: false,
                        });
                    }
                    None => {
                        *phase = Phase::Established;
                        tracing::debug!("handshake accepted");
                    }
                },
                Inbound::Ping => tracing::trace!("server ping"),
                Inbound::Close {
                    error,
                    allow_reconnect,
                } => {
                    tracing::info!(error = ?error, allow_reconnect, "server closed connection");
                    return Some(Ending {
                        state: ConnectionState::Closed,
                        reason: "closed by server".into(),
                        error,
                        allow_reconnect,
                    });
                }
                Inbound::Event(record) => self.on_event(record).await,
            }
        }
        None
    }

    async fn on_event(&self, record: EventRecord) {
        tracing::debug!(event = %record.name, "event received");
        match record.kind() {
            Some(ServerEventKind::ChatStarted | ServerEventKind::ChatsSessionsUpdated) => {
                self.inner.pinner.observe(&record);
            }
            Some(ServerEventKind::Welcome) => return self.on_welcome(record).await,
            _ => {}
        }
        self.emit(record);
    }

    async fn on_welcome(&self, record: EventRecord) {
        let became_ready = self
            .transition(
                |s| s == ConnectionState::Authenticating,
                ConnectionState::Ready,
            )
            .is_ok();
        let payload = record.payload.clone();
        self.emit(record);

        if !became_ready {
            tracing::debug!("welcome outside authentication");
            return;
        }

        let user = payload
            .pointer("/user/name")
            .and_then(Value::as_str)
            .unwrap_or("-");
        tracing::info!(user, "welcome received");
        self.emit(EventRecord::new(READY_EVENT, payload));

        if self.inner.cfg.client.auto_register_app {
            if let Err(e) = self.register_app().await {
                tracing::warn!(error = %e, "registerApp failed");
            }
        }
    }

    /// The single transition into a terminal state for one socket.
    fn finish(&self, finished: &AtomicBool, ending: Ending) {
        if finished.load(Ordering::SeqCst) {
            return;
        }
        // Release the socket before announcing the end, so a reconnect
        // triggered by the close event never sees a stale writer. A busy
        // writer belongs to a write that drops the sink once shutdown fires.
        if let Ok(mut writer) = self.inner.writer.try_lock() {
            writer.take();
        }
        if finished.swap(true, Ordering::SeqCst) {
            return;
        }

        self.set_state(ending.state);
        tracing::info!(state = %ending.state, reason = %ending.reason, "hub connection ended");
        self.emit(EventRecord::new(
            CLOSE_EVENT,
            json!({
                "reason": ending.reason,
                "error": ending.error,
                "allowReconnect": ending.allow_reconnect,
            }),
        ));
    }

    // --------------------
    // Helpers
    // --------------------

    fn emit(&self, record: EventRecord) {
        if self.inner.events.send(record).is_err() {
            tracing::debug!("event pump stopped; event dropped");
        }
    }

    fn set_state(&self, to: ConnectionState) {
        let from = self.inner.state.send_replace(to);
        if from != to {
            tracing::debug!(%from, %to, "state changed");
        }
    }

    /// Move to `to` only if `allowed(current)`; otherwise return the current state.
    fn transition(
        &self,
        allowed: impl FnOnce(ConnectionState) -> bool,
        to: ConnectionState,
    ) -> std::result::Result<(), ConnectionState> {
        let mut refused = None;
        self.inner.state.send_if_modified(|s| {
            if allowed(*s) {
                tracing::debug!(from = %s, %to, "state changed");
                *s = to;
                true
            } else {
                refused = Some(*s);
                false
            }
        });
        refused.map_or(Ok(()), Err)
    }

    fn lock_live(&self) -> MutexGuard<'_, Option<Live>> {
        self.inner.live.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_live(&self) -> Option<Live> {
        self.lock_live().take()
    }

    fn shutdown_token(&self) -> CancellationToken {
        self.lock_live()
            .as_ref()
            .map(|live| live.shutdown.clone())
            .unwrap_or_default()
    }

    fn signal_shutdown(&self) {
        if let Some(live) = self.lock_live().as_ref() {
            live.shutdown.cancel();
        }
    }
}
