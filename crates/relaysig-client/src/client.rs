//! Connection supervisor.
//!
//! Lifecycle:
//! 1. `connect()` resolves the endpoint and performs the handshake
//! 2. On open: announce the local peer, start liveness, spawn the connection task
//! 3. The connection task multiplexes queued sends with inbound frames
//! 4. On involuntary close: consult the reconnection controller and maybe
//!    schedule a retry, which goes back to 1
//!
//! All mutable state sits behind one mutex and is never held across an
//! `.await` or while events are published. Every link and scheduled retry is
//! tagged with the epoch it was created under; `disconnect()` and each new
//! attempt bump the epoch so anything older becomes a no-op.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::events::{EventPublisher, Subscription};
use crate::liveness::Liveness;
use crate::reconnect::{ReconnectController, RetryDecision};
use crate::transport::{Connector, Outbound, OutboundTx, WsConnector, build_request};
use futures_util::{SinkExt, StreamExt};
use relaysig_core::{
    AckCounter, CLOSE_ABNORMAL, CLOSE_NORMAL, ConnectionState, Envelope, OutboundPayload,
    PeerInfo, PeerMessage, REMOTE_PEER_ID, SessionIdentity, SignalEvent, decode_frame, resolve,
};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Close code reported when the peer sent a close frame without a status.
const CLOSE_NO_STATUS: u16 = 1005;

/// A signaling session with one relay and one remote peer.
///
/// Cheap to clone; clones drive the same session.
///
/// ```rust,no_run
/// use relaysig_client::{ClientConfig, SignalEvent, SignalingClient};
///
/// # async fn example() -> relaysig_client::Result<()> {
/// let client = SignalingClient::new(ClientConfig::new("relay.example.com", "token"));
/// let answerer = client.clone();
/// let _sub = client.subscribe(move |event| {
///     if let SignalEvent::Offer { sdp } = event {
///         let _ = answerer.send_answer(&format!("answer to {} bytes", sdp.len()), None);
///     }
/// });
/// client.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct SignalingClient<C: Connector = WsConnector> {
    shared: Arc<Shared<C>>,
}

impl<C: Connector> Clone for SignalingClient<C> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<C: Connector> fmt::Debug for SignalingClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("SignalingClient")
            .field("identity", &self.shared.identity)
            .field("state", &inner.state)
            .field("reconnect_attempts", &inner.reconnect.attempts())
            .finish()
    }
}

impl SignalingClient<WsConnector> {
    /// Client that connects over TCP + TLS.
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, WsConnector::new())
    }
}

impl<C: Connector> SignalingClient<C> {
    /// Client that opens its sockets through `connector`.
    pub fn with_connector(config: ClientConfig, connector: C) -> Self {
        let identity = SessionIdentity::generate(config.session_token.clone());
        let reconnect = ReconnectController::new(config.reconnect.clone());
        Self {
            shared: Arc::new(Shared {
                config,
                identity,
                connector,
                events: EventPublisher::new(),
                acks: AckCounter::new(),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    user_closed: false,
                    epoch: 0,
                    link: None,
                    liveness: Liveness::default(),
                    reconnect,
                }),
            }),
        }
    }

    /// Identity announced on every connection of this instance.
    pub fn identity(&self) -> &SessionIdentity {
        &self.shared.identity
    }

    /// Configuration the client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Publisher every session event goes through.
    pub fn events(&self) -> &EventPublisher {
        &self.shared.events
    }

    /// Shorthand for `events().subscribe(callback)`.
    pub fn subscribe(
        &self,
        callback: impl Fn(&SignalEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.events.subscribe(callback)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Retries scheduled since the last successful connect.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().reconnect.attempts()
    }

    /// Open the connection.
    ///
    /// Returns immediately when a connection is already open or being
    /// opened. Calling this after `disconnect()` or after retries were
    /// exhausted starts over.
    pub async fn connect(&self) -> Result<()> {
        self.shared.open(Trigger::Caller).await
    }

    /// Close the connection for good. Pending retries and timers are
    /// cancelled before this returns.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Relay an SDP answer to the remote peer. Returns the ack id used.
    pub fn send_answer(&self, sdp: &str, nvst_sdp: Option<&str>) -> Result<u64> {
        self.shared
            .relay(OutboundPayload::answer(sdp, nvst_sdp.map(str::to_string)))
    }

    /// Relay a local ICE candidate to the remote peer. Returns the ack id used.
    pub fn send_ice_candidate(
        &self,
        candidate: &str,
        sdp_mid: Option<&str>,
        sdp_m_line_index: Option<u32>,
    ) -> Result<u64> {
        self.shared.relay(OutboundPayload::candidate(
            candidate,
            sdp_mid.map(str::to_string),
            sdp_m_line_index,
        ))
    }
}

// ── Shared state ────────────────────────────────────────────────────────────

struct Shared<C> {
    config: ClientConfig,
    identity: SessionIdentity,
    connector: C,
    events: EventPublisher,
    acks: AckCounter,
    inner: Mutex<Inner>,
}

struct Inner {
    state: ConnectionState,
    /// Set by `disconnect()`, cleared by a caller-initiated `connect()`.
    user_closed: bool,
    epoch: u64,
    link: Option<Link>,
    liveness: Liveness,
    reconnect: ReconnectController,
}

impl Inner {
    fn is_active(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Connected
        )
    }

    /// Queue `envelope` on the open connection.
    fn send(&self, envelope: &Envelope) -> Result<()> {
        let link = self.link.as_ref().ok_or(ClientError::NotConnected)?;
        let text = envelope.to_json()?;
        tracing::debug!("-> {}", text);
        link.outbound
            .send(Outbound::Frame(Message::Text(text.into())))
            .map_err(|_| ClientError::NotConnected)
    }
}

/// The open connection as seen by the supervisor: only its send queue.
struct Link {
    outbound: OutboundTx,
}

/// Who asked for a connection attempt.
#[derive(Debug, Clone, Copy)]
enum Trigger {
    Caller,
    /// A retry scheduled while `epoch` was current.
    Retry { epoch: u64 },
}

impl<C: Connector> Shared<C> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn open(self: &Arc<Self>, trigger: Trigger) -> Result<()> {
        let prepared = {
            let mut inner = self.lock();
            match trigger {
                Trigger::Caller => {
                    if inner.is_active() {
                        return Ok(());
                    }
                    inner.user_closed = false;
                    inner.reconnect.cancel();
                    if inner.reconnect.is_exhausted() {
                        inner.reconnect.reset();
                    }
                }
                Trigger::Retry { epoch } => {
                    if inner.epoch != epoch || inner.user_closed {
                        return Err(ClientError::Cancelled);
                    }
                    inner.reconnect.fired();
                    if inner.is_active() {
                        return Ok(());
                    }
                }
            }
            inner.epoch += 1;
            inner.state = ConnectionState::Connecting;
            let request = resolve(
                &self.config.server,
                self.config.signaling_url.as_deref(),
                &self.config.path,
                self.identity.peer_name(),
            )
            .map_err(ClientError::from)
            .and_then(|endpoint| build_request(&endpoint, &self.identity, &self.config));
            match request {
                Ok(request) => Ok((inner.epoch, request)),
                Err(e) => {
                    inner.state = ConnectionState::Disconnected;
                    Err(e)
                }
            }
        };

        let (epoch, request) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                // Configuration problem; retrying cannot fix it.
                self.events
                    .publish(&SignalEvent::error(format!("cannot connect: {e}")));
                return Err(e);
            }
        };

        tracing::info!("connecting to {}", request.uri());
        let handshake = self.connector.connect(request);
        let timeout = self.config.connect_timeout;
        let result = if timeout.is_zero() {
            handshake.await.map_err(ClientError::from)
        } else {
            match tokio::time::timeout(timeout, handshake).await {
                Ok(result) => result.map_err(ClientError::from),
                Err(_) => Err(ClientError::Timeout(timeout)),
            }
        };

        match result {
            Ok(ws) => self.on_open(epoch, ws),
            Err(e) => {
                self.on_connect_failed(epoch, &e);
                Err(e)
            }
        }
    }

    fn on_open(self: &Arc<Self>, epoch: u64, ws: WebSocketStream<C::Io>) -> Result<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut inner = self.lock();
            if inner.epoch != epoch || inner.user_closed {
                tracing::debug!("handshake finished after the attempt was superseded");
                tokio::spawn(async move {
                    let mut ws = ws;
                    let _ = ws.close(None).await;
                });
                return Err(ClientError::Cancelled);
            }

            inner.liveness.start(
                &tx,
                self.config.heartbeat_interval,
                self.config.ping_interval,
            );
            inner.link = Some(Link { outbound: tx });
            let announce = Envelope::announce(
                PeerInfo::local(
                    self.identity.peer_id(),
                    self.identity.peer_name(),
                    &self.config.user_agent,
                ),
                self.acks.next_id(),
            );
            if let Err(e) = inner.send(&announce) {
                tracing::warn!("failed to queue identity announcement: {}", e);
            }
            inner.reconnect.reset();
            inner.state = ConnectionState::Connected;
        }

        tracing::info!("connected as {}", self.identity);
        self.events.publish(&SignalEvent::Connected);
        // Spawned after `Connected` is out so no inbound event can overtake it.
        tokio::spawn(drive(Arc::downgrade(self), epoch, ws, rx));
        Ok(())
    }

    fn on_connect_failed(self: &Arc<Self>, epoch: u64, error: &ClientError) {
        let decision = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return;
            }
            inner.state = ConnectionState::Disconnected;
            self.decide_retry(&mut inner, epoch, CLOSE_ABNORMAL)
        };
        tracing::warn!("connection attempt failed: {}", error);
        self.events
            .publish(&SignalEvent::error(format!("connection failed: {error}")));
        self.events
            .publish(&SignalEvent::disconnected(CLOSE_ABNORMAL, error.to_string()));
        self.report(decision);
    }

    fn on_text(&self, epoch: u64, text: &str) {
        tracing::debug!("<- {}", text);
        let decoded = decode_frame(text, self.identity.peer_id());
        {
            let inner = self.lock();
            if inner.epoch != epoch {
                return;
            }
            for reply in &decoded.replies {
                if let Err(e) = inner.send(reply) {
                    tracing::debug!("dropping reply: {}", e);
                }
            }
        }
        if let Some(event) = decoded.event {
            self.events.publish(&event);
        }
    }

    fn on_closed(self: &Arc<Self>, epoch: u64, code: u16, reason: String) {
        let decision = {
            let mut inner = self.lock();
            if inner.epoch != epoch {
                return;
            }
            inner.liveness.stop();
            inner.link = None;
            inner.state = ConnectionState::Disconnected;
            self.decide_retry(&mut inner, epoch, code)
        };
        tracing::info!("connection closed ({}): {}", code, reason);
        self.events
            .publish(&SignalEvent::disconnected(code, reason));
        self.report(decision);
    }

    /// Consult the controller and schedule the retry it grants.
    fn decide_retry(self: &Arc<Self>, inner: &mut Inner, epoch: u64, code: u16) -> RetryDecision {
        let user_closed = inner.user_closed;
        let decision = inner.reconnect.decide(user_closed, code);
        if let RetryDecision::Retry { delay, .. } = decision {
            inner.state = ConnectionState::Reconnecting;
            let shared = Arc::downgrade(self);
            inner.reconnect.arm(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Some(shared) = shared.upgrade() {
                    if let Err(e) = shared.open(Trigger::Retry { epoch }).await {
                        tracing::debug!("retry did not connect: {}", e);
                    }
                }
            }));
        }
        decision
    }

    fn report(&self, decision: RetryDecision) {
        match decision {
            RetryDecision::Skip => {}
            RetryDecision::Retry { attempt, delay } => {
                tracing::info!(
                    "reconnecting in {}ms (attempt {})",
                    delay.as_millis(),
                    attempt
                );
            }
            RetryDecision::Exhausted => {
                let max = self.config.reconnect.max_attempts;
                tracing::warn!("giving up after {} reconnection attempts", max);
                self.events.publish(&SignalEvent::fatal(format!(
                    "reconnection attempts exhausted ({max})"
                )));
            }
        }
    }

    fn disconnect(&self) {
        let was_active = {
            let mut inner = self.lock();
            let was_active = inner.is_active();
            inner.user_closed = true;
            inner.epoch += 1;
            inner.reconnect.cancel();
            inner.reconnect.reset();
            inner.liveness.stop();
            inner.state = ConnectionState::Disconnected;
            if let Some(link) = inner.link.take() {
                let _ = link.outbound.send(Outbound::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client disconnect".into(),
                })));
            }
            was_active
        };
        if was_active {
            tracing::info!("disconnected by caller");
            self.events
                .publish(&SignalEvent::disconnected(CLOSE_NORMAL, "client disconnect"));
        }
    }

    fn relay(&self, payload: OutboundPayload) -> Result<u64> {
        let msg = payload.to_json()?;
        let inner = self.lock();
        if inner.link.is_none() {
            return Err(ClientError::NotConnected);
        }
        let ackid = self.acks.next_id();
        let envelope = Envelope::relay(
            PeerMessage {
                from: self.identity.peer_id(),
                to: REMOTE_PEER_ID,
                msg,
            },
            ackid,
        );
        inner.send(&envelope)?;
        Ok(ackid)
    }
}

// ── Connection task ─────────────────────────────────────────────────────────

/// Own the socket for one epoch: write what is queued, hand inbound text to
/// the supervisor, report how the socket ended.
async fn drive<C: Connector>(
    shared: Weak<Shared<C>>,
    epoch: u64,
    mut ws: WebSocketStream<C::Io>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let (code, reason) = loop {
        tokio::select! {
            biased;

            out = outbound.recv() => match out {
                Some(Outbound::Frame(msg)) => {
                    if let Err(e) = ws.send(msg).await {
                        break (CLOSE_ABNORMAL, format!("send failed: {e}"));
                    }
                }
                Some(Outbound::Close(frame)) => {
                    let _ = ws.close(frame).await;
                    return;
                }
                None => {
                    let _ = ws.close(None).await;
                    return;
                }
            },

            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Some(shared) = shared.upgrade() else {
                        return;
                    };
                    shared.on_text(epoch, text.as_str());
                }
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(f) => (u16::from(f.code), f.reason.as_str().to_string()),
                        None => (CLOSE_NO_STATUS, String::new()),
                    };
                }
                Some(Ok(Message::Pong(_))) => tracing::trace!("pong"),
                Some(Ok(_)) => {}
                Some(Err(e)) => break (CLOSE_ABNORMAL, e.to_string()),
                None => break (CLOSE_ABNORMAL, "stream ended".to_string()),
            },
        }
    };

    if let Some(shared) = shared.upgrade() {
        shared.on_closed(epoch, code, reason);
    }
}
