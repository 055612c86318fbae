//! Connection state machine.
//!
//! A [`Connection`] is one logical session between two endpoints. It runs
//! the three-way handshake, supervises liveness with a keep-alive and an
//! idle timer, and tears down gracefully with a FIN.
//!
//! ```text
//!            SYN/SYNACK/ACK             FIN, idle timeout, close()
//! Opening ─────────────────▶ Open ─────────────────────────────▶ Closed
//!    │                                                              ▲
//!    ├── close() ───────────────────────────────────────────────────┘
//!    └── connect timeout ──▶ Failed
//! ```
//!
//! Every packet, handshake included, travels through the embedded
//! [`ReorderBuffer`], so control packets are processed strictly in send
//! order. The connection is sans-IO: it never touches a socket or a clock.
//! Outbound packets and notifications queue up as [`ConnectionEvent`]s, and
//! the owner reports the time whenever it feeds a packet or fires timers.

use std::collections::VecDeque;
use std::collections::vec_deque::Drain;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use super::codec::{self, WirePacket};
use super::error::ConnectionError;
use super::packet::{ConnectionPacket, PacketType, Payload, SynParams};
use super::reorder::ReorderBuffer;
use super::timer::{self, Timer};
use crate::core::SequenceError;
use crate::core::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_IDLE_TIMEOUT, DEFAULT_KEEP_ALIVE_INTERVAL,
    DEFAULT_MAX_PENDING, DEFAULT_PORT, SEQ_WRAP,
};

/// Diagnostic ids for log output. Never sent on the wire.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Handshake in progress.
    Opening,
    /// Handshake complete, data flows.
    Open,
    /// Closed by either side or by the idle timeout.
    Closed,
    /// The handshake timed out.
    Failed,
}

impl ConnectionState {
    /// Check if no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Opening => "opening",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Which side started the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sends the SYN and chooses the cookie.
    Initiator,
    /// Answers a SYN with a SYNACK.
    Responder,
}

/// Connection configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Logical service name stamped on every packet.
    pub port: String,

    /// Time allowed for the handshake.
    pub connect_timeout: Duration,

    /// Interval between keep-alive ACKs once open.
    pub keep_alive_interval: Duration,

    /// Close the connection after this long without inbound packets.
    pub idle_timeout: Duration,

    /// Application init data sent during the handshake.
    pub init: Option<Payload>,

    /// Reorder buffer pending limit.
    pub max_pending: usize,

    /// Sequence number wrap.
    pub seq_wrap: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            init: None,
            max_pending: DEFAULT_MAX_PENDING,
            seq_wrap: SEQ_WRAP,
        }
    }
}

impl ConnectionConfig {
    /// Take over the session parameters a peer requested in its SYN.
    ///
    /// Zero durations are ignored.
    pub fn adopt(&mut self, params: &SynParams) {
        if params.keep_alive_interval > 0 {
            self.keep_alive_interval = params.keep_alive_interval();
        }
        if params.idle_timeout > 0 {
            self.idle_timeout = params.idle_timeout();
        }
    }
}

/// Builder for [`ConnectionConfig`].
#[derive(Debug, Default)]
pub struct ConnectionBuilder {
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the port.
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.config.port = port.into();
        self
    }

    /// Set the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the keep-alive interval. Zero is ignored, as in [`ConnectionConfig::adopt`].
    pub fn keep_alive_interval(mut self, interval: Duration) -> Self {
        if !interval.is_zero() {
            self.config.keep_alive_interval = interval;
        }
        self
    }

    /// Set the idle timeout. Zero is ignored.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.config.idle_timeout = timeout;
        }
        self
    }

    /// Set the handshake init data.
    pub fn init(mut self, init: Payload) -> Self {
        self.config.init = Some(init);
        self
    }

    /// Set the reorder buffer pending limit.
    pub fn max_pending(mut self, max: usize) -> Self {
        self.config.max_pending = max;
        self
    }

    /// Set the sequence number wrap.
    pub fn seq_wrap(mut self, wrap: u32) -> Self {
        self.config.seq_wrap = wrap;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> ConnectionConfig {
        self.config
    }
}

/// Notification from a connection to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A packet is ready for the transport.
    Transmit(WirePacket),

    /// The handshake completed.
    Opened {
        /// Init data the peer sent during the handshake.
        peer_init: Option<Payload>,
    },

    /// Application data arrived, in send order.
    Message(Payload),

    /// A reportable error occurred.
    Error(ConnectionError),

    /// The connection closed. Raised at most once.
    Closed,
}

/// One logical session.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    cookie: String,
    role: Role,
    state: ConnectionState,
    config: ConnectionConfig,
    sequencer: ReorderBuffer<ConnectionPacket>,
    connect_timer: Timer,
    idle_timer: Timer,
    keep_alive_timer: Timer,
    synack_sent: bool,
    peer_init: Option<Payload>,
    events: VecDeque<ConnectionEvent>,
}

impl Connection {
    /// Start a handshake: arms the connect timer and queues a SYN.
    pub fn initiator(cookie: impl Into<String>, config: ConnectionConfig, now: Instant) -> Self {
        let mut conn = Self::new(cookie.into(), Role::Initiator, config, now);
        let params = SynParams::new(
            conn.config.keep_alive_interval,
            conn.config.idle_timeout,
            conn.config.init.clone(),
        );
        conn.transmit(PacketType::Syn, Some(params.to_payload()));
        conn
    }

    /// Wait for a handshake under `cookie`: arms the connect timer only.
    pub fn responder(cookie: impl Into<String>, config: ConnectionConfig, now: Instant) -> Self {
        Self::new(cookie.into(), Role::Responder, config, now)
    }

    fn new(cookie: String, role: Role, config: ConnectionConfig, now: Instant) -> Self {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        let sequencer = ReorderBuffer::with_limits(config.max_pending, config.seq_wrap);
        let mut connect_timer = Timer::new();
        connect_timer.arm(now, config.connect_timeout);
        debug!(id, cookie = %cookie, ?role, port = %config.port, "connection opening");

        Self {
            id,
            cookie,
            role,
            state: ConnectionState::Opening,
            config,
            sequencer,
            connect_timer,
            idle_timer: Timer::new(),
            keep_alive_timer: Timer::new(),
            synack_sent: false,
            peer_init: None,
            events: VecDeque::new(),
        }
    }

    /// Diagnostic id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Connection cookie.
    pub fn cookie(&self) -> &str {
        &self.cookie
    }

    /// Handshake role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Check if the connection is open.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Check if the connection is closed or failed.
    pub fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }

    /// Session parameters in effect.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Init data received from the peer, once the handshake got that far.
    pub fn peer_init(&self) -> Option<&Payload> {
        self.peer_init.as_ref()
    }

    /// The embedded reorder buffer.
    pub fn sequencer(&self) -> &ReorderBuffer<ConnectionPacket> {
        &self.sequencer
    }

    /// Send application data.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::NotOpen`] outside the open state and
    /// [`ConnectionError::AbsentPayload`] for a null payload. Nothing is
    /// transmitted in either case.
    pub fn send(&mut self, payload: Payload) -> Result<(), ConnectionError> {
        if self.state != ConnectionState::Open {
            debug!(id = self.id, state = %self.state, "send while not open");
            return Err(ConnectionError::NotOpen { state: self.state });
        }
        if payload.is_null() {
            return Err(ConnectionError::AbsentPayload);
        }
        self.transmit(PacketType::Data, Some(payload));
        Ok(())
    }

    /// Ingest a packet from the transport.
    ///
    /// Returns `false` if the packet was discarded outright: wrong cookie,
    /// or the connection is already closed or failed.
    pub fn write(&mut self, packet: WirePacket, now: Instant) -> bool {
        if self.state.is_terminal() {
            trace!(id = self.id, seq = packet.seq, "dropping packet after close");
            return false;
        }
        if packet.data.cookie != self.cookie {
            trace!(id = self.id, cookie = %packet.data.cookie, "dropping packet for foreign cookie");
            return false;
        }

        match self.sequencer.write(packet) {
            Ok(delivered) => {
                for message in delivered {
                    if self.state.is_terminal() {
                        break;
                    }
                    self.dispatch(message, now);
                }
                true
            }
            Err(SequenceError::Closed) => false,
            Err(err) => {
                self.events.push_back(ConnectionEvent::Error(err.into()));
                self.close();
                true
            }
        }
    }

    /// Decode and ingest a datagram. Malformed input is dropped silently.
    pub fn write_bytes(&mut self, bytes: &[u8], now: Instant) -> bool {
        match codec::decode(bytes, self.config.seq_wrap) {
            Ok(packet) => self.write(packet, now),
            Err(err) => {
                trace!(id = self.id, %err, "dropping malformed datagram");
                false
            }
        }
    }

    /// Close the connection: queues a FIN, cancels all timers, raises
    /// [`ConnectionEvent::Closed`]. No-op once closed or failed.
    pub fn close(&mut self) {
        if self.state.is_terminal() {
            return;
        }
        self.transmit(PacketType::Fin, None);
        self.cancel_timers();
        self.state = ConnectionState::Closed;
        debug!(id = self.id, cookie = %self.cookie, "connection closed");
        self.events.push_back(ConnectionEvent::Closed);
    }

    /// Earliest armed timer deadline.
    pub fn poll_timeout(&self) -> Option<Instant> {
        timer::earliest([&self.connect_timer, &self.idle_timer, &self.keep_alive_timer])
    }

    /// Fire every timer whose deadline is at or before `now`.
    pub fn handle_timeout(&mut self, now: Instant) {
        if self.connect_timer.expire(now) && self.state == ConnectionState::Opening {
            let timeout = self.config.connect_timeout;
            warn!(id = self.id, cookie = %self.cookie, ?timeout, "connection timed out");
            self.cancel_timers();
            self.state = ConnectionState::Failed;
            self.events
                .push_back(ConnectionEvent::Error(ConnectionError::ConnectTimeout(timeout)));
            return;
        }

        if self.idle_timer.expire(now) && self.state == ConnectionState::Open {
            let timeout = self.config.idle_timeout;
            warn!(id = self.id, cookie = %self.cookie, ?timeout, "session timed out");
            self.events
                .push_back(ConnectionEvent::Error(ConnectionError::IdleTimeout(timeout)));
            self.close();
            return;
        }

        if self.state == ConnectionState::Open && self.keep_alive_timer.expire(now) {
            trace!(id = self.id, "keep-alive");
            self.transmit(PacketType::Ack, None);
            self.keep_alive_timer
                .arm(now, self.config.keep_alive_interval);
        }
    }

    /// Take the next queued event.
    pub fn poll_event(&mut self) -> Option<ConnectionEvent> {
        self.events.pop_front()
    }

    /// Take every queued event.
    pub fn drain_events(&mut self) -> Drain<'_, ConnectionEvent> {
        self.events.drain(..)
    }

    /// Handle one in-order packet.
    fn dispatch(&mut self, packet: ConnectionPacket, now: Instant) {
        if self.state == ConnectionState::Open {
            self.idle_timer.arm(now, self.config.idle_timeout);
        }

        match (self.state, packet.kind) {
            (ConnectionState::Opening, PacketType::Syn)
                if self.role == Role::Responder && !self.synack_sent =>
            {
                if let Some(params) = SynParams::from_payload(packet.data.as_ref()) {
                    self.config.adopt(&params);
                    self.peer_init = params.init;
                }
                self.transmit(PacketType::SynAck, self.config.init.clone());
                self.synack_sent = true;
            }
            (ConnectionState::Opening, PacketType::SynAck) if self.role == Role::Initiator => {
                self.peer_init = packet.data;
                self.transmit(PacketType::Ack, None);
                self.enter_open(now);
            }
            (ConnectionState::Opening, PacketType::Ack)
                if self.role == Role::Responder && self.synack_sent =>
            {
                self.enter_open(now);
            }
            (ConnectionState::Open, PacketType::Ack) => {}
            (ConnectionState::Open, PacketType::Data) => match packet.data {
                Some(payload) if !payload.is_null() => {
                    self.events.push_back(ConnectionEvent::Message(payload));
                }
                _ => trace!(id = self.id, "dropping data packet without payload"),
            },
            (ConnectionState::Open, PacketType::Fin) => {
                debug!(id = self.id, "peer closed");
                self.close();
            }
            (state, kind) => {
                trace!(id = self.id, %state, %kind, "ignoring unexpected packet");
            }
        }
    }

    fn enter_open(&mut self, now: Instant) {
        self.state = ConnectionState::Open;
        self.connect_timer.cancel();
        self.idle_timer.arm(now, self.config.idle_timeout);
        self.keep_alive_timer.arm(now, self.config.keep_alive_interval);
        debug!(id = self.id, cookie = %self.cookie, role = ?self.role, "connection open");
        self.events.push_back(ConnectionEvent::Opened {
            peer_init: self.peer_init.clone(),
        });
    }

    fn transmit(&mut self, kind: PacketType, data: Option<Payload>) {
        let packet = ConnectionPacket::new(self.config.port.as_str(), kind, self.cookie.as_str())
            .with_data(data);
        let packet = self.sequencer.send(packet);
        trace!(id = self.id, seq = packet.seq, %kind, "transmit");
        self.events.push_back(ConnectionEvent::Transmit(packet));
    }

    fn cancel_timers(&mut self) {
        self.connect_timer.cancel();
        self.idle_timer.cancel();
        self.keep_alive_timer.cancel();
    }
}
