//! Connection-accepting server.
//!
//! A [`Server`] listens on one logical port. It peeks at the envelope of
//! every inbound packet to route it: packets for a known cookie go to that
//! connection, a first-of-sequence SYN for an unknown cookie creates a new
//! responder connection, everything else is dropped.
//!
//! Like [`Connection`], the server is sans-IO. Outbound packets and
//! lifecycle notifications queue up as [`ServerEvent`]s; see
//! [`super::driver`] for a tokio task that owns a server.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::session::SessionTable;
use crate::core::constants::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_PENDING, DEFAULT_PORT, SEQ_WRAP,
};
use crate::transport::{
    codec, Connection, ConnectionConfig, ConnectionError, ConnectionEvent, Payload, SynParams,
    WirePacket,
};

/// Errors that can occur in the server.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// A SYN arrived for a cookie that already has a connection.
    #[error("duplicate cookie: {0}")]
    DuplicateCookie(String),

    /// No connection is tracked under the cookie.
    #[error("unknown cookie: {0}")]
    UnknownCookie(String),

    /// A connection refused the operation.
    #[error("connection {cookie}: {source}")]
    Connection {
        /// Connection cookie.
        cookie: String,
        /// Underlying error.
        #[source]
        source: ConnectionError,
    },

    /// The server task has shut down.
    #[error("server shut down")]
    Shutdown,
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Logical port to accept connections on.
    pub port: String,

    /// Handshake timeout for accepted connections.
    pub connect_timeout: Duration,

    /// Init data sent back in every SYNACK.
    pub init: Option<Payload>,

    /// Reorder buffer pending limit per connection.
    pub max_pending: usize,

    /// Sequence number wrap.
    pub seq_wrap: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            init: None,
            max_pending: DEFAULT_MAX_PENDING,
            seq_wrap: SEQ_WRAP,
        }
    }
}

impl ServerConfig {
    /// Configuration for a responder accepting a SYN with `params`.
    fn responder_config(&self, params: &SynParams) -> ConnectionConfig {
        let mut config = ConnectionConfig {
            port: self.port.clone(),
            connect_timeout: self.connect_timeout,
            init: self.init.clone(),
            max_pending: self.max_pending,
            seq_wrap: self.seq_wrap,
            ..ConnectionConfig::default()
        };
        config.adopt(params);
        config
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Default)]
pub struct ServerBuilder {
    config: ServerConfig,
}

impl ServerBuilder {
    /// Create a builder listening on `port`.
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            config: ServerConfig {
                port: port.into(),
                ..ServerConfig::default()
            },
        }
    }

    /// Set the handshake timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the init data returned in SYNACKs.
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
    pub fn build(self) -> ServerConfig {
        self.config
    }
}

/// Event from the server.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// The server started accepting connections.
    Started,

    /// The server stopped accepting connections.
    Stopped,

    /// A SYN created a new connection.
    Accepted {
        /// Connection cookie.
        cookie: String,
        /// Init data carried by the SYN.
        init: Option<Payload>,
    },

    /// A packet is ready for the transport.
    Transmit(WirePacket),

    /// A connection completed its handshake.
    Opened {
        /// Connection cookie.
        cookie: String,
    },

    /// Application data arrived on a connection.
    Message {
        /// Connection cookie.
        cookie: String,
        /// Payload.
        payload: Payload,
    },

    /// A connection reported an error. Fatal errors are followed by its removal.
    ConnectionError {
        /// Connection cookie.
        cookie: String,
        /// The error.
        error: ConnectionError,
    },

    /// A connection closed and was removed.
    Closed {
        /// Connection cookie.
        cookie: String,
    },

    /// A server-level error, such as a duplicate cookie.
    Error(ServerError),
}

/// Accepts and demultiplexes connections for one port.
///
/// # Example
///
/// ```
/// use std::time::Instant;
/// use seqconn::server::{Server, ServerBuilder, ServerEvent};
///
/// let mut server = Server::new(ServerBuilder::new("echo").build());
/// server.start();
/// assert_eq!(server.poll_event(), Some(ServerEvent::Started));
///
/// // Feed datagrams from the transport:
/// let accepted = server.write_bytes(b"garbage", Instant::now());
/// assert!(!accepted);
/// ```
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    active: bool,
    sessions: SessionTable,
    events: VecDeque<ServerEvent>,
}

impl Server {
    /// Create an inactive server.
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            active: false,
            sessions: SessionTable::new(),
            events: VecDeque::new(),
        }
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Port this server accepts.
    pub fn port(&self) -> &str {
        &self.config.port
    }

    /// Check if new connections are accepted.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Number of tracked connections.
    pub fn connection_count(&self) -> usize {
        self.sessions.len()
    }

    /// Check if a connection is tracked under `cookie`.
    pub fn contains(&self, cookie: &str) -> bool {
        self.sessions.contains(cookie)
    }

    /// Look up a connection.
    pub fn connection(&self, cookie: &str) -> Option<&Connection> {
        self.sessions.get(cookie)
    }

    /// Start accepting connections. No-op if already active.
    pub fn start(&mut self) {
        if self.active {
            return;
        }
        self.active = true;
        info!(port = %self.config.port, "server started");
        self.events.push_back(ServerEvent::Started);
    }

    /// Stop accepting connections, optionally closing every tracked one.
    pub fn stop(&mut self, kill_all: bool) {
        if self.active {
            self.active = false;
            info!(port = %self.config.port, kill_all, "server stopped");
            self.events.push_back(ServerEvent::Stopped);
        }
        if kill_all {
            for cookie in self.sessions.cookies() {
                if let Some(conn) = self.sessions.get_mut(&cookie) {
                    conn.close();
                }
                self.collect(&cookie);
            }
        }
    }

    /// Ingest one packet from the transport.
    ///
    /// Returns `true` if the packet was routed to a connection.
    pub fn write(&mut self, packet: WirePacket, now: Instant) -> bool {
        let envelope = &packet.data;
        if envelope.port != self.config.port {
            trace!(port = %envelope.port, "dropping packet for foreign port");
            return false;
        }

        if !envelope.cookie.is_empty() && !envelope.is_syn() {
            let cookie = envelope.cookie.clone();
            let Some(conn) = self.sessions.get_mut(&cookie) else {
                trace!(cookie = %cookie, kind = %envelope.kind, "dropping packet for unknown cookie");
                return false;
            };
            let routed = conn.write(packet, now);
            self.collect(&cookie);
            return routed;
        }

        self.accept(packet, now)
    }

    /// Decode and ingest a datagram. Malformed input is dropped silently.
    pub fn write_bytes(&mut self, bytes: &[u8], now: Instant) -> bool {
        match codec::decode(bytes, self.config.seq_wrap) {
            Ok(packet) => self.write(packet, now),
            Err(err) => {
                trace!(%err, "dropping malformed datagram");
                false
            }
        }
    }

    /// Admit a SYN as a new connection.
    fn accept(&mut self, packet: WirePacket, now: Instant) -> bool {
        let envelope = &packet.data;
        if !self.active || !envelope.is_syn() || packet.seq != 0 {
            trace!(
                active = self.active,
                kind = %envelope.kind,
                seq = packet.seq,
                "dropping packet: not an admissible syn"
            );
            return false;
        }

        if envelope.cookie.is_empty() {
            trace!("dropping syn without cookie");
            return false;
        }

        let cookie = envelope.cookie.clone();
        if self.sessions.contains(&cookie) {
            warn!(cookie = %cookie, "duplicate cookie");
            self.events
                .push_back(ServerEvent::Error(ServerError::DuplicateCookie(cookie)));
            return false;
        }

        let Some(params) = SynParams::from_payload(envelope.data.as_ref()) else {
            trace!(cookie = %cookie, "dropping syn without session parameters");
            return false;
        };

        let config = self.config.responder_config(&params);
        let conn = Connection::responder(cookie.as_str(), config, now);
        debug!(cookie = %cookie, id = conn.id(), "accepted connection");
        self.events.push_back(ServerEvent::Accepted {
            cookie: cookie.clone(),
            init: params.init,
        });

        let routed = match self.sessions.insert(conn) {
            Ok(conn) => conn.write(packet, now),
            Err(err) => {
                self.events.push_back(ServerEvent::Error(err));
                false
            }
        };
        self.collect(&cookie);
        routed
    }

    /// Send application data on a connection.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownCookie`] if no such connection is tracked, and
    /// [`ServerError::Connection`] if the connection is not open.
    pub fn send_to(&mut self, cookie: &str, payload: Payload) -> Result<(), ServerError> {
        let conn = self
            .sessions
            .get_mut(cookie)
            .ok_or_else(|| ServerError::UnknownCookie(cookie.to_string()))?;
        let result = conn.send(payload).map_err(|source| ServerError::Connection {
            cookie: cookie.to_string(),
            source,
        });
        self.collect(cookie);
        result
    }

    /// Close one connection.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownCookie`] if no such connection is tracked.
    pub fn close_connection(&mut self, cookie: &str) -> Result<(), ServerError> {
        let conn = self
            .sessions
            .get_mut(cookie)
            .ok_or_else(|| ServerError::UnknownCookie(cookie.to_string()))?;
        conn.close();
        self.collect(cookie);
        Ok(())
    }

    /// Earliest timer deadline across all connections.
    pub fn poll_timeout(&self) -> Option<Instant> {
        if self.sessions.is_empty() {
            return None;
        }
        self.sessions.iter().filter_map(Connection::poll_timeout).min()
    }

    /// Fire expired timers on every connection.
    pub fn handle_timeout(&mut self, now: Instant) {
        for cookie in self.sessions.cookies() {
            if let Some(conn) = self.sessions.get_mut(&cookie) {
                conn.handle_timeout(now);
            }
            self.collect(&cookie);
        }
    }

    /// Take the next queued event.
    pub fn poll_event(&mut self) -> Option<ServerEvent> {
        self.events.pop_front()
    }

    /// Move a connection's events into the server queue, and forget the
    /// connection once it has closed or failed.
    fn collect(&mut self, cookie: &str) {
        let Some(conn) = self.sessions.get_mut(cookie) else {
            return;
        };

        for event in conn.drain_events() {
            let event = match event {
                ConnectionEvent::Transmit(packet) => ServerEvent::Transmit(packet),
                ConnectionEvent::Opened { .. } => ServerEvent::Opened {
                    cookie: cookie.to_string(),
                },
                ConnectionEvent::Message(payload) => ServerEvent::Message {
                    cookie: cookie.to_string(),
                    payload,
                },
                ConnectionEvent::Error(error) => ServerEvent::ConnectionError {
                    cookie: cookie.to_string(),
                    error,
                },
                ConnectionEvent::Closed => ServerEvent::Closed {
                    cookie: cookie.to_string(),
                },
            };
            self.events.push_back(event);
        }

        if conn.is_terminated() {
            debug!(cookie = %cookie, state = %conn.state(), "removing connection");
            self.sessions.remove(cookie);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{ConnectionPacket, ConnectionState, PacketType, SequencedPacket};
    use serde_json::json;

    const PORT: &str = "echo";

    fn syn(cookie: &str, seq: u32) -> WirePacket {
        let params = SynParams::new(Duration::from_secs(5), Duration::from_secs(15), None);
        SequencedPacket::new(
            seq,
            ConnectionPacket::new(PORT, PacketType::Syn, cookie).with_data(Some(params.to_payload())),
        )
    }

    fn packet(cookie: &str, seq: u32, kind: PacketType) -> WirePacket {
        SequencedPacket::new(seq, ConnectionPacket::new(PORT, kind, cookie))
    }

    fn events(server: &mut Server) -> Vec<ServerEvent> {
        std::iter::from_fn(|| server.poll_event()).collect()
    }

    fn started() -> Server {
        let mut server = Server::new(ServerBuilder::new(PORT).build());
        server.start();
        events(&mut server);
        server
    }

    #[test]
    fn test_start_stop_idempotent() {
        let mut server = Server::new(ServerBuilder::new(PORT).build());
        assert!(!server.is_active());

        server.start();
        server.start();
        assert!(server.is_active());
        assert_eq!(events(&mut server), vec![ServerEvent::Started]);

        server.stop(false);
        server.stop(false);
        assert!(!server.is_active());
        assert_eq!(events(&mut server), vec![ServerEvent::Stopped]);
    }

    #[test]
    fn test_inactive_server_drops_syn() {
        let mut server = Server::new(ServerBuilder::new(PORT).build());
        assert!(!server.write(syn("c1", 0), Instant::now()));
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn test_accepts_syn() {
        let mut server = started();
        assert!(server.write(syn("c1", 0), Instant::now()));
        assert!(server.contains("c1"));

        let events = events(&mut server);
        assert_eq!(
            events[0],
            ServerEvent::Accepted {
                cookie: "c1".to_string(),
                init: None
            }
        );
        match &events[1] {
            ServerEvent::Transmit(p) => {
                assert_eq!(p.seq, 0);
                assert_eq!(p.data.kind, PacketType::SynAck);
                assert_eq!(p.data.cookie, "c1");
            }
            other => panic!("expected synack, got {other:?}"),
        }
    }

    #[test]
    fn test_syn_init_surfaces_in_accepted() {
        let mut server = started();
        let params = SynParams::new(
            Duration::from_secs(5),
            Duration::from_secs(15),
            Some(json!({"token": 7})),
        );
        let syn = SequencedPacket::new(
            0,
            ConnectionPacket::new(PORT, PacketType::Syn, "c1").with_data(Some(params.to_payload())),
        );
        server.write(syn, Instant::now());
        assert_eq!(
            server.poll_event(),
            Some(ServerEvent::Accepted {
                cookie: "c1".to_string(),
                init: Some(json!({"token": 7}))
            })
        );
    }

    #[test]
    fn test_drops_foreign_port() {
        let mut server = started();
        let mut packet = syn("c1", 0);
        packet.data.port = "other".to_string();
        assert!(!server.write(packet, Instant::now()));
        assert!(events(&mut server).is_empty());
    }

    #[test]
    fn test_drops_syn_behind_sequence() {
        let mut server = started();
        assert!(!server.write(syn("c1", 3), Instant::now()));
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn test_drops_syn_without_params() {
        let mut server = started();
        assert!(!server.write(packet("c1", 0, PacketType::Syn), Instant::now()));
        assert_eq!(server.connection_count(), 0);
    }

    #[test]
    fn test_drops_unknown_cookie() {
        let mut server = started();
        assert!(!server.write(packet("nobody", 1, PacketType::Ack), Instant::now()));
        assert!(!server.write(packet("", 0, PacketType::Data), Instant::now()));
    }

    #[test]
    fn test_drops_syn_without_cookie() {
        let mut server = started();
        assert!(!server.write(syn("", 0), Instant::now()));
        assert_eq!(server.connection_count(), 0);
        assert!(!server.contains(""));
        assert!(events(&mut server).is_empty());
    }

    #[test]
    fn test_duplicate_cookie() {
        let mut server = started();
        let now = Instant::now();
        assert!(server.write(syn("c1", 0), now));
        events(&mut server);

        assert!(!server.write(syn("c1", 0), now));
        assert_eq!(
            events(&mut server),
            vec![ServerEvent::Error(ServerError::DuplicateCookie(
                "c1".to_string()
            ))]
        );
        assert_eq!(server.connection_count(), 1);
        assert_eq!(
            server.connection("c1").map(Connection::state),
            Some(ConnectionState::Opening)
        );
    }

    #[test]
    fn test_routes_by_cookie() {
        let mut server = started();
        let now = Instant::now();
        server.write(syn("c1", 0), now);
        server.write(syn("c2", 0), now);
        events(&mut server);

        assert!(server.write(packet("c2", 1, PacketType::Ack), now));
        assert_eq!(
            events(&mut server),
            vec![ServerEvent::Opened {
                cookie: "c2".to_string()
            }]
        );
        assert!(server.connection("c2").unwrap().is_open());
        assert!(!server.connection("c1").unwrap().is_open());
    }

    #[test]
    fn test_message_and_send_to() {
        let mut server = started();
        let now = Instant::now();
        server.write(syn("c1", 0), now);
        server.write(packet("c1", 1, PacketType::Ack), now);
        events(&mut server);

        let data = SequencedPacket::new(
            2,
            ConnectionPacket::new(PORT, PacketType::Data, "c1").with_data(Some(json!("ping"))),
        );
        server.write(data, now);
        assert_eq!(
            events(&mut server),
            vec![ServerEvent::Message {
                cookie: "c1".to_string(),
                payload: json!("ping")
            }]
        );

        server.send_to("c1", json!("pong")).unwrap();
        match server.poll_event() {
            Some(ServerEvent::Transmit(p)) => {
                assert_eq!(p.data.kind, PacketType::Data);
                assert_eq!(p.data.data, Some(json!("pong")));
            }
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[test]
    fn test_send_to_errors() {
        let mut server = started();
        assert_eq!(
            server.send_to("missing", json!(1)),
            Err(ServerError::UnknownCookie("missing".to_string()))
        );

        server.write(syn("c1", 0), Instant::now());
        assert!(matches!(
            server.send_to("c1", json!(1)),
            Err(ServerError::Connection {
                source: ConnectionError::NotOpen { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_fin_removes_connection() {
        let mut server = started();
        let now = Instant::now();
        server.write(syn("c1", 0), now);
        server.write(packet("c1", 1, PacketType::Ack), now);
        server.write(packet("c1", 2, PacketType::Fin), now);

        assert!(!server.contains("c1"));
        assert!(events(&mut server).contains(&ServerEvent::Closed {
            cookie: "c1".to_string()
        }));

        // The cookie is free again.
        assert!(server.write(syn("c1", 0), now));
    }

    #[test]
    fn test_connect_timeout_removes_connection() {
        let mut server = started();
        let now = Instant::now();
        server.write(syn("c1", 0), now);
        events(&mut server);

        assert_eq!(server.poll_timeout(), Some(now + DEFAULT_CONNECT_TIMEOUT));
        server.handle_timeout(now + DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(server.connection_count(), 0);
        assert_eq!(
            events(&mut server),
            vec![ServerEvent::ConnectionError {
                cookie: "c1".to_string(),
                error: ConnectionError::ConnectTimeout(DEFAULT_CONNECT_TIMEOUT),
            }]
        );
        assert_eq!(server.poll_timeout(), None);
    }

    #[test]
    fn test_stop_kill_all() {
        let mut server = started();
        let now = Instant::now();
        for cookie in ["a", "b", "c"] {
            server.write(syn(cookie, 0), now);
        }
        events(&mut server);

        server.stop(true);
        assert_eq!(server.connection_count(), 0);
        let events = events(&mut server);
        assert_eq!(events[0], ServerEvent::Stopped);
        let closed = events
            .iter()
            .filter(|e| matches!(e, ServerEvent::Closed { .. }))
            .count();
        assert_eq!(closed, 3);
    }

    #[test]
    fn test_stop_keeps_connections() {
        let mut server = started();
        let now = Instant::now();
        server.write(syn("c1", 0), now);
        server.stop(false);
        assert_eq!(server.connection_count(), 1);

        // Existing connections keep routing; new SYNs are refused.
        assert!(server.write(packet("c1", 1, PacketType::Ack), now));
        assert!(!server.write(syn("c2", 0), now));
    }
}
