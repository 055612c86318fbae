//! Client side: a single outbound connection.
//!
//! A [`Client`] picks a fresh cookie, opens an initiator [`Connection`], and
//! relays its traffic. All protocol behavior lives in the connection.

use std::time::Instant;

use thiserror::Error;

use crate::core::constants::DEFAULT_COOKIE_LEN;
use crate::core::{CookieSource, RandomCookies};
use crate::transport::{
    Connection, ConnectionConfig, ConnectionError, ConnectionEvent, ConnectionState, Payload,
    WirePacket,
};

/// Errors that can occur in the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The connection refused the operation.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// The client task has shut down.
    #[error("client disconnected")]
    Disconnected,
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Settings for the outbound connection.
    pub connection: ConnectionConfig,

    /// Length of generated cookies.
    pub cookie_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            cookie_len: DEFAULT_COOKIE_LEN,
        }
    }
}

impl From<ConnectionConfig> for ClientConfig {
    fn from(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            ..Self::default()
        }
    }
}

/// A client holding one initiator connection.
///
/// # Example
///
/// ```
/// use std::time::Instant;
/// use seqconn::client::{Client, ClientConfig};
/// use seqconn::transport::{ConnectionEvent, PacketType};
///
/// let mut client = Client::connect(ClientConfig::default(), Instant::now());
/// match client.poll_event() {
///     Some(ConnectionEvent::Transmit(packet)) => assert_eq!(packet.data.kind, PacketType::Syn),
///     other => panic!("expected a SYN, got {other:?}"),
/// }
/// ```
#[derive(Debug)]
pub struct Client {
    connection: Connection,
}

impl Client {
    /// Open a connection under a random cookie.
    pub fn connect(config: ClientConfig, now: Instant) -> Self {
        let mut cookies = RandomCookies::new(config.cookie_len);
        Self::connect_with(config, &mut cookies, now)
    }

    /// Open a connection under a cookie drawn from `cookies`.
    pub fn connect_with(config: ClientConfig, cookies: &mut impl CookieSource, now: Instant) -> Self {
        let cookie = cookies.next_cookie();
        Self {
            connection: Connection::initiator(cookie, config.connection, now),
        }
    }

    /// Connection cookie.
    pub fn cookie(&self) -> &str {
        self.connection.cookie()
    }

    /// Connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Send application data.
    ///
    /// # Errors
    ///
    /// See [`Connection::send`].
    pub fn send(&mut self, payload: Payload) -> Result<(), ClientError> {
        Ok(self.connection.send(payload)?)
    }

    /// Ingest a packet from the transport.
    pub fn write(&mut self, packet: WirePacket, now: Instant) -> bool {
        self.connection.write(packet, now)
    }

    /// Decode and ingest a datagram.
    pub fn write_bytes(&mut self, bytes: &[u8], now: Instant) -> bool {
        self.connection.write_bytes(bytes, now)
    }

    /// Close the connection.
    pub fn close(&mut self) {
        self.connection.close();
    }

    /// Earliest timer deadline.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.connection.poll_timeout()
    }

    /// Fire expired timers.
    pub fn handle_timeout(&mut self, now: Instant) {
        self.connection.handle_timeout(now);
    }

    /// Take the next queued event.
    pub fn poll_event(&mut self) -> Option<ConnectionEvent> {
        self.connection.poll_event()
    }
}
