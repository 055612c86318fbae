//! Wire envelope types.
//!
//! Two layers of envelope travel on the wire:
//!
//! ```text
//! SequencedPacket { seq, data: ConnectionPacket { port, type, cookie, data? } }
//! ```
//!
//! The outer layer is owned by the reorder buffer, the inner one by the
//! connection. Field names are part of the contract between peers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application payload carried by DATA packets and handshake init data.
pub type Payload = serde_json::Value;

/// Packet produced by a reorder buffer: a payload tagged with its sequence number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequencedPacket<T> {
    /// Sequence number, modulo the configured wrap.
    pub seq: u32,
    /// Sequenced payload.
    pub data: T,
}

impl<T> SequencedPacket<T> {
    /// Create a sequenced packet.
    pub fn new(seq: u32, data: T) -> Self {
        Self { seq, data }
    }
}

/// Connection-level packet type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketType {
    /// Handshake initiation, carries [`SynParams`].
    Syn,
    /// Handshake response, carries the responder's init data.
    SynAck,
    /// Handshake completion, and keep-alive once open.
    Ack,
    /// Graceful teardown.
    Fin,
    /// Application data.
    Data,
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Syn => "syn",
            Self::SynAck => "synack",
            Self::Ack => "ack",
            Self::Fin => "fin",
            Self::Data => "data",
        };
        f.write_str(name)
    }
}

/// Connection envelope carried inside a [`SequencedPacket`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPacket {
    /// Logical service name.
    pub port: String,
    /// Packet type.
    #[serde(rename = "type")]
    pub kind: PacketType,
    /// Connection cookie chosen by the initiator.
    pub cookie: String,
    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Payload>,
}

impl ConnectionPacket {
    /// Create a packet without payload.
    pub fn new(port: impl Into<String>, kind: PacketType, cookie: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            kind,
            cookie: cookie.into(),
            data: None,
        }
    }

    /// Attach a payload.
    pub fn with_data(mut self, data: Option<Payload>) -> Self {
        self.data = data;
        self
    }

    /// Check if this packet opens a new connection.
    pub fn is_syn(&self) -> bool {
        self.kind == PacketType::Syn
    }
}

/// Session parameters requested by the initiator in its SYN.
///
/// Durations travel as milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SynParams {
    /// Keep-alive interval in milliseconds.
    pub keep_alive_interval: u64,
    /// Idle timeout in milliseconds.
    pub idle_timeout: u64,
    /// Application init data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<Payload>,
}

impl SynParams {
    /// Build parameters from durations.
    pub fn new(keep_alive_interval: Duration, idle_timeout: Duration, init: Option<Payload>) -> Self {
        Self {
            keep_alive_interval: duration_to_millis(keep_alive_interval),
            idle_timeout: duration_to_millis(idle_timeout),
            init,
        }
    }

    /// Requested keep-alive interval.
    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_millis(self.keep_alive_interval)
    }

    /// Requested idle timeout.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout)
    }

    /// Encode as a packet payload.
    pub fn to_payload(&self) -> Payload {
        serde_json::to_value(self).unwrap_or(Payload::Null)
    }

    /// Decode from a packet payload.
    ///
    /// Returns `None` when the payload is missing or not shaped like SYN parameters.
    pub fn from_payload(payload: Option<&Payload>) -> Option<Self> {
        payload.and_then(|p| Self::deserialize(p).ok())
    }
}

fn duration_to_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
