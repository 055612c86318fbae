//! # seqconn
//!
//! Sequenced, connection-oriented messaging over an unordered datagram
//! channel.
//!
//! The crate layers three pieces on top of any transport that delivers
//! datagrams without loss but possibly out of order:
//!
//! - **Ordering**: a reorder buffer stamps every outgoing payload with a
//!   wrapping sequence number and hands received payloads back in send order
//! - **Connections**: a three-way handshake, keep-alives, idle supervision,
//!   and FIN teardown, all driven by caller-supplied time
//! - **Demultiplexing**: a server accepts connections on a named port and
//!   routes packets to them by cookie
//!
//! Every state machine is sans-IO: feed it packets and `Instant`s, then drain
//! its events. The optional tokio drivers own one state machine per task.
//!
//! ## Feature Flags
//!
//! - `runtime` (default): tokio drivers for clients and servers
//! - `client` (default): [`client::Client`]
//! - `server` (default): [`server::Server`]
//!
//! ## Example Usage
//!
//! ```rust
//! use std::time::Instant;
//! use seqconn::prelude::*;
//!
//! let now = Instant::now();
//! let mut server = Server::new(ServerBuilder::new("chat").build());
//! server.start();
//!
//! let config = ConnectionBuilder::new().port("chat").build();
//! let mut client = Client::connect(config.into(), now);
//!
//! // Shuttle packets until both ends are open.
//! for _ in 0..3 {
//!     while let Some(event) = client.poll_event() {
//!         if let ConnectionEvent::Transmit(packet) = event {
//!             server.write(packet, now);
//!         }
//!     }
//!     while let Some(event) = server.poll_event() {
//!         if let ServerEvent::Transmit(packet) = event {
//!             client.write(packet, now);
//!         }
//!     }
//! }
//! assert!(client.connection().is_open());
//! assert!(server.connection(client.cookie()).is_some_and(|c| c.is_open()));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Sequencing and connection layer (always included)
pub mod transport;

#[cfg(feature = "runtime")]
mod runtime;

// Client API (feature-gated)
#[cfg(feature = "client")]
#[cfg_attr(docsrs, doc(cfg(feature = "client")))]
pub mod client;

// Server API (feature-gated)
#[cfg(feature = "server")]
#[cfg_attr(docsrs, doc(cfg(feature = "server")))]
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{CookieSource, RandomCookies, SeqconnError, SequenceError};

    pub use crate::transport::{
        Connection, ConnectionBuilder, ConnectionConfig, ConnectionError, ConnectionEvent,
        ConnectionPacket, ConnectionState, PacketType, Payload, ReorderBuffer, SequencedPacket,
        WirePacket,
    };

    #[cfg(feature = "client")]
    pub use crate::client::{Client, ClientConfig, ClientError};

    #[cfg(feature = "server")]
    pub use crate::server::{Server, ServerBuilder, ServerConfig, ServerError, ServerEvent};
}

// Re-export commonly used items at crate root
pub use crate::core::{SeqconnError, SequenceError};
pub use crate::transport::{Connection, ConnectionEvent, ConnectionState, ReorderBuffer, SequencedPacket};
