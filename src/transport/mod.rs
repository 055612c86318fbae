//! Sequencing and connection layer.
//!
//! - **Reorder buffer**: [`ReorderBuffer`] stamps outgoing payloads with a
//!   wrapping sequence number and restores send order on the receiving side
//! - **Connection**: [`Connection`] runs the SYN/SYNACK/ACK handshake,
//!   keep-alives, idle supervision, and FIN teardown
//! - **Wire format**: [`SequencedPacket`], [`ConnectionPacket`], and the JSON
//!   [`codec`]
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Server / Client                  │
//! ├─────────────────────────────────────────┤
//! │        Connection                       │  handshake, liveness, teardown
//! ├─────────────────────────────────────────┤
//! │        Reorder buffer                   │  seq stamping, in-order delivery
//! ├─────────────────────────────────────────┤
//! │   Unordered, lossless datagram channel  │
//! └─────────────────────────────────────────┘
//! ```

pub mod codec;
mod connection;
mod error;
mod packet;
mod reorder;
pub mod sequence;
mod timer;

pub use codec::WirePacket;
pub use connection::*;
pub use error::*;
pub use packet::*;
pub use reorder::ReorderBuffer;
pub use timer::Timer;
