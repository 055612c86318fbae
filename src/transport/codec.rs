//! JSON codec for the wire envelope.
//!
//! The transport moves opaque datagrams. This module turns a
//! [`SequencedPacket<ConnectionPacket>`] into bytes and back, rejecting
//! anything that does not carry a well-formed sequence number and payload.

use serde::Deserialize;

use super::packet::{ConnectionPacket, SequencedPacket};
use crate::core::CodecError;

/// Wire packet as exchanged between connections.
pub type WirePacket = SequencedPacket<ConnectionPacket>;

#[derive(Deserialize)]
struct RawPacket {
    seq: u64,
    data: ConnectionPacket,
}

/// Encode a packet to bytes.
pub fn encode(packet: &WirePacket) -> Result<Vec<u8>, CodecError> {
    Ok(serde_json::to_vec(packet)?)
}

/// Decode a packet, checking the sequence number against `seq_wrap`.
pub fn decode(bytes: &[u8], seq_wrap: u32) -> Result<WirePacket, CodecError> {
    let raw: RawPacket = serde_json::from_slice(bytes)?;
    if raw.seq >= u64::from(seq_wrap) {
        return Err(CodecError::SequenceOutOfRange {
            seq: raw.seq,
            seq_wrap,
        });
    }
    // seq < seq_wrap <= u32::MAX
    let seq = raw.seq as u32;
    Ok(SequencedPacket::new(seq, raw.data))
}
