//! Error types shared across layers.

use thiserror::Error;

/// Errors raised by a reorder buffer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// The pending set filled up; the buffer has been cleared and closed.
    #[error("too many pending packets (limit {max_pending})")]
    TooManyPending {
        /// Configured pending limit.
        max_pending: usize,
    },

    /// The buffer was closed by an earlier overflow.
    #[error("reorder buffer closed")]
    Closed,
}

/// Errors decoding the wire envelope.
///
/// Every variant is malformed input: ingestion points drop it without
/// reporting to the owner.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Not valid JSON, or a required field is missing or mistyped.
    #[error("invalid envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// The sequence number is outside `0..seq_wrap`.
    #[error("sequence number {seq} outside window of {seq_wrap}")]
    SequenceOutOfRange {
        /// Received sequence number.
        seq: u64,
        /// Configured wrap.
        seq_wrap: u32,
    },
}

/// Top-level seqconn errors.
#[derive(Debug, Error)]
pub enum SeqconnError {
    /// Sequencing error.
    #[error("sequence error: {0}")]
    Sequence(#[from] SequenceError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(#[from] crate::transport::ConnectionError),

    /// Server error.
    #[cfg(feature = "server")]
    #[error("server error: {0}")]
    Server(#[from] crate::server::ServerError),

    /// Client error.
    #[cfg(feature = "client")]
    #[error("client error: {0}")]
    Client(#[from] crate::client::ClientError),
}
