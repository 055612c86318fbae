//! Connection error types.

use std::time::Duration;

use thiserror::Error;

use super::connection::ConnectionState;
use crate::core::SequenceError;

/// Errors reported by a connection to its owner.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The handshake did not complete in time. The connection has failed.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Nothing was received for the idle timeout. The connection is closed.
    #[error("session timed out after {0:?} idle")]
    IdleTimeout(Duration),

    /// `send` was called outside the open state. Nothing was transmitted.
    #[error("attempted to send while not open (state: {state})")]
    NotOpen {
        /// State at the time of the call.
        state: ConnectionState,
    },

    /// `send` was called with a null payload, which the wire cannot tell
    /// apart from no payload.
    #[error("payload must not be null")]
    AbsentPayload,

    /// The reorder buffer overflowed. The connection is closed.
    #[error("sequencing failed: {0}")]
    Overflow(#[from] SequenceError),
}

impl ConnectionError {
    /// Check if this error ended the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout(_) | Self::IdleTimeout(_) | Self::Overflow(_)
        )
    }
}
