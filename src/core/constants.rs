//! Protocol constants and defaults.
//!
//! Peers must agree on [`SEQ_WRAP`]; everything else is a per-connection
//! default that can be overridden through the config builders.

use std::time::Duration;

// =============================================================================
// SEQUENCING
// =============================================================================

/// Sequence numbers are counted modulo this value.
pub const SEQ_WRAP: u32 = 65536;

/// A reorder buffer holding this many out-of-order packets has overflowed.
pub const DEFAULT_MAX_PENDING: usize = 20;

// =============================================================================
// CONNECTION TIMING
// =============================================================================

/// Time allowed for the three-way handshake to complete.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between keep-alive ACKs on an open connection.
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// An open connection that receives nothing for this long is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(15);

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Number of random characters in a generated cookie.
pub const DEFAULT_COOKIE_LEN: usize = 8;

/// Port used when a config does not name one.
pub const DEFAULT_PORT: &str = "default";

// =============================================================================
// DRIVERS
// =============================================================================

/// Capacity of the event and command channels created by the async drivers.
pub const DRIVER_CHANNEL_CAPACITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_ordering() {
        // Keep-alives must outpace the idle timeout or open connections die.
        assert!(DEFAULT_KEEP_ALIVE_INTERVAL < DEFAULT_IDLE_TIMEOUT);
    }

    #[test]
    fn test_seq_wrap_is_even() {
        assert_eq!(SEQ_WRAP % 2, 0);
        assert!(DEFAULT_MAX_PENDING < (SEQ_WRAP / 2) as usize);
    }
}
