//! Clock helpers shared by the tokio drivers.
//!
//! The state machines take `std::time::Instant`s. Reading them from the
//! tokio clock keeps drivers consistent with `tokio::time::pause`.

use std::time::Instant;

/// Current time on the tokio clock.
pub(crate) fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Sleep until `deadline`, or forever when there is none.
pub(crate) async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
