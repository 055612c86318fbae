//! Client side: one outbound connection per [`Client`].

#[allow(clippy::module_inception)]
mod client;
#[cfg(feature = "runtime")]
pub mod driver;

pub use client::{Client, ClientConfig, ClientError};
#[cfg(feature = "runtime")]
pub use driver::{spawn, ClientHandle};
