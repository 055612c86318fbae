//! Server side: accepts connections on a port and demultiplexes by cookie.

#[cfg(feature = "runtime")]
pub mod driver;
#[allow(clippy::module_inception)]
mod server;
mod session;

#[cfg(feature = "runtime")]
pub use driver::{spawn, ServerHandle};
pub use server::*;
pub use session::SessionTable;
