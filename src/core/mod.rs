//! Core constants, errors, and identifier sources.

pub mod constants;
mod cookie;
mod error;

pub use cookie::{CookieSource, FixedCookies, RandomCookies};
pub use error::{CodecError, SeqconnError, SequenceError};
