//! Cookie generation.
//!
//! A cookie names one connection for its whole lifetime. It only has to be
//! unlikely to collide, so any source of random identifiers will do.

use rand::distributions::{Alphanumeric, DistString};

use super::constants::DEFAULT_COOKIE_LEN;

/// Source of fresh connection cookies.
pub trait CookieSource {
    /// Produce a new cookie.
    fn next_cookie(&mut self) -> String;
}

/// Alphanumeric cookies from the thread-local RNG.
#[derive(Debug, Clone)]
pub struct RandomCookies {
    len: usize,
}

impl RandomCookies {
    /// Create a generator producing cookies of `len` characters.
    pub fn new(len: usize) -> Self {
        Self { len }
    }

    /// Length of the generated cookies.
    pub fn cookie_len(&self) -> usize {
        self.len
    }
}

impl Default for RandomCookies {
    fn default() -> Self {
        Self::new(DEFAULT_COOKIE_LEN)
    }
}

impl CookieSource for RandomCookies {
    fn next_cookie(&mut self) -> String {
        Alphanumeric.sample_string(&mut rand::thread_rng(), self.len)
    }
}

/// Fixed sequence of cookies, handed out in order then repeated from the end.
///
/// Useful when a test needs to force a collision.
#[derive(Debug, Clone)]
pub struct FixedCookies {
    cookies: Vec<String>,
    next: usize,
}

impl FixedCookies {
    /// Create a source from a list of cookies.
    pub fn new<I, S>(cookies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cookies: cookies.into_iter().map(Into::into).collect(),
            next: 0,
        }
    }
}

impl CookieSource for FixedCookies {
    fn next_cookie(&mut self) -> String {
        let idx = self.next.min(self.cookies.len().saturating_sub(1));
        self.next += 1;
        self.cookies.get(idx).cloned().unwrap_or_default()
    }
}
