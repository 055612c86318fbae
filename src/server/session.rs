//! Server session table.
//!
//! Live connections keyed by cookie. At most one connection per cookie;
//! a second insert under the same cookie is refused.

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use super::server::ServerError;
use crate::transport::Connection;

/// Connections tracked by a server.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, Connection>,
}

impl SessionTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `conn` under its cookie.
    ///
    /// # Errors
    ///
    /// [`ServerError::DuplicateCookie`] if the cookie is already taken; the
    /// tracked connection is left untouched and `conn` is dropped.
    pub fn insert(&mut self, conn: Connection) -> Result<&mut Connection, ServerError> {
        match self.sessions.entry(conn.cookie().to_string()) {
            Entry::Occupied(entry) => Err(ServerError::DuplicateCookie(entry.key().clone())),
            Entry::Vacant(slot) => Ok(slot.insert(conn)),
        }
    }

    /// Look up a connection.
    pub fn get(&self, cookie: &str) -> Option<&Connection> {
        self.sessions.get(cookie)
    }

    /// Look up a connection for mutation.
    pub fn get_mut(&mut self, cookie: &str) -> Option<&mut Connection> {
        self.sessions.get_mut(cookie)
    }

    /// Stop tracking a connection.
    pub fn remove(&mut self, cookie: &str) -> Option<Connection> {
        self.sessions.remove(cookie)
    }

    /// Check if a cookie is tracked.
    pub fn contains(&self, cookie: &str) -> bool {
        self.sessions.contains_key(cookie)
    }

    /// Snapshot of the tracked cookies.
    ///
    /// Iterate this rather than the table when the loop body may remove entries.
    pub fn cookies(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Iterate over tracked connections.
    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.sessions.values()
    }

    /// Number of tracked connections.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
