//! Shared connection-state registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::session::ConnectionState;

/// Session ID → connection state, shared by every session's event driver,
/// the connection barrier, and the dispatcher.
///
/// Entries are inserted at session creation and never removed during a run;
/// only the state flag changes.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<Mutex<HashMap<String, ConnectionState>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a session in the `Disconnected` state.
    pub fn register(&self, session_id: &str) {
        let mut states = self.inner.lock().unwrap();
        states.insert(session_id.to_string(), ConnectionState::Disconnected);
    }

    pub fn set_state(&self, session_id: &str, state: ConnectionState) {
        let mut states = self.inner.lock().unwrap();
        states.insert(session_id.to_string(), state);
    }

    pub fn state_of(&self, session_id: &str) -> Option<ConnectionState> {
        let states = self.inner.lock().unwrap();
        states.get(session_id).copied()
    }

    pub fn is_connected(&self, session_id: &str) -> bool {
        self.state_of(session_id) == Some(ConnectionState::Connected)
    }

    /// True when every registered session is `Connected`.
    pub fn all_connected(&self) -> bool {
        let states = self.inner.lock().unwrap();
        states.values().all(|s| *s == ConnectionState::Connected)
    }

    pub fn connected_count(&self) -> usize {
        let states = self.inner.lock().unwrap();
        states
            .values()
            .filter(|s| **s == ConnectionState::Connected)
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}
