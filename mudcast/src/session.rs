//! Client identity and session lifecycle.
//!
//! A [`ClientKey`] is the opaque identity the transport assigns to one
//! connected participant — the session cookie plus a serial number issued
//! on first contact. The broker compares keys by value and never looks
//! inside them.
//!
//! The [`SessionRegistry`] tracks where each key sits in the
//! Unattached → Attached lifecycle and when it was last seen, so that
//! clients which stop polling can be evicted.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Opaque, stable identifier for one connected participant.
///
/// Produced by the transport layer; never reused after a prune.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientKey {
    session: Uuid,
    serial: u64,
}

impl ClientKey {
    pub fn new(session: Uuid, serial: u64) -> Self {
        Self { session, serial }
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.session, self.serial)
    }
}

/// Where a key sits in its lifecycle.
///
/// The only transition is Unattached → Attached; there is no logout.
/// Keys leave the registry through `remove` (prune) alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Known to the broker but not yet bound to an application identity.
    Unattached,
    /// Bound to an application identity (e.g. a logged-in display name).
    Attached { handle: String },
}

struct SessionRecord {
    state: SessionState,
    last_seen: Instant,
}

/// Registry of every known client key and its attachment state.
#[derive(Default)]
pub struct SessionRegistry {
    records: HashMap<ClientKey, SessionRecord>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` as Unattached.
    ///
    /// Idempotent: an already-known key keeps its state and last-seen time.
    pub fn attach(&mut self, key: &ClientKey) {
        self.records
            .entry(key.clone())
            .or_insert_with(|| SessionRecord {
                state: SessionState::Unattached,
                last_seen: Instant::now(),
            });
    }

    /// Transition `key` from Unattached to Attached under `handle`.
    ///
    /// Returns `false` without touching anything if the key is unknown or
    /// already Attached — only unattached clients may connect.
    pub fn promote(&mut self, key: &ClientKey, handle: impl Into<String>) -> bool {
        match self.records.get_mut(key) {
            Some(record) if record.state == SessionState::Unattached => {
                record.state = SessionState::Attached {
                    handle: handle.into(),
                };
                true
            }
            _ => false,
        }
    }

    pub fn contains(&self, key: &ClientKey) -> bool {
        self.records.contains_key(key)
    }

    pub fn is_attached(&self, key: &ClientKey) -> bool {
        matches!(
            self.records.get(key),
            Some(SessionRecord {
                state: SessionState::Attached { .. },
                ..
            })
        )
    }

    /// The handle `key` was promoted with, if it is Attached.
    pub fn handle(&self, key: &ClientKey) -> Option<&str> {
        match self.records.get(key) {
            Some(SessionRecord {
                state: SessionState::Attached { handle },
                ..
            }) => Some(handle),
            _ => None,
        }
    }

    /// Refresh the last-seen time for `key`. No-op for unknown keys.
    pub fn touch(&mut self, key: &ClientKey) {
        if let Some(record) = self.records.get_mut(key) {
            record.last_seen = Instant::now();
        }
    }

    /// Keys that have not been seen for longer than `timeout`.
    pub fn idle_keys(&self, timeout: Duration) -> Vec<ClientKey> {
        self.records
            .iter()
            .filter(|(_, record)| record.last_seen.elapsed() > timeout)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Remove the record for `key`. Returns whether it existed.
    pub fn remove(&mut self, key: &ClientKey) -> bool {
        self.records.remove(key).is_some()
    }

    /// Every Attached key, in arbitrary order.
    pub fn attached_keys(&self) -> Vec<ClientKey> {
        self.records
            .iter()
            .filter(|(_, record)| matches!(record.state, SessionState::Attached { .. }))
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
