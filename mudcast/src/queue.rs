//! FIFO command queue with a depth ceiling.
//!
//! Strict insertion order, no priorities, no deduplication. The ceiling is
//! the one admission control the broker applies: past it, enqueue is
//! refused and the transport reports a retryable failure instead of letting
//! a command flood grow memory without bound.

use std::collections::VecDeque;

use crate::error::BrokerError;
use crate::session::ClientKey;

/// One pending command. `key == None` marks a system-originated command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub key: Option<ClientKey>,
    pub command: String,
}

/// Pending commands in arrival order.
pub struct CommandQueue {
    entries: VecDeque<QueueEntry>,
    max_depth: usize,
}

impl CommandQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_depth,
        }
    }

    /// Append to the tail, refusing once the ceiling is reached.
    pub fn push(&mut self, entry: QueueEntry) -> Result<(), BrokerError> {
        if self.entries.len() >= self.max_depth {
            return Err(BrokerError::QueueFull {
                depth: self.entries.len(),
            });
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Take the head entry, if any.
    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.entries.pop_front()
    }

    /// Keep only the entries `predicate` accepts, preserving order. Used by
    /// prune to drop a departed client's pending commands.
    pub fn retain(&mut self, predicate: impl FnMut(&QueueEntry) -> bool) {
        self.entries.retain(predicate);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
