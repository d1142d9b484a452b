//! Per-client message buffers with globally monotonic sequence numbers.
//!
//! Every append allocates one sequence id shared across all clients, so a
//! polling client's watermark can be compared against any message no matter
//! which buffer produced it. Buffers are capped; the oldest entries go
//! first when a buffer overflows.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::session::ClientKey;

/// A single sequence-stamped notification. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub seq: u64,
    pub body: String,
}

/// Delivery target set for one append.
#[derive(Debug, Clone, Copy)]
pub enum Targets<'a> {
    /// Every client currently known to the log.
    All,
    /// Exactly these keys; unknown keys are skipped.
    Keys(&'a [ClientKey]),
}

/// Store-and-forward buffer set: one bounded `VecDeque` per client.
pub struct MessageLog {
    buffers: HashMap<ClientKey, VecDeque<Message>>,
    next_seq: u64,
    capacity: usize,
}

impl MessageLog {
    /// Create a log whose per-client buffers retain at most `capacity`
    /// messages. Sequence ids start at 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            next_seq: 1,
            capacity,
        }
    }

    /// Create an empty buffer for `key`. Idempotent: an existing buffer and
    /// its contents are left alone.
    pub fn insert_client(&mut self, key: &ClientKey) {
        self.buffers.entry(key.clone()).or_default();
    }

    /// Drop `key`'s buffer. Returns whether it existed.
    pub fn remove_client(&mut self, key: &ClientKey) -> bool {
        self.buffers.remove(key).is_some()
    }

    pub fn contains(&self, key: &ClientKey) -> bool {
        self.buffers.contains_key(key)
    }

    pub fn client_count(&self) -> usize {
        self.buffers.len()
    }

    /// Retained entries for `key`, for inspection.
    pub fn buffer_len(&self, key: &ClientKey) -> usize {
        self.buffers.get(key).map_or(0, VecDeque::len)
    }

    /// Append `body` to every targeted buffer under one freshly allocated
    /// sequence id, evicting the oldest entries of any buffer that grows
    /// past capacity. Returns the allocated id.
    ///
    /// Unknown keys in the target set are skipped: a client that vanished
    /// mid-broadcast is a normal condition, not an error.
    pub fn append(&mut self, targets: Targets<'_>, body: &str) -> u64 {
        let seq = self.next_seq;
        // Allocation is serialized with the append itself; overflow would
        // corrupt every watermark, so it is fatal.
        self.next_seq = self
            .next_seq
            .checked_add(1)
            .expect("sequence id overflow");

        match targets {
            Targets::All => {
                for buffer in self.buffers.values_mut() {
                    Self::push_bounded(buffer, self.capacity, seq, body);
                }
            }
            Targets::Keys(keys) => {
                for key in keys {
                    if let Some(buffer) = self.buffers.get_mut(key) {
                        Self::push_bounded(buffer, self.capacity, seq, body);
                    }
                }
            }
        }

        log::trace!("appended seq {seq}");
        seq
    }

    fn push_bounded(buffer: &mut VecDeque<Message>, capacity: usize, seq: u64, body: &str) {
        // A duplicate key in the target set must not break the
        // strictly-increasing invariant within one buffer.
        if buffer.back().is_some_and(|last| last.seq == seq) {
            return;
        }
        buffer.push_back(Message {
            seq,
            body: body.to_string(),
        });
        while buffer.len() > capacity {
            buffer.pop_front();
        }
    }

    /// Retained entries for `key` with `seq > watermark`, oldest first.
    ///
    /// Unknown keys and exhausted buffers both yield an empty vec — the
    /// caller cannot tell a vanished client from a caught-up one, and does
    /// not need to.
    pub fn since(&self, key: &ClientKey, watermark: u64) -> Vec<Message> {
        match self.buffers.get(key) {
            Some(buffer) => buffer
                .iter()
                .filter(|message| message.seq > watermark)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }
}
