//! Broker error types.

use std::fmt;

/// Errors surfaced to the transport layer.
///
/// Client-absent, unauthenticated and malformed-input conditions are normal
/// flow and never reach this type; internal inconsistency (sequence id
/// overflow, corrupted buffers) panics instead of being reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The command queue hit its configured ceiling. Retryable: the queue
    /// drains one entry per heartbeat.
    QueueFull { depth: usize },
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull { depth } => write!(f, "command queue full ({depth} pending)"),
        }
    }
}

impl std::error::Error for BrokerError {}
