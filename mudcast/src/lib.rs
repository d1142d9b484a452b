//! # mudcast — store-and-forward session broker for text interaction
//!
//! Multiple clients exchange textual commands and receive textual
//! notifications through a polling protocol instead of persistent
//! connections. The broker buffers per-client messages under globally
//! monotonic sequence numbers, serializes command execution on a
//! time-boxed tick, and ties opaque client keys to application sessions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  POST {command, since}  ┌─────────────┐
//! │  client  │ ◄─────────────────────► │ HTTP server │
//! │ (polls)  │   {messages: [...]}     │ (axum)      │
//! └──────────┘                         └──────┬──────┘
//!                                             │ one lock per request
//!                                             ▼
//!                                      ┌─────────────┐
//!                                      │   Broker    │
//!                                      │ queue・log・ │
//!                                      │  sessions   │
//!                                      └──────┬──────┘
//!                                             │ on_join / on_command
//!                                             ▼
//!                                      ┌─────────────┐
//!                                      │ Application │
//!                                      │ (Chatroom)  │
//!                                      └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`message_log`] — per-client bounded buffers, monotonic sequence ids
//! - [`queue`] — FIFO command queue with a depth ceiling
//! - [`session`] — client identity and Unattached → Attached lifecycle
//! - [`broker`] — the orchestrator and the `Application` seam
//! - [`chatroom`] — the bundled demo application
//! - [`server`] — HTTP polling transport (cookies, heartbeats, sweeper)

pub mod broker;
pub mod chatroom;
pub mod error;
pub mod message_log;
pub mod queue;
pub mod server;
pub mod session;

// Re-exports for convenience
pub use broker::{Application, Broker, BrokerConfig, Outbox};
pub use chatroom::Chatroom;
pub use error::BrokerError;
pub use message_log::{Message, MessageLog, Targets};
pub use queue::{CommandQueue, QueueEntry};
pub use server::{PollRequest, PollResponse, ServerConfig, ServerHandle};
pub use session::{ClientKey, SessionRegistry, SessionState};
