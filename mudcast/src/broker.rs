//! The session/message broker.
//!
//! Architecture:
//! ```text
//! client request ──► enqueue ──► CommandQueue
//!       │                             │ tick (≤1 dispatch, time-boxed)
//!       │                             ▼
//!       │                    Application::on_command
//!       │                             │ Outbox::send / broadcast / promote
//!       │                             ▼
//!       └──── fetch_since ◄──── MessageLog (seq-stamped, capped)
//! ```
//!
//! All mutation funnels through `&mut Broker`. The transport wraps the
//! broker in a single `Arc<Mutex<_>>` and holds the lock across
//! enqueue + tick + fetch_since per request, so dispatches are linearizable
//! and a poller never observes a half-applied dispatch: the several
//! messages one dispatch appends become visible together.

use std::time::{Duration, Instant};

use crate::error::BrokerError;
use crate::message_log::{Message, MessageLog, Targets};
use crate::queue::{CommandQueue, QueueEntry};
use crate::session::{ClientKey, SessionRegistry};

/// Broker tuning knobs.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Messages retained per client buffer.
    pub log_capacity: usize,
    /// Time budget for one tick.
    pub tick_budget: Duration,
    /// Command queue ceiling; enqueue is refused beyond this.
    pub queue_depth: usize,
    /// Clients silent for longer than this are removed by `sweep_idle`.
    pub idle_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            log_capacity: 100,
            tick_budget: Duration::from_secs(1),
            queue_depth: 10_000,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

/// Application side of the broker seam.
///
/// The broker owns one application instance, injected at construction, and
/// calls it during `register` (join) and `tick` (dispatch). The application
/// answers only through the [`Outbox`] it is handed for the duration of the
/// callback — it never holds references into the broker's containers.
pub trait Application {
    /// A new client key was registered.
    fn on_join(&mut self, outbox: &mut Outbox<'_>, key: &ClientKey);

    /// A queued command reached the front of the queue. `attached` reflects
    /// the session state at dispatch time.
    fn on_command(
        &mut self,
        outbox: &mut Outbox<'_>,
        key: &ClientKey,
        command: &str,
        attached: bool,
    );

    /// A system-originated command (queued without a key). Dropped by
    /// default.
    fn on_system(&mut self, outbox: &mut Outbox<'_>, command: &str) {
        let _ = (outbox, command);
    }

    /// `key` was pruned. Applications holding per-key state must release
    /// it here; the key never comes back. No-op by default.
    fn on_leave(&mut self, key: &ClientKey) {
        let _ = key;
    }
}

/// Borrow-scoped view the application uses to answer a callback.
pub struct Outbox<'a> {
    log: &'a mut MessageLog,
    sessions: &'a mut SessionRegistry,
}

impl Outbox<'_> {
    /// Append `body` to one client's buffer. Returns the sequence id.
    pub fn send(&mut self, key: &ClientKey, body: &str) -> u64 {
        self.log.append(Targets::Keys(std::slice::from_ref(key)), body)
    }

    /// Append `body` to a target set under one sequence id.
    pub fn broadcast(&mut self, targets: Targets<'_>, body: &str) -> u64 {
        self.log.append(targets, body)
    }

    /// Promote an unattached session. See [`SessionRegistry::promote`].
    pub fn promote(&mut self, key: &ClientKey, handle: &str) -> bool {
        self.sessions.promote(key, handle)
    }

    pub fn is_attached(&self, key: &ClientKey) -> bool {
        self.sessions.is_attached(key)
    }

    pub fn handle(&self, key: &ClientKey) -> Option<&str> {
        self.sessions.handle(key)
    }

    /// Every attached key, e.g. for "everyone but me" fan-out.
    pub fn attached_keys(&self) -> Vec<ClientKey> {
        self.sessions.attached_keys()
    }
}

/// The orchestrator: owns the message log, the command queue, the session
/// registry and the application.
pub struct Broker<A: Application> {
    config: BrokerConfig,
    log: MessageLog,
    queue: CommandQueue,
    sessions: SessionRegistry,
    app: A,
}

impl<A: Application> Broker<A> {
    pub fn new(app: A, config: BrokerConfig) -> Self {
        Self {
            log: MessageLog::new(config.log_capacity),
            queue: CommandQueue::new(config.queue_depth),
            sessions: SessionRegistry::new(),
            config,
            app,
        }
    }

    pub fn with_defaults(app: A) -> Self {
        Self::new(app, BrokerConfig::default())
    }

    /// Register a new client key.
    ///
    /// Creates an empty message buffer, marks the session Unattached and
    /// notifies the application, which typically pushes a welcome message.
    /// Re-registering a known key is a strict no-op: no duplicate welcome,
    /// no buffer reset.
    pub fn register(&mut self, key: &ClientKey) {
        if self.log.contains(key) {
            log::debug!("register: {key} already known");
            return;
        }
        self.log.insert_client(key);
        self.sessions.attach(key);
        log::info!("registered client {key}");

        let mut outbox = Outbox {
            log: &mut self.log,
            sessions: &mut self.sessions,
        };
        self.app.on_join(&mut outbox, key);
    }

    /// Queue a command for a later tick. `key == None` marks a
    /// system-originated command. The text is not validated or sanitized
    /// here; that is the application's job.
    pub fn enqueue(&mut self, command: &str, key: Option<&ClientKey>) -> Result<(), BrokerError> {
        if let Some(key) = key {
            self.sessions.touch(key);
        }
        self.queue.push(QueueEntry {
            key: key.cloned(),
            command: command.to_string(),
        })
    }

    /// Run queued work within the configured time budget.
    ///
    /// Dispatches at most one entry per call. Ticks fire once per client
    /// heartbeat, so one dispatch per heartbeat keeps the queue drain rate
    /// proportional to the number of live clients and bounds the work any
    /// single request pays for; a drain loop would let one heartbeat
    /// execute an unbounded burst of other clients' commands. The budget
    /// check still gates the dispatch, so a tick can never stall its caller.
    ///
    /// Routing: a keyless entry goes to [`Application::on_system`]; a
    /// registered key goes to [`Application::on_command`] with its current
    /// attachment state; an unregistered key is dropped silently — the
    /// client vanished, which is normal, not a fault.
    pub fn tick(&mut self) {
        let start = Instant::now();
        if self.queue.is_empty() || start.elapsed() >= self.config.tick_budget {
            return;
        }
        let Some(entry) = self.queue.pop() else {
            return;
        };

        match entry.key {
            None => {
                let mut outbox = Outbox {
                    log: &mut self.log,
                    sessions: &mut self.sessions,
                };
                self.app.on_system(&mut outbox, &entry.command);
            }
            Some(key) => {
                if !self.sessions.contains(&key) {
                    log::debug!("tick: dropping command from unknown key {key}");
                    return;
                }
                let attached = self.sessions.is_attached(&key);
                let mut outbox = Outbox {
                    log: &mut self.log,
                    sessions: &mut self.sessions,
                };
                self.app.on_command(&mut outbox, &key, &entry.command, attached);
            }
        }
    }

    /// Append `body` to a target set. Thin pass-through to the message log.
    pub fn broadcast(&mut self, targets: Targets<'_>, body: &str) -> u64 {
        self.log.append(targets, body)
    }

    /// Retained messages for `key` newer than `watermark`, oldest first.
    /// A watermark of 0 means everything retained. Unknown keys yield an
    /// empty vec, never an error.
    pub fn fetch_since(&mut self, key: &ClientKey, watermark: u64) -> Vec<Message> {
        self.sessions.touch(key);
        self.log.since(key, watermark)
    }

    /// Remove every trace of `key`: registry record, buffered messages,
    /// pending queue entries and the application's per-key state. The key
    /// is never reused afterwards.
    pub fn prune(&mut self, key: &ClientKey) {
        let known = self.sessions.remove(key);
        self.log.remove_client(key);
        self.queue.retain(|entry| entry.key.as_ref() != Some(key));
        if known {
            self.app.on_leave(key);
            log::info!("pruned client {key}");
        }
    }

    /// Prune every key idle longer than the configured timeout. Returns the
    /// pruned keys. Meant to run on a periodic background task, not on a
    /// client's request path.
    pub fn sweep_idle(&mut self) -> Vec<ClientKey> {
        let idle = self.sessions.idle_keys(self.config.idle_timeout);
        for key in &idle {
            self.prune(key);
        }
        idle
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.log.client_count()
    }

    /// Number of commands waiting for a tick.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_attached(&self, key: &ClientKey) -> bool {
        self.sessions.is_attached(key)
    }

    pub fn handle(&self, key: &ClientKey) -> Option<&str> {
        self.sessions.handle(key)
    }

    /// The application instance, e.g. for test assertions.
    pub fn app(&self) -> &A {
        &self.app
    }
}
