//! The bundled chat room application.
//!
//! Pre-auth clients may do exactly one thing: `connect <name>`. Everything
//! else they type is dropped without feedback. Once attached, a client's
//! input is echoed back to them and relayed, prefixed with their name, to
//! everyone else who is logged in.

use std::collections::HashMap;

use crate::broker::{Application, Outbox};
use crate::message_log::Targets;
use crate::session::ClientKey;

/// A logged-in participant.
#[derive(Debug, Clone)]
struct Player {
    name: String,
}

/// Chat room world: greets new arrivals, logs players in, relays talk.
#[derive(Default)]
pub struct Chatroom {
    players: HashMap<ClientKey, Player>,
}

impl Chatroom {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of logged-in players.
    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player_name(&self, key: &ClientKey) -> Option<&str> {
        self.players.get(key).map(|player| player.name.as_str())
    }
}

impl Application for Chatroom {
    fn on_join(&mut self, outbox: &mut Outbox<'_>, key: &ClientKey) {
        outbox.send(key, "Welcome! Type <code>connect username</code> to log in!");
    }

    fn on_command(
        &mut self,
        outbox: &mut Outbox<'_>,
        key: &ClientKey,
        command: &str,
        attached: bool,
    ) {
        if attached {
            let Some(name) = outbox.handle(key).map(str::to_string) else {
                return;
            };
            outbox.send(key, &format!("You say '{command}'"));
            let others: Vec<ClientKey> = outbox
                .attached_keys()
                .into_iter()
                .filter(|other| other != key)
                .collect();
            outbox.broadcast(Targets::Keys(&others), &format!("{name} says '{command}'"));
        } else {
            let mut params = command.split_whitespace();
            match (params.next(), params.next()) {
                (Some("connect"), Some(name)) => {
                    let name = name.to_string();
                    if outbox.promote(key, &name) {
                        self.players.insert(key.clone(), Player { name: name.clone() });
                        log::info!("{key} connected as {name}");
                        outbox.send(key, &format!("Welcome, {name}!"));
                    }
                }
                _ => {
                    // Unrecognized pre-auth input is dropped, not answered.
                    log::debug!("dropping pre-auth command from {key}: {command:?}");
                }
            }
        }
    }

    fn on_leave(&mut self, key: &ClientKey) {
        if let Some(player) = self.players.remove(key) {
            log::info!("{} ({key}) left", player.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::Broker;
    use uuid::Uuid;

    fn key(serial: u64) -> ClientKey {
        ClientKey::new(Uuid::new_v4(), serial)
    }

    fn bodies(broker: &mut Broker<Chatroom>, key: &ClientKey, since: u64) -> Vec<String> {
        broker
            .fetch_since(key, since)
            .into_iter()
            .map(|m| m.body)
            .collect()
    }

    #[test]
    fn test_join_welcome() {
        let mut broker = Broker::with_defaults(Chatroom::new());
        let k = key(1);
        broker.register(&k);

        assert_eq!(
            bodies(&mut broker, &k, 0),
            ["Welcome! Type <code>connect username</code> to log in!"]
        );
    }

    #[test]
    fn test_connect_logs_in() {
        let mut broker = Broker::with_defaults(Chatroom::new());
        let k = key(1);
        broker.register(&k);

        broker.enqueue("connect alice", Some(&k)).unwrap();
        broker.tick();

        assert!(broker.is_attached(&k));
        assert_eq!(broker.handle(&k), Some("alice"));
        assert_eq!(broker.app().player_count(), 1);
        assert_eq!(broker.app().player_name(&k), Some("alice"));
        assert_eq!(bodies(&mut broker, &k, 1), ["Welcome, alice!"]);
    }

    #[test]
    fn test_connect_without_name_is_dropped() {
        let mut broker = Broker::with_defaults(Chatroom::new());
        let k = key(1);
        broker.register(&k);

        broker.enqueue("connect", Some(&k)).unwrap();
        broker.tick();

        assert!(!broker.is_attached(&k));
        assert!(bodies(&mut broker, &k, 1).is_empty());
    }

    #[test]
    fn test_unknown_preauth_verb_is_dropped() {
        let mut broker = Broker::with_defaults(Chatroom::new());
        let k = key(1);
        broker.register(&k);

        broker.enqueue("dance wildly", Some(&k)).unwrap();
        broker.tick();

        assert!(!broker.is_attached(&k));
        assert!(bodies(&mut broker, &k, 1).is_empty());
    }

    #[test]
    fn test_say_echoes_and_relays() {
        let mut broker = Broker::with_defaults(Chatroom::new());
        let alice = key(1);
        let bob = key(2);
        broker.register(&alice);
        broker.register(&bob);
        broker.enqueue("connect alice", Some(&alice)).unwrap();
        broker.tick();
        broker.enqueue("connect bob", Some(&bob)).unwrap();
        broker.tick();

        let alice_mark = broker.fetch_since(&alice, 0).last().unwrap().seq;
        let bob_mark = broker.fetch_since(&bob, 0).last().unwrap().seq;

        broker.enqueue("hello", Some(&alice)).unwrap();
        broker.tick();

        assert_eq!(bodies(&mut broker, &alice, alice_mark), ["You say 'hello'"]);
        assert_eq!(bodies(&mut broker, &bob, bob_mark), ["alice says 'hello'"]);
    }

    #[test]
    fn test_say_with_single_player_reaches_nobody_else() {
        let mut broker = Broker::with_defaults(Chatroom::new());
        let alice = key(1);
        broker.register(&alice);
        broker.enqueue("connect alice", Some(&alice)).unwrap();
        broker.tick();

        let mark = broker.fetch_since(&alice, 0).last().unwrap().seq;
        broker.enqueue("anyone here?", Some(&alice)).unwrap();
        broker.tick();

        assert_eq!(bodies(&mut broker, &alice, mark), ["You say 'anyone here?'"]);
    }

    #[test]
    fn test_prune_releases_player_record() {
        let mut broker = Broker::with_defaults(Chatroom::new());
        let k = key(1);
        broker.register(&k);
        broker.enqueue("connect alice", Some(&k)).unwrap();
        broker.tick();
        assert_eq!(broker.app().player_count(), 1);

        broker.prune(&k);

        assert_eq!(broker.client_count(), 0);
        assert!(!broker.is_attached(&k));
        assert_eq!(broker.app().player_count(), 0);
        assert!(broker.app().player_name(&k).is_none());
    }

    #[test]
    fn test_unattached_client_does_not_receive_chat() {
        let mut broker = Broker::with_defaults(Chatroom::new());
        let alice = key(1);
        let lurker = key(2);
        broker.register(&alice);
        broker.register(&lurker);
        broker.enqueue("connect alice", Some(&alice)).unwrap();
        broker.tick();

        let lurker_mark = broker.fetch_since(&lurker, 0).last().unwrap().seq;
        broker.enqueue("secret plans", Some(&alice)).unwrap();
        broker.tick();

        assert!(bodies(&mut broker, &lurker, lurker_mark).is_empty());
    }
}
