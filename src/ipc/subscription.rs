//! Signal subscription table and fan-out.
//!
//! A client subscribes to a `(path, trait, elem)` triple; `raise` builds the
//! `SIGNAL` packet once and shares it (via [`Arc`]) across every subscribed
//! client, matching the reference server's refcounted signal packets
//! (`src/ipc/server/shared-packet.c`).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::wire::packet::Packet;

pub type ClientId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SignalKey {
    path: String,
    trait_name: String,
    elem: String,
}

#[derive(Debug, Default)]
pub struct SubscriptionTable {
    subscribers: HashMap<SignalKey, HashSet<ClientId>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        SubscriptionTable { subscribers: HashMap::new() }
    }

    pub fn subscribe(&mut self, client: ClientId, path: &str, trait_name: &str, elem: &str) {
        let key = SignalKey { path: path.to_string(), trait_name: trait_name.to_string(), elem: elem.to_string() };
        self.subscribers.entry(key).or_default().insert(client);
    }

    pub fn unsubscribe(&mut self, client: ClientId, path: &str, trait_name: &str, elem: &str) {
        let key = SignalKey { path: path.to_string(), trait_name: trait_name.to_string(), elem: elem.to_string() };
        if let Some(set) = self.subscribers.get_mut(&key) {
            set.remove(&client);
        }
    }

    /// Drops every subscription held by `client`, e.g. on disconnect.
    pub fn drop_client(&mut self, client: ClientId) {
        for set in self.subscribers.values_mut() {
            set.remove(&client);
        }
    }

    /// The clients currently subscribed to `(path, trait, elem)`, paired
    /// with the already-built signal packet they should each receive.
    /// Subscriptions keyed by `path` alone (trait and elem left blank, as
    /// registered by `dicey.SignalManager.Subscribe`) match every signal
    /// raised on that path.
    pub fn fan_out(&self, path: &str, trait_name: &str, elem: &str, packet: Packet) -> Vec<(ClientId, Arc<Packet>)> {
        let exact = SignalKey { path: path.to_string(), trait_name: trait_name.to_string(), elem: elem.to_string() };
        let wildcard = SignalKey { path: path.to_string(), trait_name: String::new(), elem: String::new() };
        let shared = Arc::new(packet);

        let mut clients: HashSet<ClientId> = HashSet::new();
        if let Some(set) = self.subscribers.get(&exact) {
            clients.extend(set.iter().copied());
        }
        if wildcard != exact {
            if let Some(set) = self.subscribers.get(&wildcard) {
                clients.extend(set.iter().copied());
            }
        }
        clients.into_iter().map(|client| (client, Arc::clone(&shared))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::builder::{Arg, MessageBuilder};
    use crate::wire::packet::Op;
    use crate::wire::value::Selector;

    fn signal_packet() -> Packet {
        let mut mb = MessageBuilder::new();
        mb.begin(Op::Signal).unwrap();
        mb.set_path("/counter").unwrap();
        mb.set_selector(Selector { trait_name: "counter.Counter", elem: "Tick" }).unwrap();
        mb.set_value(Arg::Int32(1)).unwrap();
        mb.build().unwrap()
    }

    #[test]
    fn fan_out_reaches_every_subscriber_with_a_shared_packet() {
        let mut table = SubscriptionTable::new();
        table.subscribe(1, "/counter", "counter.Counter", "Tick");
        table.subscribe(2, "/counter", "counter.Counter", "Tick");

        let recipients = table.fan_out("/counter", "counter.Counter", "Tick", signal_packet());
        assert_eq!(recipients.len(), 2);
        assert!(Arc::ptr_eq(&recipients[0].1, &recipients[1].1));
    }

    #[test]
    fn unsubscribe_and_drop_client_remove_membership() {
        let mut table = SubscriptionTable::new();
        table.subscribe(1, "/counter", "counter.Counter", "Tick");
        table.unsubscribe(1, "/counter", "counter.Counter", "Tick");
        assert!(table.fan_out("/counter", "counter.Counter", "Tick", signal_packet()).is_empty());

        table.subscribe(1, "/counter", "counter.Counter", "Tick");
        table.drop_client(1);
        assert!(table.fan_out("/counter", "counter.Counter", "Tick", signal_packet()).is_empty());
    }
}
