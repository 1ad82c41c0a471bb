//! Channel based publish/subscribe.

mod publish;
mod subscribe;

use std::collections::{BTreeSet, HashMap};

use crate::connection::ConnId;

pub use publish::publish;
pub use subscribe::{subscribe, unsubscribe};

/// Channel name to subscribed connections.
///
/// Each connection also keeps the set of its own channels, so closing it can
/// remove every subscription without scanning all channels.
#[derive(Debug, Default)]
pub struct PubSub {
    channels: HashMap<String, BTreeSet<ConnId>>,
}

impl PubSub {
    /// Returns false if the connection was already subscribed.
    pub fn subscribe(&mut self, channel: &str, id: ConnId) -> bool {
        self.channels.entry(channel.to_string()).or_default().insert(id)
    }

    pub fn unsubscribe(&mut self, channel: &str, id: ConnId) -> bool {
        let Some(subscribers) = self.channels.get_mut(channel) else {
            return false;
        };

        let removed = subscribers.remove(&id);

        if subscribers.is_empty() {
            self.channels.remove(channel);
        }

        removed
    }

    pub fn subscribers(&self, channel: &str) -> impl Iterator<Item = ConnId> + '_ {
        self.channels
            .get(channel)
            .into_iter()
            .flat_map(|subscribers| subscribers.iter().copied())
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}
