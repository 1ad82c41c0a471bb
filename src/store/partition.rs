use std::sync::Arc;

use rand::{seq::IteratorRandom, Rng};

use crate::key_value_store::{Keyspace, Slot, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Normal,
    /// The primary is being written to a snapshot and must not change.
    Frozen,
    /// The snapshot is written, shadow entries are being merged back.
    Moving,
    /// A foreground save is running, no command may touch the partition.
    Stopped,
}

impl PartitionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartitionState::Normal => "normal",
            PartitionState::Frozen => "frozen",
            PartitionState::Moving => "moving",
            PartitionState::Stopped => "stopped",
        }
    }
}

/// One logical database, backed by a primary store and a shadow store.
///
/// While a snapshot is being written the primary is shared with the snapshot
/// writer and stays untouched; writes go to the shadow instead, with deletes
/// recorded as tombstones. Once the partition has been written the shadow is
/// merged back, either when a key is touched or by [`Partition::drain`].
///
/// `drift` keeps the visible key count available in constant time: the
/// partition appears to hold `primary.len() + drift` keys.
#[derive(Debug)]
pub struct Partition {
    primary: Arc<Keyspace<Value>>,
    shadow: Keyspace<Slot>,
    state: PartitionState,
    drift: i64,
}

impl Default for Partition {
    fn default() -> Self {
        Self::new()
    }
}

impl Partition {
    pub fn new() -> Self {
        Self {
            primary: Arc::new(Keyspace::default()),
            shadow: Keyspace::default(),
            state: PartitionState::Normal,
            drift: 0,
        }
    }

    pub fn state(&self) -> PartitionState {
        self.state
    }

    pub fn drift(&self) -> i64 {
        self.drift
    }

    pub fn shadow_len(&self) -> usize {
        self.shadow.len()
    }

    pub fn primary(&self) -> &Keyspace<Value> {
        &self.primary
    }

    /// Number of keys visible to clients, expired-but-unreaped keys included.
    pub fn len(&self) -> usize {
        match self.state {
            PartitionState::Normal => self.primary.len(),
            _ => {
                let visible = self.primary.len() as i64 + self.drift;
                debug_assert!(visible >= 0, "negative key count, drift {}", self.drift);
                visible.max(0) as usize
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads a key, reaping it if its expiry has passed.
    ///
    /// In Moving a shadow hit is merged into the primary first.
    pub fn get(&mut self, key: &str, now_ms: i64) -> Option<Value> {
        self.get_ref(key, now_ms).cloned()
    }

    pub fn get_ref(&mut self, key: &str, now_ms: i64) -> Option<&Value> {
        self.touch(key, now_ms);
        self.lookup(key)
    }

    /// Mutable access to a live value, leaving its expiry alone.
    ///
    /// While the primary is shared with a snapshot writer the value is copied
    /// into the shadow first and only that copy changes.
    pub fn get_mut(&mut self, key: &str, now_ms: i64) -> Option<&mut Value> {
        self.touch(key, now_ms);

        match self.state {
            PartitionState::Normal | PartitionState::Moving => {
                if !self.primary.contains_key(key) {
                    return None;
                }

                Arc::make_mut(&mut self.primary).get_mut(key)
            }
            PartitionState::Frozen | PartitionState::Stopped => {
                if !self.shadow.contains_key(key) {
                    let value = self.primary.get(key)?.clone();
                    let expires_at = self.primary.expiry(key);
                    self.shadow
                        .insert(key.to_string(), Slot::Value(value), expires_at);
                }

                match self.shadow.get_mut(key) {
                    Some(Slot::Value(value)) => Some(value),
                    _ => None,
                }
            }
        }
    }

    pub fn contains(&mut self, key: &str, now_ms: i64) -> bool {
        self.get(key, now_ms).is_some()
    }

    /// The expiry a client would observe for `key`.
    pub fn expiry(&self, key: &str) -> Option<i64> {
        match self.shadow.get(key) {
            Some(Slot::Value(_)) => self.shadow.expiry(key),
            Some(Slot::Tombstone) => None,
            None => self.primary.expiry(key),
        }
    }

    /// Stores `value` for `key` with exactly the given expiry.
    pub fn put(&mut self, key: String, value: Value, expires_at: Option<i64>) {
        match self.state {
            PartitionState::Normal => {
                Arc::make_mut(&mut self.primary).insert(key, value, expires_at);
            }
            PartitionState::Frozen | PartitionState::Stopped => {
                let before = self.contribution(&key);
                self.shadow
                    .insert(key.clone(), Slot::Value(value), expires_at);
                self.drift += self.contribution(&key) - before;
            }
            PartitionState::Moving => {
                self.promote(&key);
                Arc::make_mut(&mut self.primary).insert(key, value, expires_at);
            }
        }
    }

    /// Removes `key`, returning whether it was visible before the call.
    pub fn delete(&mut self, key: &str) -> bool {
        match self.state {
            PartitionState::Normal => Arc::make_mut(&mut self.primary).remove(key).is_some(),
            PartitionState::Frozen | PartitionState::Stopped => {
                let existed = self.lookup(key).is_some();
                let before = self.contribution(key);

                if self.primary.contains_key(key) {
                    self.shadow
                        .insert(key.to_string(), Slot::Tombstone, None);
                } else {
                    self.shadow.remove(key);
                }

                self.drift += self.contribution(key) - before;
                existed
            }
            PartitionState::Moving => {
                let existed = self.lookup(key).is_some();
                self.promote(key);
                Arc::make_mut(&mut self.primary).remove(key);
                existed
            }
        }
    }

    /// Keys visible to clients, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .primary
            .data
            .keys()
            .filter(|key| !self.shadow.contains_key(key))
            .cloned()
            .collect();

        keys.extend(self.shadow.data.iter().filter_map(|(key, slot)| match slot {
            Slot::Value(_) => Some(key.clone()),
            Slot::Tombstone => None,
        }));

        keys
    }

    /// Freezes the primary and hands out a shared view of it for the snapshot writer.
    pub fn freeze(&mut self) -> Arc<Keyspace<Value>> {
        self.state = PartitionState::Frozen;
        Arc::clone(&self.primary)
    }

    /// Blocks the partition for a foreground save.
    pub fn stop(&mut self) -> Arc<Keyspace<Value>> {
        self.state = PartitionState::Stopped;
        Arc::clone(&self.primary)
    }

    /// Called once the snapshot writer is done with this partition.
    ///
    /// Returns the new state: Moving while shadow entries remain, Normal otherwise.
    pub fn finish_write(&mut self) -> PartitionState {
        if self.state != PartitionState::Frozen {
            return self.state;
        }

        self.state = if self.shadow.is_empty() {
            self.drift = 0;
            PartitionState::Normal
        } else {
            PartitionState::Moving
        };

        self.state
    }

    /// Merges everything left in the shadow and returns to Normal.
    ///
    /// Used when a snapshot of this partition was aborted and after a foreground save.
    pub fn merge_all(&mut self) {
        let keys: Vec<String> = self.shadow.data.keys().cloned().collect();

        for key in keys {
            self.promote(&key);
        }

        self.drift = 0;
        self.state = PartitionState::Normal;
    }

    /// Merges a random batch of up to `batch` shadow keys into the primary.
    ///
    /// Does nothing outside of Moving. Returns true once the partition is Normal.
    pub fn drain<R: Rng + ?Sized>(&mut self, batch: usize, rng: &mut R) -> bool {
        if self.state != PartitionState::Moving {
            return self.state == PartitionState::Normal;
        }

        let keys: Vec<String> = self
            .shadow
            .data
            .keys()
            .choose_multiple(rng, batch)
            .into_iter()
            .cloned()
            .collect();

        for key in keys {
            self.promote(&key);
        }

        if self.shadow.is_empty() {
            self.drift = 0;
            self.state = PartitionState::Normal;
        }

        self.state == PartitionState::Normal
    }

    /// Drops every key in both stores and returns to Normal.
    pub fn flush(&mut self) {
        self.primary = Arc::new(Keyspace::default());
        self.shadow.clear();
        self.drift = 0;
        self.state = PartitionState::Normal;
    }

    fn lookup(&self, key: &str) -> Option<&Value> {
        match self.shadow.get(key) {
            Some(Slot::Value(value)) => Some(value),
            Some(Slot::Tombstone) => None,
            None => self.primary.get(key),
        }
    }

    /// Merges a Moving shadow entry and reaps the key if it has expired.
    fn touch(&mut self, key: &str, now_ms: i64) {
        if self.state == PartitionState::Moving {
            self.promote(key);
        }

        if self.is_expired(key, now_ms) {
            self.delete(key);
        }
    }

    fn is_expired(&self, key: &str, now_ms: i64) -> bool {
        self.lookup(key).is_some() && self.expiry(key).is_some_and(|at| at <= now_ms)
    }

    /// How far the visible count for `key` differs from the primary's.
    fn contribution(&self, key: &str) -> i64 {
        let visible = match self.shadow.get(key) {
            Some(Slot::Value(_)) => 1,
            Some(Slot::Tombstone) => 0,
            None => return 0,
        };

        visible - i64::from(self.primary.contains_key(key))
    }

    /// Applies the shadow entry for `key`, if any, to the primary.
    fn promote(&mut self, key: &str) {
        let before = self.contribution(key);

        let Some((slot, expires_at)) = self.shadow.remove(key) else {
            return;
        };

        let primary = Arc::make_mut(&mut self.primary);

        match slot {
            Slot::Value(value) => primary.insert(key.to_string(), value, expires_at),
            Slot::Tombstone => {
                primary.remove(key);
            }
        }

        self.drift -= before;
    }
}
