use std::collections::{HashMap, VecDeque};

use jiff::Timestamp;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    List(VecDeque<String>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::List(_) => "list",
        }
    }
}

/// What a shadow store holds for a key touched during a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    Value(Value),
    /// The key was deleted while the primary was frozen.
    Tombstone,
}

/// A key to value map plus a key to expiry map, expiries in unix milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyspace<T> {
    pub data: HashMap<String, T>,
    pub expires: HashMap<String, i64>,
}

impl<T> Default for Keyspace<T> {
    fn default() -> Self {
        Self {
            data: HashMap::new(),
            expires: HashMap::new(),
        }
    }
}

impl<T> Keyspace<T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        self.data.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        self.data.get_mut(key)
    }

    pub fn expiry(&self, key: &str) -> Option<i64> {
        self.expires.get(key).copied()
    }

    /// Stores `value` and replaces any previous expiry with `expires_at`.
    pub fn insert(&mut self, key: String, value: T, expires_at: Option<i64>) {
        match expires_at {
            Some(at) => {
                self.expires.insert(key.clone(), at);
            }
            None => {
                self.expires.remove(&key);
            }
        }

        self.data.insert(key, value);
    }

    pub fn remove(&mut self, key: &str) -> Option<(T, Option<i64>)> {
        let value = self.data.remove(key)?;
        Some((value, self.expires.remove(key)))
    }

    pub fn clear(&mut self) {
        self.data.clear();
        self.expires.clear();
    }

    pub fn ttl_count(&self) -> usize {
        self.expires.len()
    }
}

/// Current wall-clock time in unix milliseconds.
pub fn now_ms() -> i64 {
    Timestamp::now().as_millisecond()
}
