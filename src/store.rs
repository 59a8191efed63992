// File: store.rs
//
// The purpose of this file is to hold the two maps every node keeps
// locally: `data` (this node's primary keys) and `replicas` (value plus
// remaining chain depth). Insert is append-concatenation; all operations
// are O(1) average.

use std::collections::HashMap;

/// The result of a local key lookup, modelled as a distinct variant
/// rather than a magic "Key not found" string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
  Found(String),
  NotFound,
}

impl Lookup {
  pub fn into_option(self) -> Option<String> {
    match self {
      Lookup::Found(v) => Some(v),
      Lookup::NotFound => None,
    }
  }
}

/// A replicated value paired with its remaining chain depth. Depth 1
/// means this node is the tail of the replica chain for this key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaEntry {
  pub value: String,
  pub depth: u8,
}

/// Local storage for a single node: the primary `data` map and the
/// `replicas` map. Invariant I5: the union of the two never holds a key
/// more than once.
#[derive(Debug, Default)]
pub struct LocalStore {
  pub data: HashMap<String, String>,
  pub replicas: HashMap<String, ReplicaEntry>,
}

impl LocalStore {
  pub fn new() -> Self {
    LocalStore::default()
  }

  /// Append-concatenates `value` onto the existing primary entry for
  /// `key`, creating it if absent, and returns the resulting value.
  pub fn insert_primary(&mut self, key: &str, value: &str) -> String {
    let entry = self.data.entry(key.to_string()).or_insert_with(String::new);
    entry.push_str(value);
    entry.clone()
  }

  pub fn get_primary(&self, key: &str) -> Lookup {
    match self.data.get(key) {
      Some(v) => Lookup::Found(v.clone()),
      None => Lookup::NotFound,
    }
  }

  pub fn remove_primary(&mut self, key: &str) -> Option<String> {
    self.data.remove(key)
  }

  pub fn has_primary(&self, key: &str) -> bool {
    self.data.contains_key(key)
  }

  /// Appends `value` onto an existing replica's value (write
  /// propagation), or creates a fresh replica entry at `depth`
  /// (join/depart hand-off, where `value` is already the authoritative
  /// concatenation and must not be appended onto a stale partial copy).
  pub fn upsert_replica(&mut self, key: &str, value: &str, depth: u8, overwrite: bool) {
    if overwrite {
      self.replicas.insert(
        key.to_string(),
        ReplicaEntry {
          value: value.to_string(),
          depth,
        },
      );
    } else {
      let existing = self
        .replicas
        .get(key)
        .map(|e| e.value.clone())
        .unwrap_or_default();
      self.replicas.insert(
        key.to_string(),
        ReplicaEntry {
          value: existing + value,
          depth,
        },
      );
    }
  }

  pub fn get_replica(&self, key: &str) -> Option<&ReplicaEntry> {
    self.replicas.get(key)
  }

  pub fn remove_replica(&mut self, key: &str) -> Option<ReplicaEntry> {
    self.replicas.remove(key)
  }

  /// Decrements the depth of the replica at `key` by one, removing it
  /// entirely if the depth reaches zero. No-op if the key has no replica.
  pub fn decrement_replica_depth(&mut self, key: &str) {
    let remove = match self.replicas.get_mut(key) {
      Some(entry) => {
        entry.depth = entry.depth.saturating_sub(1);
        entry.depth == 0
      }
      None => false,
    };
    if remove {
      self.replicas.remove(key);
    }
  }

  pub fn len(&self) -> usize {
    self.data.len() + self.replicas.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insert_primary_concatenates() {
    let mut store = LocalStore::new();
    assert_eq!(store.insert_primary("song", "A"), "A");
    assert_eq!(store.insert_primary("song", "B"), "AB");
  }

  #[test]
  fn delete_missing_key_is_idempotent() {
    let mut store = LocalStore::new();
    assert_eq!(store.remove_primary("missing"), None);
  }

  #[test]
  fn replica_join_overwrite_does_not_append() {
    let mut store = LocalStore::new();
    store.upsert_replica("k", "partial", 3, false);
    store.upsert_replica("k", "AB", 2, true);
    assert_eq!(store.get_replica("k").unwrap().value, "AB");
    assert_eq!(store.get_replica("k").unwrap().depth, 2);
  }

  #[test]
  fn replica_write_propagation_appends() {
    let mut store = LocalStore::new();
    store.upsert_replica("k", "1", 2, false);
    store.upsert_replica("k", "2", 2, false);
    assert_eq!(store.get_replica("k").unwrap().value, "12");
  }

  #[test]
  fn decrement_removes_at_zero() {
    let mut store = LocalStore::new();
    store.upsert_replica("k", "v", 1, true);
    store.decrement_replica_depth("k");
    assert!(store.get_replica("k").is_none());
  }
}
