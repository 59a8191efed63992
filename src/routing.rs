// File: routing.rs
//
// The purpose of this file is to decide whether `self` owns a given key
// or whether the request must be forwarded toward the successor.
// Successor-only routing is the implemented strategy; spec.md marks a
// finger-table acceleration optional, and this crate does not ship one
// (the `Router` trait below is the seam where it would plug in without
// touching replication/consistency).

use crate::hash;
use crate::node::{Node, NodeDescriptor};

/// Returns whether the node whose id is `self_id` and whose predecessor
/// is `predecessor_id` owns `key_hash`: either it is alone in the ring
/// (`self_id == predecessor_id`) or the key falls in `(predecessor, self]`.
pub fn owns(self_id: u16, predecessor_id: u16, key_hash: u16) -> bool {
  self_id == predecessor_id || hash::in_interval(key_hash, predecessor_id, self_id)
}

/// A pluggable lookup strategy for "who should I forward this id to
/// next". Successor-only routing implements this trivially; a
/// finger-table implementation would consult its table instead.
pub trait Router: Send + Sync {
  fn next_hop(&self, id: u16) -> NodeDescriptor;
}

impl Node {
  /// True iff this node is currently responsible for `key`.
  pub fn owns_key(&self, key: &str) -> bool {
    let key_hash = hash::hash(key);
    let state = self.state.lock();
    owns(self.self_desc.id, state.predecessor.id, key_hash)
  }

  pub fn successor(&self) -> NodeDescriptor {
    self.state.lock().successor.clone()
  }

  pub fn predecessor(&self) -> NodeDescriptor {
    self.state.lock().predecessor.clone()
  }
}
