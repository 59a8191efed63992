// File: node.rs
//
// The purpose of this file is to define the per-node actor: its
// immutable identity, its mutable ring-membership and storage state
// guarded by a single lock, and the constructors used for a fresh
// bootstrap ring and for a node produced by a successful join. The
// ring-membership, routing, replication, consistency and overlay
// operations are implemented as further `impl Node` blocks in their own
// files (membership.rs, routing.rs, replication.rs, consistency.rs,
// overlay.rs) so each stays grounded in the spec component it realizes.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::config::Consistency;
use crate::hash;
use crate::store::LocalStore;
use crate::transport::Transport;

/// The wire-level identity of a peer: never an owned handle to the
/// remote node, just enough to address it and to place it on the ring.
/// Nodes look peers up by address; ownership of a remote node is never
/// held locally (spec design note, §9).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
  pub ip: String,
  pub port: u16,
  pub id: u16,
}

impl NodeDescriptor {
  pub fn new(ip: &str, port: u16) -> Self {
    let id = hash::hash(&format!("{}:{}", ip, port));
    NodeDescriptor {
      ip: ip.to_string(),
      port,
      id,
    }
  }

  pub fn addr(&self) -> String {
    format!("{}:{}", self.ip, self.port)
  }
}

/// All mutable per-node state, guarded by one lock (spec §5: every
/// handler that touches `data`, `replicas`, `successor`, `predecessor`,
/// `consistency`, `k` does so under a node-level mutex).
pub struct NodeState {
  pub successor: NodeDescriptor,
  pub predecessor: NodeDescriptor,
  pub store: LocalStore,
  pub consistency: Consistency,
  pub k: u8,
}

/// A ring participant. `self_desc` is immutable after construction;
/// everything else lives behind `state`. Outbound RPCs go through
/// `transport`, injected so the ring engine is testable without a real
/// network (see transport.rs).
pub struct Node {
  pub self_desc: NodeDescriptor,
  pub state: Mutex<NodeState>,
  pub transport: Arc<dyn Transport>,
  pub departed: AtomicBool,
  /// A weak handle to this node's own `Arc`, set immediately after
  /// construction so background propagation tasks (eventual-mode
  /// insert/delete) can spawn with an owned `Arc<Node>` instead of a
  /// borrowed reference. Never upgraded before the node is fully built.
  pub(crate) self_arc: Weak<Node>,
}

impl Node {
  /// Constructs a node alone in its own ring: successor and predecessor
  /// both equal `self`.
  pub fn bootstrap(
    ip: &str,
    port: u16,
    consistency: Consistency,
    k: u8,
    transport: Arc<dyn Transport>,
  ) -> Arc<Node> {
    let self_desc = NodeDescriptor::new(ip, port);
    Arc::new_cyclic(|weak| Node {
      self_desc: self_desc.clone(),
      state: Mutex::new(NodeState {
        successor: self_desc.clone(),
        predecessor: self_desc,
        store: LocalStore::new(),
        consistency,
        k,
      }),
      transport,
      departed: AtomicBool::new(false),
      self_arc: weak.clone(),
    })
  }

  /// Constructs a node whose pointers and stores have already been
  /// decided by a join reply (see membership.rs::join_via).
  pub fn from_join_reply(
    ip: &str,
    port: u16,
    successor: NodeDescriptor,
    predecessor: NodeDescriptor,
    consistency: Consistency,
    k: u8,
    store: LocalStore,
    transport: Arc<dyn Transport>,
  ) -> Arc<Node> {
    let self_desc = NodeDescriptor::new(ip, port);
    Arc::new_cyclic(|weak| Node {
      self_desc,
      state: Mutex::new(NodeState {
        successor,
        predecessor,
        store,
        consistency,
        k,
      }),
      transport,
      departed: AtomicBool::new(false),
      self_arc: weak.clone(),
    })
  }

  pub fn id(&self) -> u16 {
    self.self_desc.id
  }

  pub fn descriptor(&self) -> NodeDescriptor {
    self.self_desc.clone()
  }

  pub fn is_departed(&self) -> bool {
    self.departed.load(Ordering::SeqCst)
  }

  /// True iff this node owns every identifier -- the single-node-ring
  /// short-circuit used throughout C4/C6.
  pub fn is_alone(&self) -> bool {
    let state = self.state.lock();
    state.predecessor.id == self.self_desc.id
  }
}
