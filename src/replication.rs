// File: replication.rs
//
// The purpose of this file is the replica chain itself: propagating an
// insert or delete down `k - 1` hops past the primary owner, rebalancing
// depths when the ring's membership changes, and seeding/adopting a
// fresh chain on join and depart. Every operation here forwards at most
// once per hop and terminates either on depth exhaustion or on looping
// back to where it started.

use std::collections::HashMap;
use tracing::warn;

use crate::error::RingResult;
use crate::node::{Node, NodeDescriptor};
use crate::wire::{
  DeleteReplicasRequest, GenerateReplicasRequest, InsertReplicasRequest,
  RemoveTransferredReplicasRequest, ShiftReplicasRequest, TransferReplicasRequest,
};

impl Node {
  /// Stores (or appends to) a replica entry for `key` on this node, then
  /// forwards the chain one hop further if depth remains. `join` selects
  /// overwrite semantics (hand-off: `value` is already the full
  /// concatenation) versus append semantics (ordinary write propagation).
  /// `origin` is the primary owner's id; forwarding stops once it would
  /// loop back there, or once a primary copy of `key` is found locally
  /// (this node was already the owner under a different hop of the same
  /// chain -- a full loop).
  pub async fn insert_replicas(
    &self,
    key: &str,
    value: &str,
    replication_count: u8,
    join: bool,
    origin: u16,
  ) {
    let forward = {
      let mut state = self.state.lock();
      if state.store.has_primary(key) {
        return;
      }
      state.store.upsert_replica(key, value, replication_count, join);
      replication_count > 1 && state.successor.id != origin
    };
    if !forward {
      return;
    }
    let (successor, full_value) = {
      let state = self.state.lock();
      let full_value = state
        .store
        .get_replica(key)
        .map(|e| e.value.clone())
        .unwrap_or_else(|| value.to_string());
      (state.successor.clone(), full_value)
    };
    self
      .forward_replicate(&successor, key, &full_value, replication_count - 1, join, origin)
      .await;
  }

  /// The actual hop: an outbound `/insertReplicas` RPC. Failures are
  /// logged and swallowed -- replica propagation is always fire-and-
  /// forget from the perspective of the hop that issued it (the
  /// originating client write/delete already returned per the
  /// consistency mode in force). `pub(crate)` so the primary owner
  /// (consistency.rs) can issue the first hop directly -- the owner never
  /// calls `insert_replicas` on itself, since its own primary write would
  /// immediately trip the "already the owner" guard above.
  pub(crate) async fn forward_replicate(
    &self,
    to: &NodeDescriptor,
    key: &str,
    value: &str,
    replication_count: u8,
    join: bool,
    origin: u16,
  ) {
    let req = InsertReplicasRequest {
      key: key.to_string(),
      value: value.to_string(),
      replication_count,
      join,
      starting_node: origin,
    };
    if let Err(e) = self.transport.insert_replicas(to, req).await {
      warn!(%key, peer = %to.addr(), error = %e, "insert_replicas forwarding failed");
    }
  }

  /// Removes the replica for `key` locally and forwards the deletion
  /// while depth remains and the chain has not looped back to `origin`.
  pub async fn delete_replicas(&self, key: &str, replication_count: u8, origin: u16) {
    let removed = {
      let mut state = self.state.lock();
      state.store.remove_replica(key)
    };
    if removed.is_none() {
      return;
    }
    let forward = {
      let state = self.state.lock();
      replication_count > 1 && state.successor.id != origin
    };
    if !forward {
      return;
    }
    let successor = self.successor();
    self
      .forward_delete_replicate(&successor, key, replication_count - 1, origin)
      .await;
  }

  /// The actual hop: an outbound `/deleteReplicas` RPC. `pub(crate)` for
  /// the same reason as `forward_replicate` -- the primary owner's own
  /// copy of `key` lives in `data`, never in `replicas`, so it must issue
  /// the first hop directly rather than call `delete_replicas` on itself.
  pub(crate) async fn forward_delete_replicate(
    &self,
    to: &NodeDescriptor,
    key: &str,
    replication_count: u8,
    origin: u16,
  ) {
    let req = DeleteReplicasRequest {
      key: key.to_string(),
      replication_count,
      starting_node: origin,
    };
    if let Err(e) = self.transport.delete_replicas(to, req).await {
      warn!(%key, peer = %to.addr(), error = %e, "delete_replicas forwarding failed");
    }
  }

  /// Decrements the depth of every replica entry whose key appears in
  /// `data_keys` or `snapshot`, removing any that reach zero, then
  /// forwards the exact same `data_keys`/`snapshot` pair to the successor
  /// unchanged until the walk returns to `origin`. Used after a join or
  /// depart changes how many hops separate each node from the primaries
  /// it replicates.
  pub async fn shift_replicas(
    &self,
    data_keys: &[String],
    snapshot: &HashMap<String, (String, u8)>,
    origin: u16,
  ) {
    let (forward, successor) = {
      let mut state = self.state.lock();
      for key in data_keys.iter().chain(snapshot.keys()) {
        state.store.decrement_replica_depth(key);
      }
      (state.successor.id != origin, state.successor.clone())
    };
    if !forward {
      return;
    }
    let req = ShiftReplicasRequest {
      keys: data_keys.to_vec(),
      replicas: snapshot.clone(),
      starting_node: origin,
    };
    if let Err(e) = self.transport.shift_replicas(&successor, req).await {
      warn!(peer = %successor.addr(), error = %e, "shift_replicas forwarding failed");
    }
  }

  /// Seeds a fresh `k`-deep replica chain for every key in `keys`,
  /// treated as primaries of `self`. Called locally by a node on its own
  /// newly-adopted primary keys (join), and remotely via RPC on a
  /// departing node's successor (depart) -- in both cases the caller is
  /// the current primary owner of `keys`.
  pub async fn generate_replicas(&self, keys: &HashMap<String, String>) {
    let (k, successor, self_id) = {
      let state = self.state.lock();
      (state.k, state.successor.clone(), self.self_desc.id)
    };
    if k <= 1 || successor.id == self_id {
      return;
    }
    for (key, value) in keys {
      self
        .forward_replicate(&successor, key, value, k - 1, true, self_id)
        .await;
    }
  }

  /// Removes any stale replica entry this node holds for keys that are
  /// now primaries elsewhere in the chain it used to replicate --
  /// defensive cleanup against the race where a write lands a replica
  /// here concurrently with the membership change that hands the same
  /// key's primary copy to a neighbour.
  pub fn remove_transferred_replicas(&self, keys: &[String]) {
    let mut state = self.state.lock();
    for key in keys {
      state.store.remove_replica(key);
    }
  }

  /// Adopts every entry of `replicas` whose key is not already a local
  /// primary, then re-propagates each to refresh downstream depths. Used
  /// by a node receiving a departing neighbour's replica snapshot.
  pub async fn transfer_replicas(&self, replicas: HashMap<String, (String, u8)>) {
    let mut adopted = Vec::new();
    {
      let mut state = self.state.lock();
      for (key, (value, depth)) in replicas {
        if state.store.has_primary(&key) {
          continue;
        }
        state.store.upsert_replica(&key, &value, depth, true);
        adopted.push((key, value, depth));
      }
    }
    let (successor, self_id) = {
      let state = self.state.lock();
      (state.successor.clone(), self.self_desc.id)
    };
    if successor.id == self_id {
      return;
    }
    for (key, value, depth) in adopted {
      if depth <= 1 {
        continue;
      }
      self
        .forward_replicate(&successor, &key, &value, depth - 1, true, self_id)
        .await;
    }
  }

  /// Wire-endpoint entry points: these call the inherent methods above
  /// after decoding a request body, matching `server.rs`'s thin-glue
  /// contract. Kept here rather than in `server.rs` since they touch no
  /// HTTP types.
  pub async fn handle_insert_replicas(&self, req: InsertReplicasRequest) -> crate::wire::Ack {
    self
      .insert_replicas(
        &req.key,
        &req.value,
        req.replication_count,
        req.join,
        req.starting_node,
      )
      .await;
    crate::wire::Ack::ok("replica stored")
  }

  pub async fn handle_delete_replicas(&self, req: DeleteReplicasRequest) -> crate::wire::Ack {
    self
      .delete_replicas(&req.key, req.replication_count, req.starting_node)
      .await;
    crate::wire::Ack::ok("replica removed")
  }

  pub async fn handle_shift_replicas(&self, req: ShiftReplicasRequest) -> crate::wire::Ack {
    self
      .shift_replicas(&req.keys, &req.replicas, req.starting_node)
      .await;
    crate::wire::Ack::ok("replicas shifted")
  }

  pub async fn handle_transfer_replicas(&self, req: TransferReplicasRequest) -> crate::wire::Ack {
    self.transfer_replicas(req.replicas).await;
    crate::wire::Ack::ok("replicas adopted")
  }

  pub async fn handle_generate_replicas(&self, req: GenerateReplicasRequest) -> crate::wire::Ack {
    self.generate_replicas(&req.keys).await;
    crate::wire::Ack::ok("replica chain seeded")
  }

  pub fn handle_remove_transferred_replicas(
    &self,
    req: RemoveTransferredReplicasRequest,
  ) -> crate::wire::Ack {
    self.remove_transferred_replicas(&req.keys);
    crate::wire::Ack::ok("stale replicas cleared")
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::Consistency;
  use crate::node::NodeDescriptor;
  use crate::transport::Transport;
  use async_trait::async_trait;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  /// A transport that counts insert_replicas calls and always succeeds,
  /// used to check forwarding terminates after the expected hop count.
  struct CountingTransport {
    calls: AtomicUsize,
  }

  #[async_trait]
  impl Transport for CountingTransport {
    async fn join(
      &self,
      _peer: &NodeDescriptor,
      _req: crate::wire::JoinRequest,
    ) -> RingResult<crate::wire::JoinResponse> {
      unimplemented!()
    }
    async fn insert(
      &self,
      _peer: &NodeDescriptor,
      _req: crate::wire::InsertRequest,
    ) -> RingResult<crate::wire::InsertResponse> {
      unimplemented!()
    }
    async fn query(
      &self,
      _peer: &NodeDescriptor,
      _req: crate::wire::QueryRequest,
    ) -> RingResult<crate::wire::QueryResponse> {
      unimplemented!()
    }
    async fn delete(
      &self,
      _peer: &NodeDescriptor,
      _req: crate::wire::DeleteRequest,
    ) -> RingResult<crate::wire::Ack> {
      unimplemented!()
    }
    async fn insert_replicas(
      &self,
      _peer: &NodeDescriptor,
      _req: InsertReplicasRequest,
    ) -> RingResult<crate::wire::Ack> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      Ok(crate::wire::Ack::ok("stored"))
    }
    async fn delete_replicas(
      &self,
      _peer: &NodeDescriptor,
      _req: DeleteReplicasRequest,
    ) -> RingResult<crate::wire::Ack> {
      unimplemented!()
    }
    async fn update_successor(
      &self,
      _peer: &NodeDescriptor,
      _req: crate::wire::UpdateSuccessorRequest,
    ) -> RingResult<crate::wire::Ack> {
      unimplemented!()
    }
    async fn update_predecessor(
      &self,
      _peer: &NodeDescriptor,
      _req: crate::wire::UpdatePredecessorRequest,
    ) -> RingResult<crate::wire::Ack> {
      unimplemented!()
    }
    async fn transfer_keys(
      &self,
      _peer: &NodeDescriptor,
      _req: crate::wire::TransferKeysRequest,
    ) -> RingResult<crate::wire::Ack> {
      unimplemented!()
    }
    async fn transfer_replicas(
      &self,
      _peer: &NodeDescriptor,
      _req: TransferReplicasRequest,
    ) -> RingResult<crate::wire::Ack> {
      unimplemented!()
    }
    async fn generate_replicas(
      &self,
      _peer: &NodeDescriptor,
      _req: GenerateReplicasRequest,
    ) -> RingResult<crate::wire::Ack> {
      unimplemented!()
    }
    async fn remove_transferred_replicas(
      &self,
      _peer: &NodeDescriptor,
      _req: RemoveTransferredReplicasRequest,
    ) -> RingResult<crate::wire::Ack> {
      unimplemented!()
    }
    async fn shift_replicas(
      &self,
      _peer: &NodeDescriptor,
      _req: ShiftReplicasRequest,
    ) -> RingResult<crate::wire::Ack> {
      unimplemented!()
    }
    async fn overlay(
      &self,
      _peer: &NodeDescriptor,
      _visited: Vec<u16>,
    ) -> RingResult<crate::wire::OverlayResponse> {
      unimplemented!()
    }
    async fn node_info(&self, _peer: &NodeDescriptor) -> RingResult<crate::wire::NodeInfoResponse> {
      unimplemented!()
    }
    async fn depart(&self, _peer: &NodeDescriptor) -> RingResult<crate::wire::Ack> {
      unimplemented!()
    }
  }

  fn test_node(successor_differs: bool) -> (Arc<Node>, Arc<CountingTransport>) {
    let transport = Arc::new(CountingTransport {
      calls: AtomicUsize::new(0),
    });
    let node = Node::bootstrap(
      "127.0.0.1",
      9000,
      Consistency::Eventual,
      3,
      transport.clone(),
    );
    if successor_differs {
      let mut state = node.state.lock();
      state.successor = NodeDescriptor::new("127.0.0.1", 9001);
    }
    (node, transport)
  }

  #[tokio::test]
  async fn insert_replicas_stops_without_forwarding_when_alone() {
    let (node, transport) = test_node(false);
    node.insert_replicas("song", "AB", 2, true, node.id()).await;
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    let state = node.state.lock();
    assert_eq!(state.store.get_replica("song").unwrap().value, "AB");
  }

  #[tokio::test]
  async fn insert_replicas_forwards_when_depth_remains() {
    let (node, transport) = test_node(true);
    node.insert_replicas("song", "AB", 2, true, 999).await;
    assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn insert_replicas_stops_on_primary_present() {
    let (node, transport) = test_node(true);
    {
      let mut state = node.state.lock();
      state.store.insert_primary("song", "X");
    }
    node.insert_replicas("song", "AB", 2, true, 999).await;
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn generate_replicas_noop_when_alone() {
    let (node, transport) = test_node(false);
    let mut keys = HashMap::new();
    keys.insert("a".to_string(), "1".to_string());
    node.generate_replicas(&keys).await;
    assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
  }
}
