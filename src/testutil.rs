// File: testutil.rs (test-only)
//
// The purpose of this file is an in-memory `Transport` that dispatches
// directly between in-process `Node` instances instead of over real
// sockets, so the seed scenarios from spec.md §8 can exercise the full
// join/replicate/consistency/depart machinery without process lifecycle
// or port binding -- both explicitly out of scope.

use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Consistency;
use crate::error::{RingError, RingResult};
use crate::node::{Node, NodeDescriptor};
use crate::transport::Transport;
use crate::wire::*;

/// A shared registry of every node in a simulated ring, keyed by
/// `ip:port`. Every node constructed through `FakeNetwork` is given a
/// clone of the same `Arc<FakeNetwork>` as its transport, so RPCs
/// dispatch straight to the target's handler methods.
pub struct FakeNetwork {
  nodes: SyncMutex<HashMap<String, Arc<Node>>>,
}

impl FakeNetwork {
  pub fn new() -> Arc<Self> {
    Arc::new(FakeNetwork {
      nodes: SyncMutex::new(HashMap::new()),
    })
  }

  pub fn bootstrap_node(
    self: &Arc<Self>,
    ip: &str,
    port: u16,
    consistency: Consistency,
    k: u8,
  ) -> Arc<Node> {
    let node = Node::bootstrap(ip, port, consistency, k, self.clone());
    self.nodes.lock().insert(node.descriptor().addr(), node.clone());
    node
  }

  pub async fn join_node(self: &Arc<Self>, ip: &str, port: u16, bootstrap: &Arc<Node>) -> Arc<Node> {
    let node = crate::membership::join_via(ip, port, &bootstrap.descriptor(), self.clone())
      .await
      .expect("join_via failed in test network");
    self.nodes.lock().insert(node.descriptor().addr(), node.clone());
    node
  }

  fn get(&self, peer: &NodeDescriptor) -> RingResult<Arc<Node>> {
    self
      .nodes
      .lock()
      .get(&peer.addr())
      .cloned()
      .ok_or_else(|| RingError::Transport(format!("no such peer in fake network: {}", peer.addr())))
  }
}

#[async_trait]
impl Transport for FakeNetwork {
  async fn join(&self, peer: &NodeDescriptor, req: JoinRequest) -> RingResult<JoinResponse> {
    self.get(peer)?.handle_join(req).await
  }

  async fn insert(&self, peer: &NodeDescriptor, req: InsertRequest) -> RingResult<InsertResponse> {
    let node = self.get(peer)?;
    node.insert(req).await
  }

  async fn query(&self, peer: &NodeDescriptor, req: QueryRequest) -> RingResult<QueryResponse> {
    let node = self.get(peer)?;
    node.query(req).await
  }

  async fn delete(&self, peer: &NodeDescriptor, req: DeleteRequest) -> RingResult<Ack> {
    let node = self.get(peer)?;
    node.delete(req).await
  }

  async fn insert_replicas(&self, peer: &NodeDescriptor, req: InsertReplicasRequest) -> RingResult<Ack> {
    Ok(self.get(peer)?.handle_insert_replicas(req).await)
  }

  async fn delete_replicas(&self, peer: &NodeDescriptor, req: DeleteReplicasRequest) -> RingResult<Ack> {
    Ok(self.get(peer)?.handle_delete_replicas(req).await)
  }

  async fn update_successor(
    &self,
    peer: &NodeDescriptor,
    req: UpdateSuccessorRequest,
  ) -> RingResult<Ack> {
    Ok(self.get(peer)?.handle_update_successor(req))
  }

  async fn update_predecessor(
    &self,
    peer: &NodeDescriptor,
    req: UpdatePredecessorRequest,
  ) -> RingResult<Ack> {
    Ok(self.get(peer)?.handle_update_predecessor(req))
  }

  async fn transfer_keys(&self, peer: &NodeDescriptor, req: TransferKeysRequest) -> RingResult<Ack> {
    Ok(self.get(peer)?.handle_transfer_keys(req))
  }

  async fn transfer_replicas(
    &self,
    peer: &NodeDescriptor,
    req: TransferReplicasRequest,
  ) -> RingResult<Ack> {
    Ok(self.get(peer)?.handle_transfer_replicas(req).await)
  }

  async fn generate_replicas(
    &self,
    peer: &NodeDescriptor,
    req: GenerateReplicasRequest,
  ) -> RingResult<Ack> {
    Ok(self.get(peer)?.handle_generate_replicas(req).await)
  }

  async fn remove_transferred_replicas(
    &self,
    peer: &NodeDescriptor,
    req: RemoveTransferredReplicasRequest,
  ) -> RingResult<Ack> {
    Ok(self.get(peer)?.handle_remove_transferred_replicas(req))
  }

  async fn shift_replicas(&self, peer: &NodeDescriptor, req: ShiftReplicasRequest) -> RingResult<Ack> {
    Ok(self.get(peer)?.handle_shift_replicas(req).await)
  }

  async fn overlay(&self, peer: &NodeDescriptor, visited: Vec<u16>) -> RingResult<OverlayResponse> {
    self.get(peer)?.handle_overlay(visited).await
  }

  async fn node_info(&self, peer: &NodeDescriptor) -> RingResult<NodeInfoResponse> {
    Ok(self.get(peer)?.handle_node_info())
  }

  async fn depart(&self, peer: &NodeDescriptor) -> RingResult<Ack> {
    let node = self.get(peer)?;
    node.depart().await?;
    Ok(Ack::ok("departed"))
  }
}
