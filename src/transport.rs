// File: transport.rs
//
// The purpose of this file is to define the seam between ring logic and
// the network: a `Transport` trait with one method per outbound RPC
// named in the wire protocol table, and `HttpTransport`, the production
// implementation over JSON-over-HTTP. Tests inject an in-memory
// implementation instead (see consistency.rs's test module) so the ring
// engine never needs a bound socket to be exercised.
//
// This generalizes the teacher's `Handler::send_to_broker` seam -- there
// it was a concrete zmq REQ socket; here it is an injectable trait.

use async_trait::async_trait;

use crate::config::RPC_TIMEOUT;
use crate::error::{RingError, RingResult};
use crate::node::NodeDescriptor;
use crate::wire::*;

#[async_trait]
pub trait Transport: Send + Sync {
  async fn join(&self, peer: &NodeDescriptor, req: JoinRequest) -> RingResult<JoinResponse>;
  async fn insert(&self, peer: &NodeDescriptor, req: InsertRequest) -> RingResult<InsertResponse>;
  async fn query(&self, peer: &NodeDescriptor, req: QueryRequest) -> RingResult<QueryResponse>;
  async fn delete(&self, peer: &NodeDescriptor, req: DeleteRequest) -> RingResult<Ack>;
  async fn insert_replicas(
    &self,
    peer: &NodeDescriptor,
    req: InsertReplicasRequest,
  ) -> RingResult<Ack>;
  async fn delete_replicas(
    &self,
    peer: &NodeDescriptor,
    req: DeleteReplicasRequest,
  ) -> RingResult<Ack>;
  async fn update_successor(
    &self,
    peer: &NodeDescriptor,
    req: UpdateSuccessorRequest,
  ) -> RingResult<Ack>;
  async fn update_predecessor(
    &self,
    peer: &NodeDescriptor,
    req: UpdatePredecessorRequest,
  ) -> RingResult<Ack>;
  async fn transfer_keys(&self, peer: &NodeDescriptor, req: TransferKeysRequest)
    -> RingResult<Ack>;
  async fn transfer_replicas(
    &self,
    peer: &NodeDescriptor,
    req: TransferReplicasRequest,
  ) -> RingResult<Ack>;
  async fn generate_replicas(
    &self,
    peer: &NodeDescriptor,
    req: GenerateReplicasRequest,
  ) -> RingResult<Ack>;
  async fn remove_transferred_replicas(
    &self,
    peer: &NodeDescriptor,
    req: RemoveTransferredReplicasRequest,
  ) -> RingResult<Ack>;
  async fn shift_replicas(
    &self,
    peer: &NodeDescriptor,
    req: ShiftReplicasRequest,
  ) -> RingResult<Ack>;
  async fn overlay(&self, peer: &NodeDescriptor, visited: Vec<u16>) -> RingResult<OverlayResponse>;
  async fn node_info(&self, peer: &NodeDescriptor) -> RingResult<NodeInfoResponse>;
  async fn depart(&self, peer: &NodeDescriptor) -> RingResult<Ack>;
}

/// Production transport: JSON over HTTP, with the bounded 5s deadline
/// the concurrency model requires. A timeout, a refused connection, or a
/// non-success HTTP status all become `RingError::Transport`.
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new() -> Self {
    let client = reqwest::Client::builder()
      .timeout(RPC_TIMEOUT)
      .build()
      .expect("failed to build HTTP client");
    HttpTransport { client }
  }

  fn url(peer: &NodeDescriptor, path: &str) -> String {
    format!("http://{}:{}{}", peer.ip, peer.port, path)
  }

  async fn post_json<Req: serde::Serialize + Sync, Resp: serde::de::DeserializeOwned>(
    &self,
    peer: &NodeDescriptor,
    path: &str,
    body: &Req,
  ) -> RingResult<Resp> {
    let resp = self
      .client
      .post(Self::url(peer, path))
      .json(body)
      .send()
      .await?;
    if !resp.status().is_success() {
      return Err(RingError::Transport(format!(
        "{} replied with status {}",
        path,
        resp.status()
      )));
    }
    resp.json::<Resp>().await.map_err(RingError::from)
  }

  async fn get_json<Resp: serde::de::DeserializeOwned>(
    &self,
    peer: &NodeDescriptor,
    path: &str,
  ) -> RingResult<Resp> {
    let resp = self.client.get(Self::url(peer, path)).send().await?;
    if !resp.status().is_success() {
      return Err(RingError::Transport(format!(
        "{} replied with status {}",
        path,
        resp.status()
      )));
    }
    resp.json::<Resp>().await.map_err(RingError::from)
  }
}

impl Default for HttpTransport {
  fn default() -> Self {
    Self::new()
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn join(&self, peer: &NodeDescriptor, req: JoinRequest) -> RingResult<JoinResponse> {
    self.post_json(peer, "/join", &req).await
  }

  async fn insert(&self, peer: &NodeDescriptor, req: InsertRequest) -> RingResult<InsertResponse> {
    self.post_json(peer, "/insert", &req).await
  }

  async fn query(&self, peer: &NodeDescriptor, req: QueryRequest) -> RingResult<QueryResponse> {
    self.post_json(peer, "/query", &req).await
  }

  async fn delete(&self, peer: &NodeDescriptor, req: DeleteRequest) -> RingResult<Ack> {
    self.post_json(peer, "/delete", &req).await
  }

  async fn insert_replicas(
    &self,
    peer: &NodeDescriptor,
    req: InsertReplicasRequest,
  ) -> RingResult<Ack> {
    self.post_json(peer, "/insertReplicas", &req).await
  }

  async fn delete_replicas(
    &self,
    peer: &NodeDescriptor,
    req: DeleteReplicasRequest,
  ) -> RingResult<Ack> {
    self.post_json(peer, "/deleteReplicas", &req).await
  }

  async fn update_successor(
    &self,
    peer: &NodeDescriptor,
    req: UpdateSuccessorRequest,
  ) -> RingResult<Ack> {
    self.post_json(peer, "/update_successor", &req).await
  }

  async fn update_predecessor(
    &self,
    peer: &NodeDescriptor,
    req: UpdatePredecessorRequest,
  ) -> RingResult<Ack> {
    self.post_json(peer, "/update_predecessor", &req).await
  }

  async fn transfer_keys(
    &self,
    peer: &NodeDescriptor,
    req: TransferKeysRequest,
  ) -> RingResult<Ack> {
    self.post_json(peer, "/transfer_keys", &req).await
  }

  async fn transfer_replicas(
    &self,
    peer: &NodeDescriptor,
    req: TransferReplicasRequest,
  ) -> RingResult<Ack> {
    self.post_json(peer, "/transfer_replicas", &req).await
  }

  async fn generate_replicas(
    &self,
    peer: &NodeDescriptor,
    req: GenerateReplicasRequest,
  ) -> RingResult<Ack> {
    self.post_json(peer, "/generate_replicas", &req).await
  }

  async fn remove_transferred_replicas(
    &self,
    peer: &NodeDescriptor,
    req: RemoveTransferredReplicasRequest,
  ) -> RingResult<Ack> {
    self.post_json(peer, "/remove_transferred_replicas", &req).await
  }

  async fn shift_replicas(
    &self,
    peer: &NodeDescriptor,
    req: ShiftReplicasRequest,
  ) -> RingResult<Ack> {
    self.post_json(peer, "/shift_replicas", &req).await
  }

  async fn overlay(&self, peer: &NodeDescriptor, visited: Vec<u16>) -> RingResult<OverlayResponse> {
    let ids = visited
      .iter()
      .map(u16::to_string)
      .collect::<Vec<_>>()
      .join(",");
    let path = if ids.is_empty() {
      "/overlay".to_string()
    } else {
      format!("/overlay?visited_ids={}", ids)
    };
    self.get_json(peer, &path).await
  }

  async fn node_info(&self, peer: &NodeDescriptor) -> RingResult<NodeInfoResponse> {
    self.get_json(peer, "/node_info").await
  }

  async fn depart(&self, peer: &NodeDescriptor) -> RingResult<Ack> {
    self
      .post_json(peer, "/depart", &serde_json::json!({}))
      .await
  }
}
