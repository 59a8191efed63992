// File: wire.rs
//
// The purpose of this file is to define the JSON request and response
// bodies for every endpoint named in the wire protocol table (one
// struct per message type, mirroring the teacher's message-per-type
// style). The byte-level HTTP framing is handled by server.rs and
// transport.rs; this file only owns the shapes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::node::NodeDescriptor;

/// Generic acknowledgement used by every endpoint that has no richer
/// payload to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ack {
  pub status: String,
  pub message: String,
}

impl Ack {
  pub fn ok(message: impl Into<String>) -> Self {
    Ack {
      status: "success".to_string(),
      message: message.into(),
    }
  }

  pub fn error(message: impl Into<String>) -> Self {
    Ack {
      status: "error".to_string(),
      message: message.into(),
    }
  }

  pub fn is_success(&self) -> bool {
    self.status == "success"
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertRequest {
  pub key: String,
  pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertResponse {
  pub status: String,
  pub message: String,
  pub owner: NodeDescriptor,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub tail: Option<NodeDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
  pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
  pub status: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub value: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data: Option<HashMap<String, String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message: Option<String>,
}

impl QueryResponse {
  pub fn found(value: String) -> Self {
    QueryResponse {
      status: "success".to_string(),
      value: Some(value),
      data: None,
      message: None,
    }
  }

  pub fn not_found() -> Self {
    QueryResponse {
      status: "error".to_string(),
      value: None,
      data: None,
      message: Some("Key not found".to_string()),
    }
  }

  pub fn all(data: HashMap<String, String>) -> Self {
    QueryResponse {
      status: "success".to_string(),
      value: None,
      data: Some(data),
      message: None,
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
  pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
  pub ip: String,
  pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
  pub status: String,
  pub new_successor: NodeDescriptor,
  pub new_predecessor: NodeDescriptor,
  pub transferred_keys: HashMap<String, String>,
  pub transferred_replicas: HashMap<String, (String, u8)>,
  pub consistency: String,
  pub k_factor: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertReplicasRequest {
  pub key: String,
  pub value: String,
  pub replication_count: u8,
  pub join: bool,
  pub starting_node: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteReplicasRequest {
  pub key: String,
  pub replication_count: u8,
  pub starting_node: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSuccessorRequest {
  pub new_successor: NodeDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePredecessorRequest {
  pub new_predecessor: NodeDescriptor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferKeysRequest {
  pub keys: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferReplicasRequest {
  pub replicas: HashMap<String, (String, u8)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateReplicasRequest {
  pub keys: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveTransferredReplicasRequest {
  pub keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftReplicasRequest {
  pub keys: Vec<String>,
  pub replicas: HashMap<String, (String, u8)>,
  pub starting_node: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayEntry {
  pub id: u16,
  pub ip: String,
  pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayQuery {
  #[serde(default)]
  pub visited_ids: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayResponse {
  pub status: String,
  pub overlay: Vec<OverlayEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfoResponse {
  pub id: u16,
  pub ip: String,
  pub port: u16,
  pub successor: NodeDescriptor,
  pub predecessor: NodeDescriptor,
  pub data: HashMap<String, String>,
  pub replicas: HashMap<String, (String, u8)>,
  pub consistency: String,
  pub k_factor: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetConfigRequest {
  #[serde(default)]
  pub consistency: Option<String>,
  #[serde(default)]
  pub k_factor: Option<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetConfigResponse {
  pub status: String,
  pub consistency: String,
  pub k_factor: u8,
}
