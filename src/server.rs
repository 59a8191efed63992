// File: server.rs
//
// The purpose of this file is the inbound half of the wire dispatch
// (C8): a thin `axum` router that decodes a JSON body, calls the
// matching `Node` method, and encodes the reply. No ring logic lives
// here -- every handler is a few lines of glue, matching the "external
// collaborator, thin framing" boundary spec.md draws around HTTP.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::error::RingError;
use crate::node::Node;
use crate::wire::*;

type AppState = Arc<Node>;

pub fn router(node: Arc<Node>) -> Router {
  Router::new()
    .route("/join", post(join))
    .route("/depart", post(depart))
    .route("/insert", post(insert))
    .route("/query", post(query))
    .route("/delete", post(delete))
    .route("/insertReplicas", post(insert_replicas))
    .route("/deleteReplicas", post(delete_replicas))
    .route("/update_successor", post(update_successor))
    .route("/update_predecessor", post(update_predecessor))
    .route("/transfer_keys", post(transfer_keys))
    .route("/transfer_replicas", post(transfer_replicas))
    .route("/generate_replicas", post(generate_replicas))
    .route(
      "/remove_transferred_replicas",
      post(remove_transferred_replicas),
    )
    .route("/shift_replicas", post(shift_replicas))
    .route("/overlay", get(overlay))
    .route("/node_info", get(node_info))
    .route("/set_config", post(set_config))
    .fallback(fallback)
    .with_state(node)
}

/// Returned to the caller in place of any handler's normal reply once a
/// node has gracefully departed: the dispatch layer refuses further
/// inbound requests rather than silently resurrecting torn-down state.
fn reject_if_departed(node: &Node) -> Option<Response> {
  if node.is_departed() {
    Some(ring_error_response(RingError::Membership(
      "node has departed the ring".to_string(),
    )))
  } else {
    None
  }
}

fn ring_error_response(err: RingError) -> Response {
  let status = match &err {
    RingError::NotFound => StatusCode::NOT_FOUND,
    RingError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
    RingError::Membership(_) => StatusCode::CONFLICT,
    RingError::Routing(_) | RingError::Transport(_) => StatusCode::BAD_GATEWAY,
  };
  (status, Json(Ack::error(err.to_string()))).into_response()
}

async fn join(State(node): State<AppState>, Json(req): Json<JoinRequest>) -> Response {
  if let Some(r) = reject_if_departed(&node) {
    return r;
  }
  match node.handle_join(req).await {
    Ok(resp) => Json(resp).into_response(),
    Err(e) => ring_error_response(e),
  }
}

async fn depart(State(node): State<AppState>) -> Response {
  if let Some(r) = reject_if_departed(&node) {
    return r;
  }
  match node.depart().await {
    Ok(()) => Json(Ack::ok("departed")).into_response(),
    Err(e) => ring_error_response(e),
  }
}

async fn insert(State(node): State<AppState>, Json(req): Json<InsertRequest>) -> Response {
  if let Some(r) = reject_if_departed(&node) {
    return r;
  }
  match node.insert(req).await {
    Ok(resp) => Json(resp).into_response(),
    Err(e) => ring_error_response(e),
  }
}

async fn query(State(node): State<AppState>, Json(req): Json<QueryRequest>) -> Response {
  if let Some(r) = reject_if_departed(&node) {
    return r;
  }
  match node.query(req).await {
    Ok(resp) => Json(resp).into_response(),
    Err(e) => ring_error_response(e),
  }
}

async fn delete(State(node): State<AppState>, Json(req): Json<DeleteRequest>) -> Response {
  if let Some(r) = reject_if_departed(&node) {
    return r;
  }
  match node.delete(req).await {
    Ok(resp) => Json(resp).into_response(),
    Err(e) => ring_error_response(e),
  }
}

async fn insert_replicas(
  State(node): State<AppState>,
  Json(req): Json<InsertReplicasRequest>,
) -> Response {
  Json(node.handle_insert_replicas(req).await).into_response()
}

async fn delete_replicas(
  State(node): State<AppState>,
  Json(req): Json<DeleteReplicasRequest>,
) -> Response {
  Json(node.handle_delete_replicas(req).await).into_response()
}

async fn update_successor(
  State(node): State<AppState>,
  Json(req): Json<UpdateSuccessorRequest>,
) -> Response {
  Json(node.handle_update_successor(req)).into_response()
}

async fn update_predecessor(
  State(node): State<AppState>,
  Json(req): Json<UpdatePredecessorRequest>,
) -> Response {
  Json(node.handle_update_predecessor(req)).into_response()
}

async fn transfer_keys(
  State(node): State<AppState>,
  Json(req): Json<TransferKeysRequest>,
) -> Response {
  Json(node.handle_transfer_keys(req)).into_response()
}

async fn transfer_replicas(
  State(node): State<AppState>,
  Json(req): Json<TransferReplicasRequest>,
) -> Response {
  Json(node.handle_transfer_replicas(req).await).into_response()
}

async fn generate_replicas(
  State(node): State<AppState>,
  Json(req): Json<GenerateReplicasRequest>,
) -> Response {
  Json(node.handle_generate_replicas(req).await).into_response()
}

async fn remove_transferred_replicas(
  State(node): State<AppState>,
  Json(req): Json<RemoveTransferredReplicasRequest>,
) -> Response {
  Json(node.handle_remove_transferred_replicas(req)).into_response()
}

async fn shift_replicas(
  State(node): State<AppState>,
  Json(req): Json<ShiftReplicasRequest>,
) -> Response {
  Json(node.handle_shift_replicas(req).await).into_response()
}

async fn overlay(State(node): State<AppState>, Query(params): Query<HashMap<String, String>>) -> Response {
  let visited: Vec<u16> = params
    .get("visited_ids")
    .map(|raw| {
      raw
        .split(',')
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<u16>().ok())
        .collect()
    })
    .unwrap_or_default();
  match node.handle_overlay(visited).await {
    Ok(resp) => Json(resp).into_response(),
    Err(e) => ring_error_response(e),
  }
}

async fn node_info(State(node): State<AppState>) -> Response {
  Json(node.handle_node_info()).into_response()
}

async fn set_config(State(node): State<AppState>, Json(req): Json<SetConfigRequest>) -> Response {
  match node.handle_set_config(req) {
    Ok(resp) => Json(resp).into_response(),
    Err(e) => ring_error_response(e),
  }
}

/// Installed by `main.rs` on unrecognized paths; axum's default 404 is
/// fine but this keeps a hook for a consistent `Ack`-shaped body,
/// matching every other error reply this router sends.
pub async fn fallback() -> Response {
  warn!("request to unknown path");
  ring_error_response(RingError::InvalidRequest("unknown endpoint".to_string()))
}
