// File: consistency.rs
//
// The purpose of this file is the client-facing operations: insert,
// query, delete. Each checks ownership first and forwards transparently
// to the successor when `self` is not the owner (C4). Once ownership is
// established, behavior forks on the configured consistency mode:
// eventual propagates the replica chain in the background and replies
// immediately; linearizability walks the chain synchronously (the owner
// commits first, then each replica hop in order) and reads only from
// the tail.

use tracing::warn;

use crate::config::Consistency;
use crate::error::RingResult;
use crate::node::{Node, NodeDescriptor};
use crate::store::Lookup;
use crate::wire::{DeleteRequest, InsertRequest, InsertResponse, QueryRequest, QueryResponse};

impl Node {
  pub async fn insert(&self, req: InsertRequest) -> RingResult<InsertResponse> {
    if !self.owns_key(&req.key) {
      let successor = self.successor();
      return self.transport.insert(&successor, req).await;
    }

    let (value, consistency, k, successor) = {
      let mut state = self.state.lock();
      let value = state.store.insert_primary(&req.key, &req.value);
      (value, state.consistency, state.k, state.successor.clone())
    };

    match consistency {
      Consistency::Eventual => {
        if k > 1 && successor.id != self.self_desc.id {
          let key = req.key.clone();
          let value_to_propagate = value.clone();
          let origin = self.self_desc.id;
          let to = successor.clone();
          let node = self.self_handle();
          tokio::spawn(async move {
            node
              .forward_replicate(&to, &key, &value_to_propagate, k - 1, false, origin)
              .await;
          });
        }
        Ok(InsertResponse {
          status: "success".to_string(),
          message: "stored (eventual)".to_string(),
          owner: self.self_desc.clone(),
          tail: None,
        })
      }
      Consistency::Linearizability => {
        let tail = if k > 1 && successor.id != self.self_desc.id {
          self
            .forward_replicate(&successor, &req.key, &value, k - 1, false, self.self_desc.id)
            .await;
          Some(self.chain_tail(&req.key, k).await.unwrap_or(successor))
        } else {
          None
        };
        Ok(InsertResponse {
          status: "success".to_string(),
          message: "stored (linearizable)".to_string(),
          owner: self.self_desc.clone(),
          tail,
        })
      }
    }
  }

  pub async fn query(&self, req: QueryRequest) -> RingResult<QueryResponse> {
    if req.key == "*" {
      return self.query_all().await;
    }

    if !self.owns_key(&req.key) {
      let (consistency, local) = {
        let state = self.state.lock();
        (state.consistency, state.store.get_replica(&req.key).map(|e| e.value.clone()))
      };
      // Eventual mode answers from a local replica copy, stale values
      // allowed, before forwarding toward the owner.
      if consistency == Consistency::Eventual {
        if let Some(value) = local {
          return Ok(QueryResponse::found(value));
        }
      }
      let successor = self.successor();
      return self.transport.query(&successor, req).await;
    }

    let (consistency, k, successor) = {
      let state = self.state.lock();
      (state.consistency, state.k, state.successor.clone())
    };

    match consistency {
      Consistency::Eventual => {
        let lookup = self.state.lock().store.get_primary(&req.key);
        Ok(match lookup {
          Lookup::Found(v) => QueryResponse::found(v),
          Lookup::NotFound => QueryResponse::not_found(),
        })
      }
      Consistency::Linearizability => {
        // Chain-replication reads are answered only by the tail: with
        // no replicas (k <= 1 or this node is alone) the owner is its
        // own tail and the local primary copy is authoritative.
        if k <= 1 || successor.id == self.self_desc.id {
          let lookup = self.state.lock().store.get_primary(&req.key);
          return Ok(match lookup {
            Lookup::Found(v) => QueryResponse::found(v),
            Lookup::NotFound => QueryResponse::not_found(),
          });
        }
        match self.read_from_tail(&req.key, k).await {
          Some(value) => Ok(QueryResponse::found(value)),
          None => Ok(QueryResponse::not_found()),
        }
      }
    }
  }

  pub async fn delete(&self, req: DeleteRequest) -> RingResult<crate::wire::Ack> {
    if !self.owns_key(&req.key) {
      let successor = self.successor();
      return self.transport.delete(&successor, req).await;
    }

    let (removed, consistency, k, successor) = {
      let mut state = self.state.lock();
      let removed = state.store.remove_primary(&req.key).is_some();
      (removed, state.consistency, state.k, state.successor.clone())
    };

    if removed && k > 1 && successor.id != self.self_desc.id {
      let key = req.key.clone();
      let origin = self.self_desc.id;
      let depth = k - 1;
      match consistency {
        Consistency::Eventual => {
          let to = successor.clone();
          let node = self.self_handle();
          tokio::spawn(async move {
            node.forward_delete_replicate(&to, &key, depth, origin).await;
          });
        }
        Consistency::Linearizability => {
          self
            .forward_delete_replicate(&successor, &key, depth, origin)
            .await;
        }
      }
    }

    Ok(if removed {
      crate::wire::Ack::ok("deleted")
    } else {
      crate::wire::Ack::ok("key absent")
    })
  }

  /// Walks `node_info` hops starting at `successor` to find the tail of
  /// the replica chain for `key`: the node whose replica depth is `1`,
  /// or whose own successor is `self` again (the chain wrapped because
  /// `N < k`). Returns the tail's descriptor alongside whatever value it
  /// holds for `key`, if any.
  async fn locate_tail(&self, key: &str, k: u8) -> Option<(NodeDescriptor, Option<String>)> {
    let mut current = self.successor();
    if current.id == self.self_desc.id {
      return None;
    }
    for _ in 0..k {
      let info = match self.transport.node_info(&current).await {
        Ok(info) => info,
        Err(e) => {
          warn!(peer = %current.addr(), error = %e, "node_info lookup failed while locating chain tail");
          return None;
        }
      };
      let entry = info.replicas.get(key).cloned();
      let is_tail = entry.as_ref().map(|(_, depth)| *depth == 1).unwrap_or(false)
        || info.successor.id == self.self_desc.id
        || info.successor.id == current.id;
      if is_tail {
        return Some((current, entry.map(|(value, _)| value)));
      }
      current = info.successor;
    }
    Some((current, None))
  }

  /// Used by a linearizable write to learn which node acknowledges the
  /// chain (reported back to the caller as `InsertResponse::tail`).
  async fn chain_tail(&self, key: &str, k: u8) -> Option<NodeDescriptor> {
    self.locate_tail(key, k).await.map(|(tail, _)| tail)
  }

  /// Used by a linearizable read: the tail's own copy is the only
  /// value a chain-replication read may return.
  async fn read_from_tail(&self, key: &str, k: u8) -> Option<String> {
    self.locate_tail(key, k).await.and_then(|(_, value)| value)
  }

  /// Wildcard read (`key == "*"`): walks the ring via successor pointers,
  /// collecting each node's own `data` into one response. Termination is
  /// detected the same way `handle_overlay` detects it -- by returning to
  /// the originating id -- rather than by a fixed hop count, since ring
  /// size is not known in advance.
  async fn query_all(&self) -> RingResult<QueryResponse> {
    let mut collected: std::collections::HashMap<String, String> = self.state.lock().store.data.clone();

    let mut current = self.successor();
    while current.id != self.self_desc.id {
      let info = match self.transport.node_info(&current).await {
        Ok(info) => info,
        Err(e) => {
          warn!(peer = %current.addr(), error = %e, "node_info lookup failed during wildcard query walk");
          break;
        }
      };
      collected.extend(info.data.clone());
      if info.successor.id == current.id {
        break;
      }
      current = info.successor;
    }

    Ok(QueryResponse::all(collected))
  }

  /// A cheap `Arc<Node>` handle for spawning detached propagation tasks.
  /// Relies on every `Node` being constructed behind an `Arc` (see
  /// `node.rs`'s constructors), mirroring the teacher's `Arc<RwLock<..>>`
  /// handler pattern generalized to a plain `Arc<Node>`.
  fn self_handle(&self) -> std::sync::Arc<Node> {
    self
      .self_arc
      .upgrade()
      .expect("Node outlived its own Arc -- self_arc must be set at construction")
  }
}
