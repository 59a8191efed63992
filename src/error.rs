// File: error.rs
//
// The purpose of this file is to define the error taxonomy shared by
// every component of the ring: routing failures, transport failures,
// malformed requests, and membership races. Local lookups never raise --
// see `store::Lookup` -- only the operations below can fail.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RingError {
  /// A forwarding loop was detected (the visited set already contained
  /// `self`) or a neighbour could not be reached for routing purposes.
  #[error("routing error: {0}")]
  Routing(String),

  /// A chain-replication read walked off the end of the chain without
  /// finding the key.
  #[error("key not found")]
  NotFound,

  /// An outbound RPC timed out, the peer refused the connection, or
  /// replied with a non-success status.
  #[error("transport error: {0}")]
  Transport(String),

  /// A request was missing a required field, named an unknown operation,
  /// or supplied an invalid `k` / consistency mode.
  #[error("invalid request: {0}")]
  InvalidRequest(String),

  /// A depart raced with another membership change and left a pointer
  /// dangling. Reported, not auto-repaired (per spec: no automatic
  /// failure detection or repair).
  #[error("membership error: {0}")]
  Membership(String),
}

pub type RingResult<T> = Result<T, RingError>;

impl From<reqwest::Error> for RingError {
  fn from(e: reqwest::Error) -> Self {
    RingError::Transport(e.to_string())
  }
}
