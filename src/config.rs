// File: config.rs
//
// The purpose of this file is to hold the process-wide settings agreed
// at join time: the consistency mode and the replication factor, plus
// the timing constants the concurrency model depends on.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::error::RingError;

/// The two supported consistency regimes. Agreed ring-wide at join time;
/// `set_config` can change it on a running node but (matching the
/// reference implementation) never triggers rebalancing -- a known wart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consistency {
  Eventual,
  Linearizability,
}

impl FromStr for Consistency {
  type Err = RingError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "e" | "eventual" => Ok(Consistency::Eventual),
      "l" | "linearizability" => Ok(Consistency::Linearizability),
      other => Err(RingError::InvalidRequest(format!(
        "unknown consistency mode '{}'",
        other
      ))),
    }
  }
}

/// Minimum and maximum replication factor, inclusive: total copies per
/// key range over `[1, 10]` (1 primary plus up to 9 replicas).
pub const MIN_K: u8 = 1;
pub const MAX_K: u8 = 10;

pub fn validate_k(k: u8) -> Result<u8, RingError> {
  if (MIN_K..=MAX_K).contains(&k) {
    Ok(k)
  } else {
    Err(RingError::InvalidRequest(format!(
      "k_factor must be in [{}, {}], got {}",
      MIN_K, MAX_K, k
    )))
  }
}

/// Deadline applied to every outbound RPC (spec: default 5s, no retry).
pub const RPC_TIMEOUT: Duration = Duration::from_secs(5);
