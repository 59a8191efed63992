// File: hash.rs
//
// The purpose of this file is to hash a given key with SHA-1 into the
// ring's 16-bit identifier space, and to determine whether a given id
// falls in a circular interval. These are the only two primitives the
// rest of the system is allowed to use for placement decisions.

use sha1::{Digest, Sha1};

/// Number of bits in the identifier space: identifiers live in `[0, 2^M)`.
pub const M: u32 = 16;

/// Returns the SHA-1 hash of `key` reduced modulo `2^M`.
///
/// # Arguments
///
/// * `key` - the UTF-8 string to be hashed (a node's `ip:port` or a data key)
pub fn hash(key: &str) -> u16 {
  let mut hasher = Sha1::new();
  hasher.input(key.as_bytes());
  let result = hasher.result();
  let len = result.len();
  let hi = result[len - 2] as u16;
  let lo = result[len - 1] as u16;
  (hi << 8) | lo
}

/// Returns whether `x` lies in the circular half-open interval `(a, b]`.
///
/// When `a < b` this is the ordinary interval; when `a >= b` the interval
/// wraps around the ring. `a == b` denotes the full ring (used when a
/// single node is its own predecessor, so it owns every identifier).
///
/// # Arguments
///
/// * `x` - the identifier being tested
/// * `a` - exclusive lower bound
/// * `b` - inclusive upper bound
pub fn in_interval(x: u16, a: u16, b: u16) -> bool {
  if a == b {
    true
  } else if a < b {
    x > a && x <= b
  } else {
    x > a || x <= b
  }
}
