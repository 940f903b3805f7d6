//! # Targets and Their Identity
//!
//! A target is anything the engine can be asked to reach a decision on:
//! a block, a transaction, whatever the integrator feeds in. The core never
//! looks inside one; it only needs the small capability set in [`Target`]
//! and a stable [`Hash`] to key its bookkeeping by.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ---------------------------------------------------------------------------
// Hash
// ---------------------------------------------------------------------------

/// Opaque 32-byte identifier of a target.
///
/// The engine treats the content as a black box: equality and hashing are
/// all it ever does with one. On the wire and in logs a hash renders as
/// 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Hash([u8; 32]);

impl Hash {
    /// Wraps raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Hash(bytes)
    }

    /// Builds a hash whose trailing eight bytes are `value` in big-endian
    /// and whose remaining bytes are zero. Handy for tests and simulations
    /// that want small, readable identifiers.
    pub fn from_low_u64(value: u64) -> Self {
        let mut bytes = [0u8; 32];
        bytes[24..].copy_from_slice(&value.to_be_bytes());
        Hash(bytes)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Full hex is unreadable in test output; eight leading chars is
        // enough to tell targets apart.
        write!(f, "Hash({}..)", &hex::encode(self.0)[..8])
    }
}

/// Error returned when parsing a hash from hex fails.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid target hash: {0}")]
pub struct ParseHashError(String);

impl FromStr for Hash {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|e| ParseHashError(e.to_string()))?;
        let bytes: [u8; 32] = raw
            .try_into()
            .map_err(|_| ParseHashError(format!("expected 32 bytes, got {}", s.len() / 2)))?;
        Ok(Hash(bytes))
    }
}

impl Serialize for Hash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Hash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Capability set the engine requires of anything it reconciles.
///
/// Implementations are registered once via
/// [`Processor::add_target_to_reconcile`](crate::Processor::add_target_to_reconcile)
/// and queried again on every poll cycle, so the methods should be cheap.
pub trait Target: Send + Sync {
    /// Stable identity of this target. Must never change once registered.
    fn hash(&self) -> Hash;

    /// Wire-level type tag, e.g. `"block"` or `"tx"`. Carried through to
    /// polls verbatim; the engine attaches no meaning to it.
    fn target_type(&self) -> &str;

    /// The caller's opinion at registration time. Seeds the vote record's
    /// initial decision bit.
    fn is_accepted(&self) -> bool;

    /// Gate for continued participation. A target that starts reporting
    /// `false` is dropped from polls and its incoming votes are ignored.
    fn is_valid(&self) -> bool;

    /// Relative weight when targets compete for space in a poll batch.
    /// Higher scores poll first (for blocks, typically cumulative work).
    fn score(&self) -> i64;
}
