//! In-flight poll bookkeeping.
//!
//! One [`RequestRecord`] exists per outstanding poll, keyed in the
//! processor by `(round, peer)`. The record pins down what was asked and
//! when, so a late response can be checked for alignment and staleness.

use crate::config::REQUEST_TIMEOUT_SECS;
use crate::wire::Inv;

/// A single outstanding poll: when it went out and exactly what it asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    timestamp: u64,
    invs: Vec<Inv>,
}

impl RequestRecord {
    /// Creates a record stamped with the issuing clock's Unix seconds.
    pub fn new(timestamp: u64, invs: Vec<Inv>) -> Self {
        Self { timestamp, invs }
    }

    /// Creation time in Unix seconds.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// The ordered inv list the poll carried. Responses must answer these
    /// positions one-for-one.
    pub fn invs(&self) -> &[Inv] {
        &self.invs
    }

    /// Expiry predicate: a request is stale strictly after the timeout
    /// window closes. Expiry never acts on its own; stale records are
    /// dropped lazily when their key is next consulted.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.timestamp + REQUEST_TIMEOUT_SECS
    }
}
