//! # Peer Directory
//!
//! The processor does not discover peers; something else does (static
//! config, a registry service, gossip; not this crate's problem). What the
//! processor needs is only the ability to enumerate candidate peer ids in a
//! deterministic order, which is the whole of the [`PeerDirectory`]
//! contract.
//!
//! Two implementations ship here: [`StaticDirectory`] for fixed membership
//! (tests, simulations, config-file deployments) and [`SharedDirectory`]
//! for callers that add and remove peers at runtime.

use std::collections::BTreeSet;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier of a remote peer. Opaque to the engine beyond ordering.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Enumerates the peers currently available for polling.
pub trait PeerDirectory: Send + Sync {
    /// All known peer ids, ascending. An empty vec means there is nobody
    /// to poll and the processor will sit idle.
    fn peer_ids(&self) -> Vec<NodeId>;
}

// ---------------------------------------------------------------------------
// StaticDirectory
// ---------------------------------------------------------------------------

/// A directory with membership fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    ids: Vec<NodeId>,
}

impl StaticDirectory {
    /// Builds a directory from any id collection; duplicates collapse and
    /// the order is normalized to ascending.
    pub fn new(ids: impl IntoIterator<Item = NodeId>) -> Self {
        let set: BTreeSet<NodeId> = ids.into_iter().collect();
        Self {
            ids: set.into_iter().collect(),
        }
    }
}

impl PeerDirectory for StaticDirectory {
    fn peer_ids(&self) -> Vec<NodeId> {
        self.ids.clone()
    }
}

// ---------------------------------------------------------------------------
// SharedDirectory
// ---------------------------------------------------------------------------

/// A directory whose membership can change while the processor runs.
///
/// Reads vastly outnumber writes (every tick enumerates, peers join
/// rarely), hence the read/write lock.
#[derive(Debug, Default)]
pub struct SharedDirectory {
    ids: RwLock<BTreeSet<NodeId>>,
}

impl SharedDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a peer. Returns false if it was already present.
    pub fn add(&self, id: NodeId) -> bool {
        self.ids.write().insert(id)
    }

    /// Removes a peer. Returns false if it was not present.
    pub fn remove(&self, id: NodeId) -> bool {
        self.ids.write().remove(&id)
    }

    /// Number of known peers.
    pub fn len(&self) -> usize {
        self.ids.read().len()
    }

    /// True when no peers are known.
    pub fn is_empty(&self) -> bool {
        self.ids.read().is_empty()
    }
}

impl PeerDirectory for SharedDirectory {
    fn peer_ids(&self) -> Vec<NodeId> {
        self.ids.read().iter().copied().collect()
    }
}
