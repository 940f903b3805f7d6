//! # Wire Carriers
//!
//! The data types that cross the boundary between this engine and remote
//! peers: poll contents ([`Inv`]), per-target answers ([`Vote`]), response
//! envelopes ([`Response`]), and the status transitions the engine reports
//! back to its caller ([`StatusUpdate`]).
//!
//! All of these are plain serde-friendly structs. The engine itself never
//! serializes anything (transports do), but the field layout here *is* the
//! wire contract, so renaming a field is a protocol change.

use serde::{Deserialize, Serialize};

use crate::peers::NodeId;
use crate::target::Hash;

// ---------------------------------------------------------------------------
// Inv
// ---------------------------------------------------------------------------

/// One entry in a poll: "what do you think of this target?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inv {
    /// Opaque type tag, conventionally `"block"` or `"tx"`.
    pub target_type: String,
    /// Identity of the target being polled.
    pub target_hash: Hash,
}

impl Inv {
    /// Builds an inv from a tag and hash.
    pub fn new(target_type: impl Into<String>, target_hash: Hash) -> Self {
        Self {
            target_type: target_type.into(),
            target_hash,
        }
    }
}

// ---------------------------------------------------------------------------
// Vote
// ---------------------------------------------------------------------------

/// A single peer's answer for a single target.
///
/// The answer is three-valued, encoded in the error code:
/// zero means yes, any positive code means no, and any code that is
/// negative when reinterpreted as a signed 32-bit integer means the peer
/// abstains. The signed reinterpretation is deliberate: the wire type is
/// unsigned, and the neutrality test must not saturate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Error code carrying the yes/no/neutral verdict.
    pub error: u32,
    /// Target this vote is about. Must match the inv at the same position
    /// in the request it answers.
    pub hash: Hash,
}

impl Vote {
    /// Builds a vote.
    pub fn new(error: u32, hash: Hash) -> Self {
        Self { error, hash }
    }

    /// True iff the peer voted yes.
    pub fn is_valid(&self) -> bool {
        self.error == 0
    }

    /// True iff the peer abstained (error code negative under signed
    /// reinterpretation).
    pub fn is_neutral(&self) -> bool {
        (self.error as i32) < 0
    }
}

// ---------------------------------------------------------------------------
// Response
// ---------------------------------------------------------------------------

/// A peer's reply to one poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Echo of the round the poll was issued under. Used to locate the
    /// in-flight request this response answers.
    pub round: i64,
    /// Peer-imposed delay hint in milliseconds. Carried for transports
    /// that want to honor it; the engine does not act on it.
    pub cooldown: u32,
    /// Per-inv answers, in the exact order of the request's invs.
    pub votes: Vec<Vote>,
}

impl Response {
    /// Builds a response.
    pub fn new(round: i64, cooldown: u32, votes: Vec<Vote>) -> Self {
        Self {
            round,
            cooldown,
            votes,
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Decision state of a target as reported in status updates.
///
/// The discriminants are wire ordinals shared with existing peers; the
/// order is not an accident.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Status {
    /// Finalized as rejected.
    Invalid = 0,
    /// Currently rejected, not yet finalized.
    Rejected = 1,
    /// Currently accepted, not yet finalized.
    Accepted = 2,
    /// Finalized as accepted.
    Finalized = 3,
}

/// One state transition, appended to the caller's update buffer whenever a
/// registered vote concluded a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Target that transitioned.
    pub hash: Hash,
    /// Its status after the transition.
    pub status: Status,
}

// ---------------------------------------------------------------------------
// OutboundPoll
// ---------------------------------------------------------------------------

/// A poll the processor wants sent: the chosen peer, the round the request
/// was recorded under, and the inv batch. Produced by
/// [`Processor::tick`](crate::Processor::tick) and consumed by whatever
/// transport the integrator wires up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPoll {
    /// Round the in-flight request is keyed under.
    pub round: i64,
    /// Peer the poll should be delivered to.
    pub node: NodeId,
    /// Ordered inv batch, never empty, at most
    /// [`MAX_ELEMENT_POLL`](crate::config::MAX_ELEMENT_POLL) entries.
    pub invs: Vec<Inv>,
}
